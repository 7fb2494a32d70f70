//! Raw product → wardrobe item normalization.
//!
//! Three enrichment steps run per product: categorisation, colour
//! resolution and image handling. Each is tolerated failing on its own;
//! a product with a name always becomes an item.

pub mod category;
pub mod color;
pub mod imaging;

use std::sync::Arc;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use crate::normalize::imaging::GarmentDetector;
use crate::pipeline::types::{EmailMessage, RawProduct, Retailer};
use crate::store::WardrobeItem;

static ORDER_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)order\s*(?:no\.?|number|#)?\s*:?\s*([A-Z0-9][A-Z0-9_-]{3,})").expect("regex")
});

/// Pull an order id out of the subject, falling back to the body.
pub fn extract_order_id(email: &EmailMessage) -> String {
    let from = |text: &str| {
        ORDER_ID
            .captures(text)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default()
    };
    let from_subject = from(&email.subject);
    if !from_subject.is_empty() {
        return from_subject;
    }
    from(email.body().unwrap_or_default())
}

pub struct Normalizer {
    http: reqwest::Client,
    detector: Option<Arc<dyn GarmentDetector>>,
    /// Skip network fetches entirely (tests, offline runs).
    fetch_images: bool,
}

impl Normalizer {
    pub fn new(detector: Option<Arc<dyn GarmentDetector>>) -> Self {
        Self {
            http: reqwest::Client::new(),
            detector,
            fetch_images: true,
        }
    }

    pub fn offline() -> Self {
        Self {
            http: reqwest::Client::new(),
            detector: None,
            fetch_images: false,
        }
    }

    /// Normalize one raw product into a persistable item.
    pub async fn normalize(
        &self,
        user_id: &str,
        email: &EmailMessage,
        retailer: Option<Retailer>,
        raw: RawProduct,
    ) -> WardrobeItem {
        let retailer_name = retailer.map(|r| r.as_str().to_string()).unwrap_or_default();

        let category = if raw.category.trim().is_empty() {
            let text = format!("{} {} {} {}", raw.name, raw.brand, raw.color, retailer_name);
            category::categorize(&text)
        } else {
            raw.category.clone()
        };

        let image_url = if raw.image_url.is_empty() {
            String::new()
        } else {
            imaging::normalize_image_url(&raw.image_url)
        };

        // Image bytes feed the colour fallback and the garment crop; both
        // stay best-effort.
        let image_bytes = self.fetch_for_sampling(&raw).await;
        let sample = match (&image_bytes, self.detector.as_ref()) {
            (Some(bytes), Some(detector)) => self
                .crop_sample(bytes, &raw.name, detector.as_ref())
                .await
                .or_else(|| image_bytes.clone()),
            (Some(_), None) => image_bytes.clone(),
            _ => None,
        };
        let (color_hex, color_tag) = color::resolve(&raw.color, sample.as_deref());

        WardrobeItem {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            brand: raw.brand,
            name: raw.name,
            category,
            size: raw.size,
            quantity: raw.quantity,
            price: raw.price,
            color_tag,
            color_hex,
            image_url,
            source_email_id: email.id.clone(),
            source_order_id: extract_order_id(email),
            retailer: retailer_name,
            added_at: Utc::now(),
        }
    }

    async fn fetch_for_sampling(&self, raw: &RawProduct) -> Option<Vec<u8>> {
        if !self.fetch_images || raw.image_url.is_empty() {
            return None;
        }
        // Named colours resolve from text alone; skip the fetch.
        if color::tag_from_text(&raw.color).is_some() {
            return None;
        }
        match imaging::fetch_image(&self.http, &raw.image_url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!(url = %raw.image_url, error = %e, "Image fetch failed, keeping original URL");
                None
            }
        }
    }

    /// Crop to the detected garment so background pixels do not skew the
    /// colour sample. Any failure falls back to the full frame.
    async fn crop_sample(
        &self,
        bytes: &[u8],
        name: &str,
        detector: &dyn GarmentDetector,
    ) -> Option<Vec<u8>> {
        let class = imaging::garment_class(name)?;
        match detector.detect(bytes, class).await {
            Ok(Some(bbox)) => match imaging::crop_to_garment(bytes, bbox) {
                Ok(cropped) => Some(cropped),
                Err(e) => {
                    debug!(error = %e, "Garment crop failed");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "Garment detection failed");
                None
            }
        }
    }
}

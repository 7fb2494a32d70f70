//! Product image handling: URL normalisation, fetching, garment crop.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use image::imageops::FilterType;
use regex::Regex;

use crate::error::NormalizeError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_EDGE: u32 = 512;
const JPEG_QUALITY: u8 = 85;

/// Size-variant path segments retailers bake into CDN URLs, e.g.
/// `_500x500.jpg` or `/thumb/`.
static SIZE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_\d{2,4}x\d{2,4}(\.\w+)$").expect("regex"));

/// Canonical form of a product image URL for comparisons and storage:
/// query string and fragment dropped, thumbnail markers removed.
pub fn normalize_image_url(url: &str) -> String {
    let url = url.trim();
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let without_thumb = without_query.replace("/thumb/", "/");
    SIZE_SUFFIX.replace(&without_thumb, "$1").into_owned()
}

/// Bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Seam for the garment-detection service. Given image bytes and a class
/// hint ("shirt", "jeans", ...), returns where the garment sits, or `None`
/// when nothing was detected.
#[async_trait]
pub trait GarmentDetector: Send + Sync {
    async fn detect(
        &self,
        image: &[u8],
        class_hint: &str,
    ) -> Result<Option<BoundingBox>, NormalizeError>;
}

/// Detector class hint from the item name. First hit wins, so specific
/// garments sit above generic ones.
pub fn garment_class(name: &str) -> Option<&'static str> {
    const KEYWORD_MAP: &[(&str, &str)] = &[
        ("t-shirt", "tshirt"),
        ("tshirt", "tshirt"),
        ("shirt", "shirt"),
        ("jeans", "jeans"),
        ("trouser", "trousers"),
        ("pant", "trousers"),
        ("short", "shorts"),
        ("dress", "dress"),
        ("skirt", "skirt"),
        ("jacket", "jacket"),
        ("coat", "jacket"),
        ("sweater", "sweater"),
        ("sweatshirt", "sweater"),
        ("hoodie", "sweater"),
        ("kurta", "kurta"),
    ];
    let lower = name.to_lowercase();
    KEYWORD_MAP
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, class)| *class)
}

/// Fetch image bytes, bounded by [`FETCH_TIMEOUT`].
pub async fn fetch_image(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, NormalizeError> {
    let response = http
        .get(url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| NormalizeError::ImageFetch(e.to_string()))?;
    if !response.status().is_success() {
        return Err(NormalizeError::ImageFetch(format!(
            "status {}",
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| NormalizeError::ImageFetch(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Crop to the detected garment, cap the long edge, re-encode as JPEG.
pub fn crop_to_garment(image_bytes: &[u8], bbox: BoundingBox) -> Result<Vec<u8>, NormalizeError> {
    let image = image::load_from_memory(image_bytes)
        .map_err(|e| NormalizeError::ImageDecode(e.to_string()))?;
    let (w, h) = (image.width(), image.height());
    if bbox.width == 0 || bbox.height == 0 || bbox.x >= w || bbox.y >= h {
        return Err(NormalizeError::Detector(format!("box {bbox:?} outside {w}x{h}")));
    }

    let width = bbox.width.min(w - bbox.x);
    let height = bbox.height.min(h - bbox.y);
    let mut cropped = image.crop_imm(bbox.x, bbox.y, width, height);

    if cropped.width().max(cropped.height()) > MAX_EDGE {
        cropped = cropped.resize(MAX_EDGE, MAX_EDGE, FilterType::Triangle);
    }

    let mut out = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder
        .encode_image(&cropped.to_rgb8())
        .map_err(|e| NormalizeError::ImageDecode(e.to_string()))?;
    Ok(out)
}

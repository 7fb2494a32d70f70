//! Last-resort text heuristics.
//!
//! When neither the structural nor the generative parser produced
//! anything, a plain-text scan tries to salvage a single product. Three
//! passes: a known-brand pattern with descriptive garment vocabulary,
//! a lenient capitalised-word pattern, and a retailer-token sniff for
//! text where no brand word survives at all.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::ExtractionError;
use crate::parsers::generative::html_to_text;
use crate::pipeline::types::{EmailMessage, ExtractStrategy, RawProduct, Retailer};

const KNOWN_BRANDS: &[&str] = &[
    "Nike",
    "Adidas",
    "Puma",
    "Zara",
    "H&M",
    "Uniqlo",
    "Levi's",
    "Roadster",
    "HRX",
    "Allen Solly",
    "Van Heusen",
    "Peter England",
    "Tommy Hilfiger",
    "U.S. Polo",
];

/// Distinctive substrings that pin down the retailer even in mangled
/// OCR output, paired with the brand they imply.
const RETAILER_MARKERS: &[(&str, Retailer)] = &[
    ("myntassets.com", Retailer::Myntra),
    ("myntra", Retailer::Myntra),
    ("static.zara.net", Retailer::Zara),
    ("zara.com", Retailer::Zara),
    ("assets.hm.com", Retailer::Hm),
    ("www2.hm.com", Retailer::Hm),
];

static DESCRIPTIVE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:Pure Cotton|Slim Fit|Regular Fit|Casual|Formal)[\s\w-]*?(?:Shirt|T-Shirt|Pants|Trousers|Jeans|Kurta|Dress|Jacket)",
    )
    .expect("regex")
});

static CAPITALISED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][a-z]+)((?:\s+[A-Za-z-]+){1,8})").expect("regex"));

static NOISE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(size|qty|quantity|rs\.?|inr|order|total)$").expect("regex"));

/// Salvage at most one product from free text.
pub fn parse(text: &str) -> Option<RawProduct> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    // Known brand next to descriptive garment vocabulary.
    let lower = text.to_lowercase();
    if let Some(brand) = KNOWN_BRANDS
        .iter()
        .find(|b| lower.contains(&b.to_lowercase()))
    {
        if let Some(name) = DESCRIPTIVE_NAME.find(text) {
            return Some(RawProduct {
                brand: (*brand).to_string(),
                name: name.as_str().trim().to_string(),
                ..Default::default()
            });
        }
    }

    // Lenient fallback: first capitalised word as brand, following words
    // as the name with sizing noise stripped.
    if let Some(caps) = CAPITALISED_LINE.captures(text) {
        let name_words: Vec<&str> = caps[2]
            .split_whitespace()
            .take_while(|w| !NOISE_TOKEN.is_match(w))
            .collect();
        if name_words.len() >= 2 {
            return Some(RawProduct {
                brand: caps[1].to_string(),
                name: name_words.join(" "),
                ..Default::default()
            });
        }
    }

    // Last resort: a retailer marker implies the brand when no brand
    // word survives in the text. Still needs garment vocabulary for a
    // name; a bare tracking link is not a product.
    let (_, retailer) = RETAILER_MARKERS
        .iter()
        .find(|(marker, _)| lower.contains(marker))?;
    let name = DESCRIPTIVE_NAME.find(text)?;
    Some(RawProduct {
        brand: retailer.brand().to_string(),
        name: name.as_str().trim().to_string(),
        ..Default::default()
    })
}

/// Strategy wrapper; flattens HTML first when that is all the mail has.
pub struct HeuristicStrategy;

#[async_trait]
impl ExtractStrategy for HeuristicStrategy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn supports(&self, _retailer: Option<Retailer>) -> bool {
        true
    }

    async fn extract(
        &self,
        email: &EmailMessage,
        retailer: Option<Retailer>,
    ) -> Result<Vec<RawProduct>, ExtractionError> {
        let text = match (&email.text_body, &email.html_body) {
            (Some(text), _) if !text.trim().is_empty() => text.clone(),
            (_, Some(html)) => html_to_text(html),
            _ => return Ok(Vec::new()),
        };

        let mut products: Vec<RawProduct> = parse(&text).into_iter().collect();
        for product in &mut products {
            if product.brand.is_empty() {
                if let Some(retailer) = retailer {
                    product.brand = retailer.brand().to_string();
                }
            }
        }
        debug!(email_id = %email.id, count = products.len(), "Heuristic parse");
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_brand_with_descriptive_vocabulary() {
        let product =
            parse("Your Roadster Pure Cotton Casual Shirt (Size: 40) has shipped").unwrap();
        assert_eq!(product.brand, "Roadster");
        assert_eq!(product.name, "Pure Cotton Casual Shirt");
    }

    #[test]
    fn slim_fit_jeans_variant() {
        let product = parse("Levi's Slim Fit Stretchable Jeans - Qty 1").unwrap();
        assert_eq!(product.brand, "Levi's");
        assert!(product.name.starts_with("Slim Fit"));
        assert!(product.name.ends_with("Jeans"));
    }

    #[test]
    fn lenient_pattern_strips_sizing_noise() {
        let product = parse("Campus Sutra Printed Sweatshirt Size L").unwrap();
        assert_eq!(product.brand, "Campus");
        assert_eq!(product.name, "Sutra Printed Sweatshirt");
    }

    #[test]
    fn retailer_marker_rescues_lowercased_text() {
        let product =
            parse("order update from myntra.com: your slim fit cotton trousers shipped").unwrap();
        assert_eq!(product.brand, "Myntra");
        assert_eq!(product.name, "slim fit cotton trousers");
    }

    #[test]
    fn marker_without_garment_vocabulary_is_not_a_product() {
        assert!(parse("track your package at myntra.com").is_none());
        assert!(parse("unsubscribe via www2.hm.com/preferences").is_none());
    }

    #[test]
    fn unusable_text_yields_none() {
        assert!(parse("").is_none());
        assert!(parse("1234 5678").is_none());
        assert!(parse("Hi there").is_none());
    }

    #[test]
    fn at_most_one_product() {
        let text = "Roadster Casual Shirt and Nike Slim Fit Trousers";
        let product = parse(text).unwrap();
        assert_eq!(product.brand, "Nike");
    }
}

//! Myntra order-confirmation layout parser.
//!
//! Myntra templates carry stable element ids (`ItemProductName`,
//! `ItemProductBrandName`, ...) inside `.productListContainer` blocks,
//! so extraction is straight selector lookups.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::parsers::element_text;
use crate::pipeline::types::RawProduct;

static CONTAINER: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".productListContainer, .productListContainerLastBeforeItem")
        .expect("selector")
});
static NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[id*="ItemProductName"]"#).expect("selector"));
static BRAND: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[id*="ItemProductBrandName"]"#).expect("selector"));
static SIZE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[id*="ItemSize"]"#).expect("selector"));
static QUANTITY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[id*="ItemQuantity"]"#).expect("selector"));
static SELLER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[id*="ItemSellerName"]"#).expect("selector"));
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").expect("selector"));

static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").expect("regex"));

pub fn parse(html: &str) -> Vec<RawProduct> {
    let document = Html::parse_document(html);
    let mut products = Vec::new();

    for container in document.select(&CONTAINER) {
        let name = select_text(container, &NAME);
        if name.is_empty() {
            continue;
        }

        let mut brand = select_text(container, &BRAND);
        // Marketplace orders list the seller instead of a brand element.
        let seller = select_text(container, &SELLER);
        if !seller.is_empty() {
            brand = seller;
        }
        if brand.is_empty() {
            brand = "Myntra".into();
        }

        let quantity = FIRST_NUMBER
            .captures(&select_text(container, &QUANTITY))
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(1);

        let image_url = container
            .select(&IMG)
            .next()
            .and_then(|img| img.value().attr("src"))
            .unwrap_or_default()
            .to_string();

        products.push(RawProduct {
            brand,
            name,
            size: select_text(container, &SIZE),
            quantity,
            image_url,
            ..Default::default()
        });
    }

    products
}

fn select_text(scope: ElementRef<'_>, selector: &Selector) -> String {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .unwrap_or_default()
}

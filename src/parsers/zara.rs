//! Zara order-confirmation layout parser.
//!
//! Zara mails render each product as a `table.rd-product` block: product
//! photo, an upper-case name line, a grey colour/reference line, a
//! "N unit / ₹ price" line and a short size line. Field roles are
//! recovered from those conventions, not from markup ids.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::parsers::element_text;
use crate::pipeline::types::RawProduct;

static PRODUCT_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.rd-product").expect("selector"));
static PRODUCT_IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img.rd-product-img").expect("selector"));
static DIVS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").expect("selector"));

static PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"₹\s*([\d,]+\.?\d*)").expect("regex"));
static QUANTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*unit").expect("regex"));

pub fn parse(html: &str) -> Vec<RawProduct> {
    let document = Html::parse_document(html);
    let mut products = Vec::new();

    for table in document.select(&PRODUCT_TABLE) {
        let mut product = RawProduct {
            brand: "Zara".into(),
            ..Default::default()
        };

        if let Some(img) = table.select(&PRODUCT_IMG).next() {
            if let Some(src) = img.value().attr("src") {
                product.image_url = src.to_string();
            }
        }

        for div in table.select(&DIVS) {
            let text = element_text(div);
            if text.is_empty() {
                continue;
            }
            let style = div.value().attr("style").unwrap_or_default();

            // First all-caps line is the product name.
            if product.name.is_empty() && text == text.to_uppercase() {
                product.name = text;
                continue;
            }

            // Grey line carries "<colour> <reference>", the reference being
            // a digit-led token like 0/8574/400/707/04.
            if style.contains("#666666") {
                if let Some((color, _reference)) = split_color_reference(&text) {
                    product.color = color;
                }
                continue;
            }

            if text.to_lowercase().contains("unit") {
                if let Some(caps) = PRICE.captures(&text) {
                    product.price = format!("₹ {}", &caps[1]);
                }
                if let Some(caps) = QUANTITY.captures(&text) {
                    product.quantity = caps[1].parse().unwrap_or(1);
                }
                continue;
            }

            if product.size.is_empty() && text.chars().count() <= 20 {
                product.size = text;
            }
        }

        if !product.name.is_empty() {
            products.push(product);
        }
    }

    products
}

/// Split "camel 0/8574/400/707/04" at the first digit-led `/` token.
fn split_color_reference(text: &str) -> Option<(String, String)> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let split_at = tokens.iter().position(|t| {
        t.contains('/') && t.chars().next().is_some_and(|c| c.is_ascii_digit())
    })?;
    if split_at == 0 {
        return None;
    }
    Some((
        tokens[..split_at].join(" "),
        tokens[split_at..].join(" "),
    ))
}

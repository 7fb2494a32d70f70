//! Chat-model fallback extraction for layouts without a structural parser.
//!
//! The email HTML is flattened to text with image URLs inlined as tagged
//! lines, sent to a chat-completions endpoint with a retailer-aware
//! prompt, and the reply is parsed leniently: fences stripped, first
//! balanced JSON array taken, anything else treated as zero products.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::Html;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::error::{ExtractionError, ModelError};
use crate::pipeline::types::{EmailMessage, ExtractStrategy, RawProduct, Retailer};

const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// URLs shorter than this are only inlined when they carry product hints.
const INLINE_URL_MIN_LEN: usize = 100;

const URL_HINTS: &[&str] = &[
    "product",
    "myntassets",
    "assets.hm.com",
    "static.zara.net",
    "myntra",
    "hm.com",
];

/// One completion request to the chat model.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Seam for the chat model so extraction can be tested without a network.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String, ModelError>;
}

// ── HTTP client ─────────────────────────────────────────────────────

/// OpenAI-compatible chat-completions client.
pub struct HttpModelClient {
    http: reqwest::Client,
    config: ModelConfig,
}

impl HttpModelClient {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ModelError::RequestFailed(e.to_string()))?;
        Ok(Self { http, config })
    }
}

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, ModelError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
        });

        let send = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.config.timeout, send)
            .await
            .map_err(|_| ModelError::Timeout(self.config.timeout))?
            .map_err(|e| ModelError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => ModelError::Auth(text),
                429 if text.to_lowercase().contains("quota") => ModelError::QuotaExhausted(text),
                429 => ModelError::RateLimited { retry_after },
                _ => ModelError::RequestFailed(format!("{status}: {text}")),
            });
        }

        let completion: Completion = response
            .json()
            .await
            .map_err(|e| ModelError::RequestFailed(format!("body decode: {e}")))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ModelError::EmptyCompletion)
    }
}

// ── Strategy ────────────────────────────────────────────────────────

pub struct GenerativeStrategy {
    client: Arc<dyn ModelClient>,
    max_tokens: u32,
}

impl GenerativeStrategy {
    pub fn new(client: Arc<dyn ModelClient>, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }
}

#[async_trait]
impl ExtractStrategy for GenerativeStrategy {
    fn name(&self) -> &'static str {
        "generative"
    }

    fn supports(&self, _retailer: Option<Retailer>) -> bool {
        true
    }

    async fn extract(
        &self,
        email: &EmailMessage,
        retailer: Option<Retailer>,
    ) -> Result<Vec<RawProduct>, ExtractionError> {
        let Some(body) = email.body() else {
            return Ok(Vec::new());
        };

        let text = html_to_text(body);
        let request = ChatRequest {
            system: build_system_prompt(),
            prompt: build_extraction_prompt(retailer, &text),
            max_tokens: self.max_tokens,
            temperature: EXTRACTION_TEMPERATURE,
        };

        let reply = self.client.complete(request).await?;
        let mut products = parse_model_reply(&reply);

        for product in &mut products {
            if product.brand.trim().is_empty() {
                product.brand = retailer.map(|r| r.brand().to_string()).unwrap_or_default();
            }
        }
        products.retain(|p| !p.name.trim().is_empty());

        debug!(email_id = %email.id, count = products.len(), "Generative parse");
        Ok(products)
    }
}

fn build_system_prompt() -> String {
    "You extract purchased clothing products from order-confirmation emails. \
     Reply with a JSON array only, no commentary."
        .to_string()
}

/// User prompt describing the exact array schema, with retailer-specific
/// pointers where the layout is known to be quirky.
pub fn build_extraction_prompt(retailer: Option<Retailer>, email_text: &str) -> String {
    let retailer_notes = match retailer {
        Some(Retailer::Myntra) => {
            "This is a Myntra order. Product images live on myntassets.com; \
             sizes appear as \"Size: X\" and quantities as \"Qty: N\"."
        }
        Some(Retailer::Hm) => {
            "This is an H&M order. Article details appear as labelled rows \
             (Art. No., Color, Size, Quantity)."
        }
        Some(Retailer::Zara) => {
            "This is a Zara order. Names are upper-case lines; the line under \
             a name holds \"<colour> <reference>\"; prices look like ₹ 3,330.00."
        }
        None => "The retailer is unknown; rely on the text itself.",
    };

    format!(
        "Extract every purchased product from this order email.\n\
         {retailer_notes}\n\n\
         Return a JSON array where each element has these string fields:\n\
         brand, name, color, size, price, imageUrl, and integer quantity.\n\
         Keep prices exactly as written in the email, including the currency\n\
         symbol and separators. Use \"\" for anything missing. Lines starting\n\
         with IMAGE_URL: mark product images; match them to products in order.\n\n\
         EMAIL:\n{email_text}"
    )
}

// ── HTML flattening ─────────────────────────────────────────────────

/// Flatten HTML to text, inlining interesting image URLs as tagged lines.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();

    for node in document.tree.nodes() {
        match node.value() {
            scraper::Node::Text(text) => {
                let inside_ignored = node.ancestors().any(|a| {
                    a.value()
                        .as_element()
                        .is_some_and(|e| matches!(e.name(), "script" | "style" | "head"))
                });
                if !inside_ignored {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        out.push_str(trimmed);
                        out.push('\n');
                    }
                }
            }
            scraper::Node::Element(element) => {
                if element.name() == "img" {
                    if let Some(src) = element.attr("src") {
                        if should_inline_url(src) {
                            out.push_str(&format!("IMAGE_URL: {src}\n"));
                        }
                    }
                }
                if let Some(style) = element.attr("style") {
                    if let Some(url) = background_image_url(style) {
                        if should_inline_url(&url) {
                            out.push_str(&format!("BACKGROUND_IMAGE_URL: {url}\n"));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    decode_html_entities(&out)
}

fn should_inline_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    url.len() > INLINE_URL_MIN_LEN || URL_HINTS.iter().any(|h| lower.contains(h))
}

fn background_image_url(style: &str) -> Option<String> {
    let idx = style.find("background-image")?;
    let rest = &style[idx..];
    let open = rest.find("url(")?;
    let tail = &rest[open + 4..];
    let close = tail.find(')')?;
    Some(tail[..close].trim_matches(['\'', '"', ' ']).to_string())
}

// ── Reply parsing ───────────────────────────────────────────────────

/// Lenient reply handling: strip markdown fences, locate the first
/// balanced JSON array, parse it. Anything else means zero products.
pub fn parse_model_reply(reply: &str) -> Vec<RawProduct> {
    let cleaned = reply.replace("```json", "").replace("```", "");
    let Some(array) = extract_json_array(&cleaned) else {
        warn!("Model reply contained no JSON array");
        return Vec::new();
    };

    match serde_json::from_str::<Vec<RawProduct>>(array) {
        Ok(mut products) => {
            for p in &mut products {
                p.brand = decode_html_entities(&p.brand);
                p.name = decode_html_entities(&p.name);
                p.color = decode_html_entities(&p.color);
                p.size = decode_html_entities(&p.size);
                p.image_url = decode_html_entities(&p.image_url);
            }
            products
        }
        Err(e) => {
            warn!(error = %e, "Model reply array did not parse");
            Vec::new()
        }
    }
}

/// First balanced top-level `[...]`, ignoring brackets inside strings.
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode the HTML entities retailer templates actually emit.
pub fn decode_html_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';').filter(|&s| s <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let entity = &tail[1..semi];
        let decoded: Option<char> = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "nbsp" => Some(' '),
            "apos" => Some('\''),
            _ => {
                if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok().and_then(char::from_u32)
                } else {
                    None
                }
            }
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    struct MockModel {
        reply: String,
    }

    #[async_trait]
    impl ModelClient for MockModel {
        async fn complete(&self, request: ChatRequest) -> Result<String, ModelError> {
            assert!(request.temperature <= 0.2);
            Ok(self.reply.clone())
        }
    }

    fn email(html: &str) -> EmailMessage {
        EmailMessage {
            id: "m1".into(),
            thread_id: "t1".into(),
            sender: "orders@example.com".into(),
            subject: "Your order".into(),
            received_at: Utc::now(),
            html_body: Some(html.into()),
            text_body: None,
            unread: true,
        }
    }

    #[tokio::test]
    async fn fenced_reply_parses_into_products() {
        let strategy = GenerativeStrategy::new(
            Arc::new(MockModel {
                reply: "```json\n[{\"brand\":\"Roadster\",\"name\":\"Casual Shirt\",\
                        \"price\":\"₹ 1,299.00\",\"quantity\":1}]\n```"
                    .into(),
            }),
            2000,
        );
        let products = strategy
            .extract(&email("<p>order</p>"), Some(Retailer::Myntra))
            .await
            .unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].price, "₹ 1,299.00");
    }

    #[tokio::test]
    async fn prose_reply_means_zero_products() {
        let strategy = GenerativeStrategy::new(
            Arc::new(MockModel {
                reply: "I could not find any products in this email.".into(),
            }),
            2000,
        );
        let products = strategy.extract(&email("<p>hi</p>"), None).await.unwrap();
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn nameless_entries_are_dropped_and_brand_defaults() {
        let strategy = GenerativeStrategy::new(
            Arc::new(MockModel {
                reply: r#"[{"brand":"","name":"Knit Sweater"},{"brand":"X","name":""}]"#.into(),
            }),
            2000,
        );
        let products = strategy
            .extract(&email("<p>order</p>"), Some(Retailer::Hm))
            .await
            .unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].brand, "H&M");
    }

    #[test]
    fn json_array_is_found_amid_prose_and_nesting() {
        let reply = r#"Here you go: [{"name":"A [sample]","tags":["x","]"]}] thanks"#;
        let array = extract_json_array(reply).unwrap();
        assert!(array.starts_with('['));
        assert!(serde_json::from_str::<serde_json::Value>(array).is_ok());
    }

    #[test]
    fn object_reply_is_not_an_array() {
        assert!(extract_json_array(r#"{"name":"x"}"#).is_none());
        assert!(parse_model_reply(r#"{"name":"x"}"#).is_empty());
    }

    #[test]
    fn entities_decode() {
        assert_eq!(decode_html_entities("M&amp;S"), "M&S");
        assert_eq!(decode_html_entities("a&#x2F;b"), "a/b");
        assert_eq!(decode_html_entities("&#8377; 999"), "₹ 999");
        assert_eq!(decode_html_entities("AT&T &unknown; x"), "AT&T &unknown; x");
    }

    #[test]
    fn html_flattening_inlines_product_images_only() {
        let html = r#"<html><head><style>.x{color:red}</style></head><body>
            <p>Order confirmed</p>
            <img src="https://assets.myntassets.com/h_1440/a.jpg">
            <img src="https://cdn.x.com/spacer.gif">
            <div style="background-image: url('https://x.com/productpage/b.jpg')">sale</div>
            </body></html>"#;
        let text = html_to_text(html);
        assert!(text.contains("Order confirmed"));
        assert!(text.contains("IMAGE_URL: https://assets.myntassets.com/h_1440/a.jpg"));
        assert!(!text.contains("spacer.gif"));
        assert!(text.contains("BACKGROUND_IMAGE_URL: https://x.com/productpage/b.jpg"));
        assert!(!text.contains("color:red"));
    }
}

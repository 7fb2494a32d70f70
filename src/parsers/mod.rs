//! Product extraction strategies.
//!
//! Three tiers: deterministic DOM parsers for known retailer layouts,
//! a chat-model fallback for unknown layouts, and a last-resort text
//! heuristic. The orchestrator chains them via [`ExtractStrategy`].

pub mod generative;
pub mod heuristic;
pub mod hm;
pub mod myntra;
pub mod zara;

use async_trait::async_trait;
use scraper::ElementRef;
use tracing::debug;

use crate::error::ExtractionError;
use crate::pipeline::types::{EmailMessage, ExtractStrategy, RawProduct, Retailer};

/// Identify the retailer from sender, subject and body hints.
pub fn detect_retailer(email: &EmailMessage) -> Option<Retailer> {
    let subject = email.subject.to_lowercase();
    let sender = email.sender.to_lowercase();
    let body = email
        .html_body
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();

    if sender.contains("myntra") || subject.contains("myntra") || body.contains("myntra") {
        return Some(Retailer::Myntra);
    }
    if sender.contains("hm.com")
        || subject.contains("h&m")
        || contains_word(&subject, "hm")
        || body.contains("hm.com")
    {
        return Some(Retailer::Hm);
    }
    if sender.contains("zara") || subject.contains("zara") || body.contains("zara.com") {
        return Some(Retailer::Zara);
    }
    None
}

/// Whole-token match; "hm" must not fire inside "cashmere" or "Ahmed".
fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|w| w == word)
}

/// Run the layout parser for a retailer over an HTML body.
pub fn structural_parse(retailer: Retailer, html: &str) -> Vec<RawProduct> {
    match retailer {
        Retailer::Zara => zara::parse(html),
        Retailer::Myntra => myntra::parse(html),
        Retailer::Hm => hm::parse(html),
    }
}

/// Strategy wrapper over the per-retailer DOM parsers.
pub struct StructuralStrategy;

#[async_trait]
impl ExtractStrategy for StructuralStrategy {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn supports(&self, retailer: Option<Retailer>) -> bool {
        retailer.is_some()
    }

    async fn extract(
        &self,
        email: &EmailMessage,
        retailer: Option<Retailer>,
    ) -> Result<Vec<RawProduct>, ExtractionError> {
        let Some(retailer) = retailer else {
            return Ok(Vec::new());
        };
        let Some(html) = email.html_body.as_deref() else {
            return Ok(Vec::new());
        };
        let products = structural_parse(retailer, html);
        debug!(email_id = %email.id, %retailer, count = products.len(), "Structural parse");
        Ok(products)
    }
}

/// Whole text content of an element, whitespace collapsed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}

pub(crate) fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn email(sender: &str, subject: &str, html: &str) -> EmailMessage {
        EmailMessage {
            id: "m1".into(),
            thread_id: "t1".into(),
            sender: sender.into(),
            subject: subject.into(),
            received_at: Utc::now(),
            html_body: Some(html.into()),
            text_body: None,
            unread: true,
        }
    }

    #[test]
    fn detects_retailer_from_sender_then_subject_then_body() {
        assert_eq!(
            detect_retailer(&email("order@myntra.com", "", "<p></p>")),
            Some(Retailer::Myntra)
        );
        assert_eq!(
            detect_retailer(&email("x@y.com", "Your H&M order", "<p></p>")),
            Some(Retailer::Hm)
        );
        assert_eq!(
            detect_retailer(&email("x@y.com", "hello", "see zara.com for details")),
            Some(Retailer::Zara)
        );
        assert_eq!(detect_retailer(&email("x@y.com", "hello", "<p></p>")), None);
    }

    #[test]
    fn hm_token_must_stand_alone_in_the_subject() {
        assert_eq!(
            detect_retailer(&email("x@y.com", "Cashmere sweaters are back", "<p></p>")),
            None
        );
        assert_eq!(
            detect_retailer(&email("ahmed@y.com", "Thanks for your order", "<p></p>")),
            None
        );
        assert_eq!(
            detect_retailer(&email("x@y.com", "Your HM order confirmation", "<p></p>")),
            Some(Retailer::Hm)
        );
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a \n\t b  c "), "a b c");
    }
}

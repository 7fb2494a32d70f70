//! Core types flowing through the ingest pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

/// Retailers with a structural parser and a search-query profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Retailer {
    Zara,
    Myntra,
    Hm,
}

impl Retailer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Retailer::Zara => "zara",
            Retailer::Myntra => "myntra",
            Retailer::Hm => "hm",
        }
    }

    /// Display brand used when a parser cannot recover one from the mail.
    pub fn brand(&self) -> &'static str {
        match self {
            Retailer::Zara => "Zara",
            Retailer::Myntra => "Myntra",
            Retailer::Hm => "H&M",
        }
    }
}

impl std::fmt::Display for Retailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fetched email, body parts already decoded.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub id: String,
    pub thread_id: String,
    pub sender: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub unread: bool,
}

impl EmailMessage {
    /// Best available body for parsing: html first, plain text otherwise.
    pub fn body(&self) -> Option<&str> {
        self.html_body
            .as_deref()
            .or(self.text_body.as_deref())
            .filter(|b| !b.trim().is_empty())
    }
}

/// A product as a parser saw it, before normalization. String fields keep
/// whatever the mail contained; prices stay formatted verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProduct {
    pub brand: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub price: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, rename = "imageUrl", alias = "image_url")]
    pub image_url: String,
    #[serde(default)]
    pub category: String,
}

fn default_quantity() -> u32 {
    1
}

/// Which extraction strategies to run for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyChoice {
    /// Structural, then generative, then heuristic; first non-empty wins.
    Auto,
    Structural,
    Generative,
    Heuristic,
}

impl Default for StrategyChoice {
    fn default() -> Self {
        StrategyChoice::Auto
    }
}

/// One extraction strategy in the fallback chain.
#[async_trait]
pub trait ExtractStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy knows the retailer's layout. `None` means the
    /// retailer was not detected; only layout-independent strategies apply.
    fn supports(&self, retailer: Option<Retailer>) -> bool;

    async fn extract(
        &self,
        email: &EmailMessage,
        retailer: Option<Retailer>,
    ) -> Result<Vec<RawProduct>, ExtractionError>;
}

/// An ingest job request.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub user_id: String,
    /// Restrict to one retailer, or search all known profiles.
    pub retailer: Option<Retailer>,
    /// Explicit message ids; skips the mailbox search when set.
    pub email_ids: Option<Vec<String>>,
    pub strategy: StrategyChoice,
}

/// A per-email failure recorded in the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailFailure {
    pub email_id: String,
    pub message: String,
}

/// Aggregated result of one ingest job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub emails_found: usize,
    pub emails_processed: usize,
    pub products_extracted: usize,
    pub items_written: usize,
    pub duplicates_skipped: usize,
    pub errors: Vec<EmailFailure>,
    /// Emails per winning strategy name, for the job report.
    pub strategy_wins: std::collections::BTreeMap<String, usize>,
}

impl IngestOutcome {
    pub fn merge(&mut self, other: EmailOutcome) {
        self.emails_processed += 1;
        self.products_extracted += other.products_extracted;
        self.items_written += other.items_written;
        self.duplicates_skipped += other.duplicates_skipped;
        if let Some(strategy) = other.winning_strategy {
            *self.strategy_wins.entry(strategy).or_insert(0) += 1;
        }
        if let Some(failure) = other.failure {
            self.errors.push(failure);
        }
    }
}

/// What one worker produced for one email.
#[derive(Debug, Clone, Default)]
pub struct EmailOutcome {
    pub products_extracted: usize,
    pub items_written: usize,
    pub duplicates_skipped: usize,
    pub winning_strategy: Option<String>,
    pub failure: Option<EmailFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_prefers_html_and_skips_blank() {
        let mut email = EmailMessage {
            id: "m1".into(),
            thread_id: "t1".into(),
            sender: "noreply@zara.com".into(),
            subject: "Thank you for your purchase".into(),
            received_at: Utc::now(),
            html_body: Some("<p>hi</p>".into()),
            text_body: Some("hi".into()),
            unread: true,
        };
        assert_eq!(email.body(), Some("<p>hi</p>"));

        email.html_body = Some("   ".into());
        assert_eq!(email.body(), None);

        email.html_body = None;
        assert_eq!(email.body(), Some("hi"));
    }

    #[test]
    fn raw_product_deserializes_model_field_names() {
        let raw: RawProduct = serde_json::from_str(
            r#"{"brand":"Zara","name":"OVERSHIRT","imageUrl":"https://x/img.jpg"}"#,
        )
        .unwrap();
        assert_eq!(raw.image_url, "https://x/img.jpg");
        assert_eq!(raw.quantity, 1);
    }

    #[test]
    fn outcome_merge_accumulates() {
        let mut total = IngestOutcome::default();
        total.merge(EmailOutcome {
            products_extracted: 2,
            items_written: 1,
            duplicates_skipped: 1,
            winning_strategy: Some("structural".into()),
            failure: None,
        });
        total.merge(EmailOutcome {
            failure: Some(EmailFailure {
                email_id: "m2".into(),
                message: "no body".into(),
            }),
            ..Default::default()
        });

        assert_eq!(total.emails_processed, 2);
        assert_eq!(total.items_written + total.duplicates_skipped, 2);
        assert_eq!(total.errors.len(), 1);
        assert_eq!(total.strategy_wins.get("structural"), Some(&1));
    }
}

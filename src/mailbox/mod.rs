//! Mailbox access: gateway trait, search-query construction, body decoding.

mod gmail;

pub use gmail::GmailRestGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MailboxError;
use crate::pipeline::types::{EmailMessage, Retailer};

/// A search hit; the full message is fetched separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSummary {
    pub id: String,
    pub thread_id: String,
}

/// Mailbox search parameters.
#[derive(Debug, Clone)]
pub struct MailQuery {
    /// Provider query string, see [`retailer_query`].
    pub terms: String,
    pub max_results: u32,
    pub only_unread: bool,
    /// Also search spam and trash folders.
    pub include_all_folders: bool,
}

/// Read-side mailbox operations used by the orchestrator.
#[async_trait]
pub trait MailboxGateway: Send + Sync {
    async fn search(&self, query: &MailQuery) -> Result<Vec<EmailSummary>, MailboxError>;

    async fn fetch(&self, id: &str) -> Result<EmailMessage, MailboxError>;

    /// Clear the unread flag. Callers treat failure as best-effort.
    async fn mark_read(&self, id: &str) -> Result<(), MailboxError>;
}

/// Build the provider search string for a retailer's order mails.
///
/// Combines sender domains, brand tokens in the subject, common
/// order-confirmation phrases and forwarded-mail variants, restricted to
/// `after:` the cutoff date when given.
pub fn retailer_query(retailer: Retailer, after: Option<DateTime<Utc>>) -> String {
    let (domains, brand, phrases): (&[&str], &str, &[&str]) = match retailer {
        Retailer::Zara => (
            &["zara.com", "noreply@zara.com"],
            "zara",
            &["thank you for your purchase", "order confirmation"],
        ),
        Retailer::Myntra => (
            &["myntra.com"],
            "myntra",
            &["order confirmed", "order has been confirmed", "your order"],
        ),
        Retailer::Hm => (
            &["hm.com", "delivery.hm.com"],
            "h&m",
            &["order confirmation", "thanks for your order"],
        ),
    };

    let mut clauses = Vec::new();
    for d in domains {
        clauses.push(format!("from:{d}"));
    }
    clauses.push(format!("subject:({brand})"));
    clauses.push(format!("subject:(fwd {brand})"));
    for p in phrases {
        clauses.push(format!("subject:(\"{p}\")"));
    }

    let mut query = format!("({})", clauses.join(" OR "));
    if let Some(cutoff) = after {
        query.push_str(&format!(" after:{}", cutoff.format("%Y/%m/%d")));
    }
    query
}

/// Decode quoted-printable content: soft line breaks (`=` at end of line)
/// are removed, `=XX` hex escapes become bytes. Some retailers' HTML mails
/// arrive transfer-encoded this way.
pub fn decode_quoted_printable(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' {
            // Soft break: =\r\n or =\n
            if bytes.get(i + 1) == Some(&b'\r') && bytes.get(i + 2) == Some(&b'\n') {
                i += 3;
                continue;
            }
            if bytes.get(i + 1) == Some(&b'\n') {
                i += 2;
                continue;
            }
            if let (Some(&h), Some(&l)) = (bytes.get(i + 1), bytes.get(i + 2)) {
                if let (Some(hv), Some(lv)) = (hex_val(h), hex_val(l)) {
                    out.push(hv * 16 + lv);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Heuristic for bodies that still carry quoted-printable escapes.
pub fn looks_quoted_printable(body: &str) -> bool {
    body.contains("=3D") || body.contains("=\r\n") || body.contains("=\n")
}

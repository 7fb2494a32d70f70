//! Gmail REST API gateway.
//!
//! Token acquisition and refresh happen outside this tool; the gateway
//! takes a ready bearer token and maps HTTP status codes onto the error
//! taxonomy so the retry layer can tell transient from fatal.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::GmailConfig;
use crate::error::MailboxError;
use crate::mailbox::{
    EmailSummary, MailQuery, MailboxGateway, decode_quoted_printable, looks_quoted_printable,
};
use crate::pipeline::types::EmailMessage;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GmailRestGateway {
    http: reqwest::Client,
    config: GmailConfig,
}

impl GmailRestGateway {
    pub fn new(config: GmailConfig) -> Result<Self, MailboxError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MailboxError::Network(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        params: &[(&str, String)],
    ) -> Result<T, MailboxError> {
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .query(params)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode_response(response).await
    }
}

#[async_trait]
impl MailboxGateway for GmailRestGateway {
    async fn search(&self, query: &MailQuery) -> Result<Vec<EmailSummary>, MailboxError> {
        let mut q = query.terms.clone();
        if query.only_unread {
            q.push_str(" is:unread");
        }

        let mut params = vec![
            ("q", q),
            ("maxResults", query.max_results.to_string()),
        ];
        if query.include_all_folders {
            params.push(("includeSpamTrash", "true".into()));
        }

        let listing: MessageListing = self
            .get_json(self.url("messages"), &params)
            .await?;

        let hits = listing.messages.unwrap_or_default();
        debug!(count = hits.len(), "Mailbox search complete");
        Ok(hits
            .into_iter()
            .map(|m| EmailSummary {
                id: m.id,
                thread_id: m.thread_id,
            })
            .collect())
    }

    async fn fetch(&self, id: &str) -> Result<EmailMessage, MailboxError> {
        let message: FullMessage = self
            .get_json(
                self.url(&format!("messages/{id}")),
                &[("format", "full".to_string())],
            )
            .await?;
        message_from_payload(message)
    }

    async fn mark_read(&self, id: &str) -> Result<(), MailboxError> {
        let response = self
            .http
            .post(self.url(&format!("messages/{id}/modify")))
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&json!({ "removeLabelIds": ["UNREAD"] }))
            .send()
            .await
            .map_err(map_transport_error)?;
        decode_response::<serde_json::Value>(response).await?;
        Ok(())
    }
}

fn map_transport_error(e: reqwest::Error) -> MailboxError {
    if e.is_timeout() {
        MailboxError::Timeout(REQUEST_TIMEOUT)
    } else {
        MailboxError::Network(e.to_string())
    }
}

async fn decode_response<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, MailboxError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| MailboxError::Network(format!("body decode: {e}")));
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    Err(match status.as_u16() {
        401 | 403 => MailboxError::Auth(body),
        404 => MailboxError::NotFound { id: String::new() },
        429 => MailboxError::RateLimited { retry_after },
        code => MailboxError::BadResponse { status: code, body },
    })
}

// ── Gmail payload mapping ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListing {
    messages: Option<Vec<MessageRef>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
    thread_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullMessage {
    id: String,
    thread_id: String,
    #[serde(default)]
    label_ids: Vec<String>,
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

fn message_from_payload(message: FullMessage) -> Result<EmailMessage, MailboxError> {
    let payload = message.payload.ok_or_else(|| MailboxError::EmptyBody {
        id: message.id.clone(),
    })?;

    let header = |name: &str| {
        payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
            .unwrap_or_default()
    };
    let sender = header("From");
    let subject = header("Subject");

    let received_at = message
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    let mut html_body = None;
    let mut text_body = None;
    collect_bodies(&payload, &mut html_body, &mut text_body);

    if html_body.is_none() && text_body.is_none() {
        return Err(MailboxError::EmptyBody { id: message.id });
    }

    Ok(EmailMessage {
        id: message.id,
        thread_id: message.thread_id,
        sender,
        subject,
        received_at,
        html_body,
        text_body,
        unread: message.label_ids.iter().any(|l| l == "UNREAD"),
    })
}

/// Depth-first over MIME parts; first html and first plain part win.
fn collect_bodies(
    part: &MessagePart,
    html: &mut Option<String>,
    text: &mut Option<String>,
) {
    if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
        if let Some(decoded) = decode_body_data(data) {
            match part.mime_type.as_str() {
                "text/html" if html.is_none() => *html = Some(decoded),
                "text/plain" if text.is_none() => *text = Some(decoded),
                _ => {}
            }
        }
    }
    for child in &part.parts {
        if html.is_some() && text.is_some() {
            return;
        }
        collect_bodies(child, html, text);
    }
}

/// Gmail body data is base64url, padding optional. Residual
/// quoted-printable escapes are decoded afterwards.
fn decode_body_data(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    let body = String::from_utf8_lossy(&bytes).into_owned();
    Some(if looks_quoted_printable(&body) {
        decode_quoted_printable(&body)
    } else {
        body
    })
}

//! Error types for closetsync.

use std::time::Duration;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Message not found: {id}")]
    NotFound { id: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected response ({status}): {body}")]
    BadResponse { status: u16, body: String },

    #[error("Message {id} has no readable body")]
    EmptyBody { id: String },
}

/// Extraction strategy errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Strategy {strategy} failed: {reason}")]
    StrategyFailed { strategy: String, reason: String },

    #[error("No strategy supports retailer {0}")]
    UnsupportedRetailer(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

/// Chat-model client errors.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Model request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Empty completion")]
    EmptyCompletion,
}

/// Normalization errors. Mostly tolerated per item; only surfaced when the
/// whole step cannot run.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Image fetch failed: {0}")]
    ImageFetch(String),

    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    #[error("Detector error: {0}")]
    Detector(String),
}

/// Wardrobe store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Whether an error is worth another attempt.
///
/// Transient errors (network blips, timeouts, rate limits, server errors)
/// are retried by [`crate::retry::RetryPolicy`]; everything else is returned
/// to the caller on the first attempt.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for MailboxError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            MailboxError::RateLimited { .. }
                | MailboxError::Network(_)
                | MailboxError::Timeout(_)
                | MailboxError::BadResponse { status: 500..=599, .. }
        )
    }
}

impl Retryable for ModelError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::RateLimited { .. }
                | ModelError::Timeout(_)
                | ModelError::RequestFailed(_)
        )
    }
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

impl Retryable for ExtractionError {
    fn is_transient(&self) -> bool {
        match self {
            ExtractionError::Model(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl Retryable for Error {
    fn is_transient(&self) -> bool {
        match self {
            Error::Mailbox(e) => e.is_transient(),
            Error::Model(e) => e.is_transient(),
            Error::Store(e) => e.is_transient(),
            Error::Extraction(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_not_transient() {
        assert!(!MailboxError::Auth("expired token".into()).is_transient());
        assert!(!ModelError::Auth("bad key".into()).is_transient());
    }

    #[test]
    fn rate_limits_and_timeouts_are_transient() {
        assert!(MailboxError::RateLimited { retry_after: None }.is_transient());
        assert!(MailboxError::Timeout(Duration::from_secs(30)).is_transient());
        assert!(ModelError::RateLimited { retry_after: None }.is_transient());
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        assert!(
            MailboxError::BadResponse {
                status: 503,
                body: "unavailable".into()
            }
            .is_transient()
        );
        assert!(
            !MailboxError::BadResponse {
                status: 422,
                body: "invalid filter".into()
            }
            .is_transient()
        );
        assert!(!MailboxError::NotFound { id: "m1".into() }.is_transient());
    }

    #[test]
    fn quota_exhaustion_is_permanent() {
        assert!(!ModelError::QuotaExhausted("monthly cap".into()).is_transient());
    }
}

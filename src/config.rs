//! Runtime configuration for the ingest pipeline.
//!
//! Everything is overridable via `CLOSETSYNC_*` environment variables;
//! `Default` gives a working local setup apart from the two secrets.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Top-level ingest configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Bounded worker pool size for per-email processing (1..=8).
    pub workers: usize,
    /// How far back mailbox searches reach.
    pub days_back: u32,
    /// Cap on messages returned per mailbox search.
    pub max_results: u32,
    /// Restrict searches to unread messages.
    pub only_unread: bool,
    /// Mark messages read after successful processing (best effort).
    pub mark_read: bool,
    pub retry: RetryConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            days_back: 30,
            max_results: 20,
            only_unread: true,
            mark_read: true,
            retry: RetryConfig::default(),
        }
    }
}

/// Knobs for [`crate::retry::RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Chat-model endpoint configuration for the generative parser.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ModelConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("CLOSETSYNC_MODEL_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("CLOSETSYNC_MODEL_API_KEY".into()))?;

        Ok(Self {
            endpoint: std::env::var("CLOSETSYNC_MODEL_ENDPOINT")
                .unwrap_or_else(|_| "https://api.mistral.ai/v1/chat/completions".into()),
            api_key: SecretString::from(api_key),
            model: std::env::var("CLOSETSYNC_MODEL")
                .unwrap_or_else(|_| "mistral-small-latest".into()),
            max_tokens: env_parse("CLOSETSYNC_MODEL_MAX_TOKENS", 2000)?,
            timeout: Duration::from_secs(env_parse("CLOSETSYNC_MODEL_TIMEOUT_SECS", 45)?),
        })
    }
}

/// Gmail REST gateway configuration.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    /// OAuth bearer token. Acquisition and refresh happen outside this tool.
    pub access_token: SecretString,
    pub endpoint: String,
}

impl GmailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("CLOSETSYNC_GMAIL_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("CLOSETSYNC_GMAIL_TOKEN".into()))?;

        Ok(Self {
            access_token: SecretString::from(token),
            endpoint: std::env::var("CLOSETSYNC_GMAIL_ENDPOINT")
                .unwrap_or_else(|_| "https://gmail.googleapis.com/gmail/v1".into()),
        })
    }
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let workers: usize = env_parse("CLOSETSYNC_WORKERS", defaults.workers)?;
        if !(1..=8).contains(&workers) {
            return Err(ConfigError::InvalidValue {
                key: "CLOSETSYNC_WORKERS".into(),
                message: format!("must be 1..=8, got {workers}"),
            });
        }

        Ok(Self {
            workers,
            days_back: env_parse("CLOSETSYNC_DAYS_BACK", defaults.days_back)?,
            max_results: env_parse("CLOSETSYNC_MAX_RESULTS", defaults.max_results)?,
            only_unread: env_parse("CLOSETSYNC_ONLY_UNREAD", defaults.only_unread)?,
            mark_read: env_parse("CLOSETSYNC_MARK_READ", defaults.mark_read)?,
            retry: RetryConfig {
                max_retries: env_parse("CLOSETSYNC_MAX_RETRIES", defaults.retry.max_retries)?,
                base_delay: Duration::from_millis(env_parse(
                    "CLOSETSYNC_RETRY_BASE_MS",
                    defaults.retry.base_delay.as_millis() as u64,
                )?),
            },
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.into(),
            message: format!("could not parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = IngestConfig::default();
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.base_delay, Duration::from_secs(1));
        assert!(cfg.only_unread);
    }
}

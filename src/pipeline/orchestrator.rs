//! The ingest orchestrator: mailbox search, bounded per-email workers,
//! strategy chain, normalization and the wardrobe write, fanned back into
//! one `IngestOutcome`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::error::{Error, MailboxError, Result};
use crate::mailbox::{MailQuery, MailboxGateway, retailer_query};
use crate::normalize::Normalizer;
use crate::parsers::detect_retailer;
use crate::pipeline::types::{
    EmailFailure, EmailMessage, EmailOutcome, ExtractStrategy, IngestOutcome, IngestRequest,
    RawProduct, Retailer, StrategyChoice,
};
use crate::retry::RetryPolicy;
use crate::store::{JobRecord, JobState, WardrobeStore, WardrobeWriter};

pub struct Orchestrator {
    gateway: Arc<dyn MailboxGateway>,
    strategies: Vec<Arc<dyn ExtractStrategy>>,
    normalizer: Arc<Normalizer>,
    writer: Arc<WardrobeWriter>,
    store: Arc<dyn WardrobeStore>,
    retry: RetryPolicy,
    config: IngestConfig,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn MailboxGateway>,
        strategies: Vec<Arc<dyn ExtractStrategy>>,
        normalizer: Arc<Normalizer>,
        store: Arc<dyn WardrobeStore>,
        config: IngestConfig,
    ) -> Self {
        Self {
            gateway,
            strategies,
            normalizer,
            writer: Arc::new(WardrobeWriter::new(Arc::clone(&store))),
            store,
            retry: RetryPolicy::from_config(&config.retry),
            config,
        }
    }

    /// Run one ingest job end to end, recording its lifecycle in the
    /// job history. Only mailbox authentication failures abort a job;
    /// per-email problems are collected in the outcome.
    pub async fn run(&self, request: IngestRequest) -> Result<(Uuid, IngestOutcome)> {
        let job_id = Uuid::new_v4();
        let now = Utc::now();
        self.store
            .record_job(&JobRecord {
                id: job_id,
                user_id: request.user_id.clone(),
                state: JobState::Queued,
                created_at: now,
                updated_at: now,
            })
            .await?;

        match self.execute(job_id, &request).await {
            Ok(outcome) => {
                self.store
                    .update_job(job_id, &JobState::Completed { outcome: outcome.clone() })
                    .await?;
                info!(
                    %job_id,
                    emails = outcome.emails_processed,
                    written = outcome.items_written,
                    duplicates = outcome.duplicates_skipped,
                    "Ingest job complete"
                );
                Ok((job_id, outcome))
            }
            Err(e) => {
                error!(%job_id, error = %e, "Ingest job failed");
                let state = JobState::Failed { message: e.to_string() };
                if let Err(update_err) = self.store.update_job(job_id, &state).await {
                    warn!(%job_id, error = %update_err, "Could not record job failure");
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, job_id: Uuid, request: &IngestRequest) -> Result<IngestOutcome> {
        let email_ids = self.resolve_email_ids(request).await?;
        let total = email_ids.len();
        info!(%job_id, emails = total, "Resolved candidate emails");

        let _ = self
            .store
            .update_job(job_id, &JobState::Running { processed: 0, total })
            .await;

        let mut outcome = IngestOutcome {
            emails_found: total,
            ..Default::default()
        };

        let mut workers = futures::stream::iter(email_ids)
            .map(|id| self.process_email(id, request))
            .buffer_unordered(self.config.workers.clamp(1, 8));

        let mut processed = 0usize;
        while let Some(result) = workers.next().await {
            let email_outcome = result?;
            processed += 1;
            outcome.merge(email_outcome);
            let _ = self
                .store
                .update_job(job_id, &JobState::Running { processed, total })
                .await;
        }

        Ok(outcome)
    }

    /// Explicit ids, or a mailbox search built from the retailer profile,
    /// de-duplicated in arrival order. A request naming neither is
    /// rejected before any mailbox call.
    async fn resolve_email_ids(&self, request: &IngestRequest) -> Result<Vec<String>> {
        if let Some(ids) = &request.email_ids {
            let mut seen = HashSet::new();
            return Ok(ids
                .iter()
                .filter(|id| seen.insert(id.as_str()))
                .cloned()
                .collect());
        }

        let Some(retailer) = request.retailer else {
            return Err(Error::InvalidRequest(
                "a retailer or explicit email ids are required".into(),
            ));
        };
        let after = Utc::now() - ChronoDuration::days(self.config.days_back as i64);
        let query = MailQuery {
            terms: retailer_query(retailer, Some(after)),
            max_results: self.config.max_results,
            only_unread: self.config.only_unread,
            include_all_folders: true,
        };
        let hits = self
            .retry
            .run("mailbox_search", || self.gateway.search(&query))
            .await
            .map_err(Error::Mailbox)?;

        let mut seen = HashSet::new();
        Ok(hits
            .into_iter()
            .filter(|hit| seen.insert(hit.id.clone()))
            .map(|hit| hit.id)
            .collect())
    }

    /// One worker's whole journey for one email. Never fails the batch
    /// except on mailbox authentication errors.
    async fn process_email(
        &self,
        email_id: String,
        request: &IngestRequest,
    ) -> Result<EmailOutcome> {
        let email = match self
            .retry
            .run("mailbox_fetch", || self.gateway.fetch(&email_id))
            .await
        {
            Ok(email) => email,
            Err(e @ MailboxError::Auth(_)) => return Err(Error::Mailbox(e)),
            Err(e) => {
                warn!(%email_id, error = %e, "Email fetch failed");
                return Ok(EmailOutcome {
                    failure: Some(EmailFailure {
                        email_id,
                        message: e.to_string(),
                    }),
                    ..Default::default()
                });
            }
        };

        let retailer = request.retailer.or_else(|| detect_retailer(&email));
        let (products, winning_strategy) = self.run_strategy_chain(&email, retailer, request).await;

        if products.is_empty() {
            debug!(%email_id, "No products extracted");
            return Ok(EmailOutcome::default());
        }

        let mut items = Vec::with_capacity(products.len());
        for raw in &products {
            items.push(
                self.normalizer
                    .normalize(&request.user_id, &email, retailer, raw.clone())
                    .await,
            );
        }

        let write = match self.writer.write(&request.user_id, items).await {
            Ok(write) => write,
            Err(e) => {
                warn!(%email_id, error = %e, "Wardrobe write failed");
                return Ok(EmailOutcome {
                    products_extracted: products.len(),
                    winning_strategy,
                    failure: Some(EmailFailure {
                        email_id,
                        message: e.to_string(),
                    }),
                    ..Default::default()
                });
            }
        };

        if self.config.mark_read && email.unread {
            self.spawn_mark_read(email.id.clone());
        }

        Ok(EmailOutcome {
            products_extracted: products.len(),
            items_written: write.written,
            duplicates_skipped: write.duplicates_skipped,
            winning_strategy,
            failure: None,
        })
    }

    /// Try strategies in order; the first non-empty result wins. Each
    /// attempt goes through the retry policy, so a rate-limited or
    /// timed-out model call is retried before the chain downgrades to
    /// the next tier. Errors that survive the budget fall through.
    async fn run_strategy_chain(
        &self,
        email: &EmailMessage,
        retailer: Option<Retailer>,
        request: &IngestRequest,
    ) -> (Vec<RawProduct>, Option<String>) {
        for strategy in &self.strategies {
            if !strategy_selected(request.strategy, strategy.name()) {
                continue;
            }
            if !strategy.supports(retailer) {
                continue;
            }
            match self
                .retry
                .run(strategy.name(), || strategy.extract(email, retailer))
                .await
            {
                Ok(products) if !products.is_empty() => {
                    debug!(
                        email_id = %email.id,
                        strategy = strategy.name(),
                        count = products.len(),
                        "Strategy produced products"
                    );
                    return (products, Some(strategy.name().to_string()));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        email_id = %email.id,
                        strategy = strategy.name(),
                        error = %e,
                        "Strategy failed, trying next"
                    );
                }
            }
        }
        (Vec::new(), None)
    }

    /// Best-effort, off the worker so a slow call never holds the pool.
    fn spawn_mark_read(&self, email_id: String) {
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move {
            let result = RetryPolicy::mark_read()
                .run("mark_read", || gateway.mark_read(&email_id))
                .await;
            if let Err(e) = result {
                warn!(%email_id, error = %e, "Could not mark email read");
            }
        });
    }
}

fn strategy_selected(choice: StrategyChoice, name: &str) -> bool {
    match choice {
        StrategyChoice::Auto => true,
        StrategyChoice::Structural => name == "structural",
        StrategyChoice::Generative => name == "generative",
        StrategyChoice::Heuristic => name == "heuristic",
    }
}

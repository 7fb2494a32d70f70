//! Ingest pipeline: request/outcome types and the orchestrator.

pub mod orchestrator;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::{
    EmailMessage, ExtractStrategy, IngestOutcome, IngestRequest, RawProduct, Retailer,
    StrategyChoice,
};

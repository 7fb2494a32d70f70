use std::sync::Arc;

use closetsync::config::{GmailConfig, IngestConfig, ModelConfig};
use closetsync::mailbox::GmailRestGateway;
use closetsync::normalize::Normalizer;
use closetsync::parsers::generative::{GenerativeStrategy, HttpModelClient};
use closetsync::parsers::heuristic::HeuristicStrategy;
use closetsync::parsers::StructuralStrategy;
use closetsync::pipeline::types::{IngestRequest, Retailer, StrategyChoice};
use closetsync::pipeline::{ExtractStrategy, Orchestrator};
use closetsync::store::LibSqlStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let user_id = std::env::var("CLOSETSYNC_USER").unwrap_or_else(|_| {
        eprintln!("Error: CLOSETSYNC_USER not set");
        eprintln!("  export CLOSETSYNC_USER=<wardrobe owner id>");
        std::process::exit(1);
    });

    let retailer = match std::env::var("CLOSETSYNC_RETAILER").ok().as_deref() {
        Some("zara") => Some(Retailer::Zara),
        Some("myntra") => Some(Retailer::Myntra),
        Some("hm") => Some(Retailer::Hm),
        Some(other) => anyhow::bail!("Unknown retailer {other:?} (expected zara, myntra or hm)"),
        None => None,
    };

    let strategy = match std::env::var("CLOSETSYNC_STRATEGY").ok().as_deref() {
        None | Some("auto") => StrategyChoice::Auto,
        Some("structural") => StrategyChoice::Structural,
        Some("generative") => StrategyChoice::Generative,
        Some("heuristic") => StrategyChoice::Heuristic,
        Some(other) => anyhow::bail!("Unknown strategy {other:?}"),
    };

    // Explicit message ids skip the mailbox search entirely.
    let email_ids: Option<Vec<String>> = std::env::var("CLOSETSYNC_EMAIL_IDS")
        .ok()
        .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect());

    if retailer.is_none() && email_ids.is_none() {
        anyhow::bail!("Set CLOSETSYNC_RETAILER or CLOSETSYNC_EMAIL_IDS");
    }

    let config = IngestConfig::from_env()?;
    let gmail_config = GmailConfig::from_env()?;
    let model_config = ModelConfig::from_env()?;

    eprintln!("👗 ClosetSync v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   User: {user_id}");
    eprintln!(
        "   Retailer: {}",
        retailer.map(|r| r.as_str()).unwrap_or("(explicit ids)")
    );
    eprintln!("   Workers: {}\n", config.workers);

    let db_path =
        std::env::var("CLOSETSYNC_DB_PATH").unwrap_or_else(|_| "./data/closetsync.db".to_string());
    let store = Arc::new(
        LibSqlStore::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );

    let gateway = Arc::new(GmailRestGateway::new(gmail_config)?);
    let model = Arc::new(HttpModelClient::new(model_config.clone())?);
    let strategies: Vec<Arc<dyn ExtractStrategy>> = vec![
        Arc::new(StructuralStrategy),
        Arc::new(GenerativeStrategy::new(model, model_config.max_tokens)),
        Arc::new(HeuristicStrategy),
    ];

    let orchestrator = Orchestrator::new(
        gateway,
        strategies,
        Arc::new(Normalizer::new(None)),
        store,
        config,
    );

    let (job_id, outcome) = orchestrator
        .run(IngestRequest {
            user_id,
            retailer,
            email_ids,
            strategy,
        })
        .await?;

    println!("Job {job_id} complete");
    println!("  emails found:       {}", outcome.emails_found);
    println!("  emails processed:   {}", outcome.emails_processed);
    println!("  products extracted: {}", outcome.products_extracted);
    println!("  items written:      {}", outcome.items_written);
    println!("  duplicates skipped: {}", outcome.duplicates_skipped);
    for (strategy, wins) in &outcome.strategy_wins {
        println!("  via {strategy}: {wins}");
    }
    for failure in &outcome.errors {
        eprintln!("  failed {}: {}", failure.email_id, failure.message);
    }

    Ok(())
}

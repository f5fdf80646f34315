use chrono::NaiveDate;
use clap::Parser;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tollgate::client::{
    Description, Document, DocumentClient, DryRunTransport, HttpTransport, Product, Transport,
};
use tollgate::config::TollgateConfig;
use tollgate::ratelimit::{Fairness, RateLimiter, TimeUnit};

/// Submit documents to a remote service without exceeding its rate limit.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum requests per window
    #[arg(long)]
    limit: Option<usize>,

    /// Window expressed as one time unit
    #[arg(long, value_enum)]
    unit: Option<TimeUnit>,

    /// Explicit window in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Serve waiting callers in arrival order
    #[arg(long)]
    fifo: bool,

    /// Number of sample documents to submit
    #[arg(long, default_value_t = 2)]
    documents: usize,

    /// Number of concurrent submitters
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Bearer token for the remote service
    #[arg(long, env = "TOLLGATE_TOKEN", default_value = "")]
    token: String,

    /// Log requests instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    info!("Starting Tollgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => TollgateConfig::from_file(path)?,
        None => TollgateConfig::default(),
    };
    if let Some(limit) = cli.limit {
        config.limiter.limit = limit;
    }
    if let Some(unit) = cli.unit {
        config.limiter.unit = unit;
    }
    if cli.window_ms.is_some() {
        config.limiter.window_ms = cli.window_ms;
    }
    if cli.fifo {
        config.limiter.fairness = Fairness::Fifo;
    }

    let limiter = Arc::new(RateLimiter::from_config(config.limiter.to_limit_config()?));
    info!(
        limit = limiter.limit(),
        window_ms = limiter.window().as_millis() as u64,
        fairness = ?limiter.fairness(),
        "Rate limiter initialized"
    );

    if cli.dry_run {
        run(limiter, DryRunTransport, &cli).await;
    } else {
        info!(endpoint = %config.client.endpoint, "Sending documents over HTTP");
        run(limiter, HttpTransport::from_config(&config.client), &cli).await;
    }

    info!("Tollgate stopped");
    Ok(())
}

/// Submit the sample documents until done or interrupted.
async fn run<T: Transport>(limiter: Arc<RateLimiter>, transport: T, cli: &Cli) {
    let client = DocumentClient::new(limiter, transport);
    let documents: Vec<Document> = (0..cli.documents).map(sample_document).collect();

    let submissions = stream::iter(documents.iter()).for_each_concurrent(
        cli.workers.max(1),
        |document| {
            let client = &client;
            async move {
                if let Err(e) = client.create_document(document, &cli.token).await {
                    error!(doc_id = %document.doc_id, error = %e, "Submission failed");
                }
            }
        },
    );

    // Dropping pending submissions cancels their waits without recording permits
    tokio::select! {
        _ = submissions => {
            info!(documents = documents.len(), "All documents processed");
        }
        _ = shutdown_signal() => {}
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_target(false).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .init();
    }
}

fn sample_document(index: usize) -> Document {
    let date = NaiveDate::from_ymd_opt(2020, 1, 23).unwrap_or_default();
    Document {
        description: Description {
            participant_inn: "123456789".to_string(),
        },
        doc_id: format!("doc{}", index),
        doc_status: "Active".to_string(),
        doc_type: "LP_INTRODUCE_GOODS".to_string(),
        import_request: true,
        owner_inn: "123456789".to_string(),
        participant_inn: "123456789".to_string(),
        producer_inn: "987654321".to_string(),
        production_date: date,
        production_type: "Type1".to_string(),
        products: vec![Product {
            certificate_document: format!("cert{}", index),
            certificate_document_date: date,
            certificate_document_number: format!("num{}", index),
            owner_inn: "123456789".to_string(),
            producer_inn: "987654321".to_string(),
            production_date: date,
            tnved_code: "1234".to_string(),
            uit_code: "uit123".to_string(),
            uitu_code: "uitu123".to_string(),
        }],
        reg_date: date,
        reg_number: format!("reg{}", index),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling pending submissions");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling pending submissions");
        }
    }
}

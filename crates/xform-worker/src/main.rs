//! Submission transformation worker binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use xform_queue::{JobQueue, QueueConfig, StatusChannel};
use xform_storage::{S3Client, StorageConfig, SubmissionStore};
use xform_worker::{
    init_tracing, metrics, run_headless, CommandTransform, JobExecutor, Pipeline, StatusReporter,
    SubmissionHandler, Transform, TransformerSpec, WorkerConfig,
};

/// Transforms uploaded submissions, or a single local file.
#[derive(Parser, Debug)]
#[command(name = "xform-worker", version, about)]
struct Cli {
    /// Transform this file, print the result to stdout and exit
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let result = match cli.file {
        Some(path) => headless(path),
        None => serve().await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn transform_from_env() -> Result<CommandTransform> {
    let command = std::env::var("TRANSFORM_COMMAND").context("TRANSFORM_COMMAND not set")?;
    CommandTransform::parse(&command).context("TRANSFORM_COMMAND is empty")
}

fn headless(path: PathBuf) -> Result<()> {
    let transform = transform_from_env()?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_headless(&path, &transform, &mut out)
        .with_context(|| format!("failed to transform '{}'", path.display()))
}

async fn serve() -> Result<()> {
    info!("Starting xform-worker");

    let spec = TransformerSpec::from_env()?;
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let transform: Arc<dyn Transform> = Arc::new(transform_from_env()?);

    let s3 = S3Client::from_env().context("failed to configure object storage")?;
    s3.check_connectivity().await?;
    let store = SubmissionStore::new(Arc::new(s3), StorageConfig::from_env());

    let queue_config = QueueConfig::from_env(&spec.source_kind, &spec.target_kind);
    let status = StatusChannel::new(&queue_config.redis_url, queue_config.status_stream.clone())
        .context("failed to create status channel")?;
    let queue = JobQueue::new(queue_config).context("failed to create job queue")?;

    metrics::init_metrics(config.metrics_port)?;
    info!("Metrics listening on port {}", config.metrics_port);

    let pipeline = Pipeline::new(store, transform, &spec);
    let handler = SubmissionHandler::new(pipeline, StatusReporter::new(Arc::new(status)), spec.label());
    let executor = Arc::new(JobExecutor::new(config, queue, handler));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    executor.run().await?;

    info!("Worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

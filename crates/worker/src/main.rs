use std::sync::Arc;

use anyhow::Context;
use genbatch_core::Endpoints;
use genbatch_events::TracingSink;
use genbatch_pipeline::BatchDispatcher;
use genbatch_upstream::{ImageDownloader, UpstreamClient};
use genbatch_worker::library::{build_jobs, load_reference_library, read_prompts};
use genbatch_worker::WorkerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genbatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        platform = %config.platform,
        model = %config.model,
        threads = config.thread_count,
        retries = config.retry_count,
        credential = %config.credential_for(config.model),
        "Loaded worker configuration",
    );

    // --- Jobs ---
    let prompts = read_prompts(&config.prompts_file)
        .await
        .with_context(|| format!("Failed to read {}", config.prompts_file.display()))?;
    let library = match &config.reference_dir {
        Some(dir) => load_reference_library(dir)
            .await
            .with_context(|| format!("Failed to read reference directory {}", dir.display()))?,
        None => Vec::new(),
    };
    let jobs = build_jobs(&config, &prompts, &library);
    tracing::info!(jobs = jobs.len(), references = library.len(), "Prepared jobs");
    if jobs.is_empty() {
        tracing::warn!("No prompts to generate");
        return Ok(());
    }

    // --- Upstream ---
    let client = UpstreamClient::new(config.request_timeout)?;
    let downloader = ImageDownloader::new(client.http().clone(), config.output_dir.clone());
    let endpoints = config
        .upstream_url
        .clone()
        .map(Endpoints::uniform)
        .unwrap_or_default();

    // --- Batch ---
    let dispatcher = BatchDispatcher::new(Arc::new(client))
        .with_endpoints(endpoints)
        .with_event_sink(Arc::new(TracingSink))
        .with_result_sink(Arc::new(downloader))
        .without_event_stream();
    let handle = dispatcher.submit(jobs, config.thread_count);

    let progress = tokio::select! {
        progress = handle.wait() => progress,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, finishing in-flight requests");
            handle.cancel();
            handle.wait().await
        }
    };

    tracing::info!(
        batch_id = %handle.batch_id(),
        succeeded = progress.succeeded,
        failed = progress.failed,
        saved = progress.saved,
        output_dir = %config.output_dir.display(),
        "Batch finished: {progress}",
    );
    Ok(())
}

//! Partload uploader entry point.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use partload_protocol::{LocationId, OutputMetadata, UploadTarget};
use partload_storage_client::Client;
use partload_upload::{OutputBinding, UploadEvent, Uploader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Parser)]
#[command(name = "partload-uploader")]
#[command(about = "Uploads a local file to the storage service in parts.")]
struct Args {
    /// File to upload.
    file: PathBuf,

    /// Dataset the file belongs to.
    #[arg(long)]
    dataset: String,

    /// Node inside the dataset.
    #[arg(long)]
    node: String,

    /// Storage location.
    #[arg(long, default_value_t = 0)]
    location: LocationId,

    /// Name stored for the file (defaults to the file name).
    #[arg(long)]
    name: Option<String>,

    /// Configuration file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured number of part workers.
    #[arg(long)]
    concurrency: Option<usize>,
}

/// Prints the stored object's metadata as JSON.
struct PrintOutput;

impl OutputBinding for PrintOutput {
    fn on_output_ready(&self, output: &OutputMetadata) {
        match serde_json::to_string_pretty(output) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize output"),
        }
    }

    fn on_output_reset(&self) {
        tracing::debug!("output reset");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match config::AppConfig::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            config::AppConfig::default()
        }
    };
    if let Some(concurrency) = args.concurrency {
        config.upload.concurrency = concurrency;
    }

    let mut client = Client::new(&config.base_url, config.api_token.as_deref())
        .context("failed to build storage client")?;
    if let Some(user_id) = &config.user_id {
        client = client.with_user_id(user_id.clone());
    }

    let name = match args.name {
        Some(name) => name,
        None => args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("file path has no file name")?,
    };
    let target = UploadTarget::for_node(args.location, args.dataset, &args.node, name);

    let mut uploader = Uploader::new(Arc::new(client), Arc::new(PrintOutput), config.upload);
    uploader.on_progress(Box::new(|percent| {
        tracing::info!(percent, "progress");
    }));

    if let Some(mut events) = uploader.take_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    UploadEvent::PhaseChanged { phase, percent } => {
                        tracing::debug!(?phase, percent, "phase changed");
                    }
                    UploadEvent::PartUploaded { part_number, done, total } => {
                        tracing::debug!(part_number, done, total, "part uploaded");
                    }
                    UploadEvent::Aborted { reason } => tracing::warn!(%reason, "upload aborted"),
                    UploadEvent::Failed { error } => tracing::error!(%error, "upload failed"),
                    UploadEvent::Completed { .. } => {}
                }
            }
        });
    }

    let uploader = Arc::new(uploader);
    let on_signal = Arc::clone(&uploader);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.request_abort();
        }
    });

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        file = %args.file.display(),
        target = %target.path,
        "starting upload"
    );
    let result = uploader.upload(&args.file, target).await;
    uploader.wait_idle().await;

    let report = result?;
    tracing::info!(
        parts = report.parts,
        bytes = report.bytes,
        polls = report.polls,
        "upload finished"
    );
    Ok(())
}

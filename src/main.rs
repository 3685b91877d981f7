//! PDF Identifier Marker - Entry point
//!
//! MCP server that marks UAN/ESIC numbers in PDFs and splits them per site.

use clap::Parser;
use pdf_id_marker::{run_server_with_config, ServerConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pdf-id-marker", version, about)]
struct Args {
    /// Directory holding per-job inputs and outputs
    #[arg(long, env = "PDF_ID_MARKER_WORK_DIR", default_value = "./work")]
    work_dir: PathBuf,

    /// Restrict input and output paths to this directory (repeatable)
    #[arg(long = "resource-dir")]
    resource_dirs: Vec<String>,

    /// Seconds a finished job is kept before it is evicted
    #[arg(long, env = "PDF_ID_MARKER_JOB_TTL_SECS", default_value_t = 86_400)]
    job_ttl_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_id_marker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(
        work_dir = %args.work_dir.display(),
        resource_dirs = ?args.resource_dirs,
        job_ttl_secs = args.job_ttl_secs,
        "Starting PDF identifier marker"
    );

    run_server_with_config(ServerConfig {
        resource_dirs: args.resource_dirs,
        work_dir: args.work_dir,
        job_ttl: Duration::from_secs(args.job_ttl_secs),
    })
    .await
}

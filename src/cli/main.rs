//! Cutout server command line
//!
//! Every flag can also be set through a `CUTOUT_*` environment variable.

use super::config::CliConfigBuilder;
use crate::backends::OnnxBackend;
use crate::config::ServerConfig;
use crate::context::AppContext;
use crate::download::{ModelDownloader, ModelFetcher};
use crate::models::ModelKind;
use crate::server;
use crate::tracing_config::{TracingConfig, TracingFormat};
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

/// Background removal HTTP service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "cutout-server")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Interface to bind (IP literal or host name)
    #[arg(long, env = "CUTOUT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// TCP port
    #[arg(short, long, env = "CUTOUT_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory for model weights [default: $CUTOUT_MODEL_DIR or the user cache dir]
    #[arg(long, value_name = "PATH")]
    pub model_dir: Option<String>,

    /// ONNX Runtime execution provider (auto, cpu, cuda, coreml)
    #[arg(short, long, env = "CUTOUT_EXECUTION_PROVIDER", default_value = "cpu")]
    pub execution_provider: String,

    /// Intra-op threads per session (0 = auto-detect)
    #[arg(short, long, env = "CUTOUT_THREADS", default_value_t = 0)]
    pub threads: usize,

    /// Timeout for a single weight download, in seconds
    #[arg(long, env = "CUTOUT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    pub download_timeout: u64,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "CUTOUT_MAX_UPLOAD_BYTES", default_value_t = 32 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Do not start the precise (RMBG-1.4) backend
    #[arg(long, env = "CUTOUT_DISABLE_PRECISE")]
    pub disable_precise: bool,

    /// Do not start the fast (U2Net) backend
    #[arg(long, env = "CUTOUT_DISABLE_FAST")]
    pub disable_fast: bool,

    /// Route unrecognized mode values to the fast backend instead of rejecting them
    #[arg(long, env = "CUTOUT_MODE_FALLBACK")]
    pub mode_fallback: bool,

    /// Override the precise model download URL
    #[arg(long, env = "CUTOUT_PRECISE_MODEL_URL")]
    pub precise_model_url: Option<String>,

    /// Expected SHA-256 of the precise model file
    #[arg(long, env = "CUTOUT_PRECISE_MODEL_SHA256")]
    pub precise_model_sha256: Option<String>,

    /// Override the fast model download URL
    #[arg(long, env = "CUTOUT_FAST_MODEL_URL")]
    pub fast_model_url: Option<String>,

    /// Expected SHA-256 of the fast model file
    #[arg(long, env = "CUTOUT_FAST_MODEL_SHA256")]
    pub fast_model_sha256: Option<String>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log filter directives, overriding --verbose (e.g. "cutout=debug,tower_http=info")
    #[arg(long, env = "RUST_LOG")]
    pub log_filter: Option<String>,

    /// Log format (console, compact, json)
    #[arg(long, env = "CUTOUT_LOG_FORMAT", default_value = "console")]
    pub log_format: String,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// Download the weights of every enabled backend and exit
    #[arg(long)]
    pub only_download: bool,
}

/// Main CLI entry point
///
/// # Errors
/// - Invalid arguments or configuration
/// - No backend could be started
/// - Server I/O failures
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;
    info!(
        "Model directory: {}, provider: {}",
        config.model_dir.display(),
        config.execution_provider
    );

    let downloader =
        ModelDownloader::from_config(&config).context("Failed to prepare model downloader")?;

    if cli.only_download {
        return download_only(&config, &downloader).await;
    }

    let context = AppContext::initialize(&config, &downloader)
        .await
        .context("No background removal backend could be started")?;

    server::serve(&config, context).await
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let format: TracingFormat = cli.log_format.parse()?;
    let mut tracing = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(format);
    if let Some(filter) = &cli.log_filter {
        tracing = tracing.with_env_filter(filter);
    }
    tracing.init()
}

fn show_provider_diagnostics() {
    println!("Execution providers:");
    for (provider, available) in OnnxBackend::list_providers() {
        let status = if available { "available" } else { "not available" };
        println!("  {provider:<8} {status}");
    }
}

async fn download_only(config: &ServerConfig, downloader: &ModelDownloader) -> Result<()> {
    let mut failures = 0;
    for kind in ModelKind::ALL.into_iter().filter(|kind| config.is_enabled(*kind)) {
        match downloader.ensure_model(kind).await {
            Ok(path) => println!("{kind}: {}", path.display()),
            Err(e) => {
                warn!("Failed to fetch {kind} model: {e}");
                failures += 1;
            },
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} model(s) could not be downloaded");
    }
    Ok(())
}

//! Conversion of CLI arguments into a [`ServerConfig`]

use crate::cli::main_impl::Cli;
use crate::config::{ExecutionProvider, ModelOverrides, ServerConfig};
use crate::models::ModelKind;
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a validated server configuration from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServerConfig> {
        let provider: ExecutionProvider = cli
            .execution_provider
            .parse()
            .context("Invalid --execution-provider")?;

        let mut builder = ServerConfig::builder()
            .host(cli.host.clone())
            .port(cli.port)
            .execution_provider(provider)
            .intra_threads(cli.threads)
            .download_timeout_secs(cli.download_timeout)
            .max_upload_bytes(cli.max_upload_bytes)
            .enable_precise(!cli.disable_precise)
            .enable_fast(!cli.disable_fast)
            .mode_fallback(cli.mode_fallback)
            .model_overrides(
                ModelKind::Precise,
                ModelOverrides {
                    url: cli.precise_model_url.clone(),
                    sha256: cli.precise_model_sha256.clone(),
                },
            )
            .model_overrides(
                ModelKind::Fast,
                ModelOverrides {
                    url: cli.fast_model_url.clone(),
                    sha256: cli.fast_model_sha256.clone(),
                },
            );

        if let Some(dir) = &cli.model_dir {
            builder = builder.model_dir(dir);
        }

        Ok(builder.build()?)
    }
}

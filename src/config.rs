//! Configuration types for the cutout service

use crate::error::{CutoutError, Result};
use crate::models::ModelKind;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

/// Environment variable overriding the model directory
pub const MODEL_DIR_ENV: &str = "CUTOUT_MODEL_DIR";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    Auto,
    /// CPU execution (always available)
    #[default]
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(CutoutError::invalid_config(format!(
                "Unknown execution provider '{other}' (expected auto, cpu, cuda or coreml)"
            ))),
        }
    }
}

/// Per-backend weight source overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOverrides {
    /// Replacement download URL
    pub url: Option<String>,
    /// Expected SHA-256 of the weight file (lowercase hex)
    pub sha256: Option<String>,
}

/// Configuration for the cutout server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// TCP port to listen on
    pub port: u16,

    /// Directory holding cached model weights
    pub model_dir: PathBuf,

    /// Execution provider for ONNX Runtime sessions
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads per session (0 = auto)
    pub intra_threads: usize,

    /// Upper bound for a single weight download
    pub download_timeout_secs: u64,

    /// Largest accepted request body
    pub max_upload_bytes: usize,

    /// Bring up the precise backend at startup
    pub enable_precise: bool,

    /// Bring up the fast backend at startup
    pub enable_fast: bool,

    /// Route unrecognized mode strings to the fast backend instead of rejecting them
    pub mode_fallback: bool,

    /// Weight overrides for the precise backend
    pub precise_model: ModelOverrides,

    /// Weight overrides for the fast backend
    pub fast_model: ModelOverrides,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_dir: default_model_dir(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            download_timeout_secs: 120,
            max_upload_bytes: 32 * 1024 * 1024,
            enable_precise: true,
            enable_fast: true,
            mode_fallback: false,
            precise_model: ModelOverrides::default(),
            fast_model: ModelOverrides::default(),
        }
    }
}

/// Resolve the default model directory
///
/// `$CUTOUT_MODEL_DIR` wins; otherwise `<user cache dir>/cutout/models`, falling
/// back to `./models` when the platform has no cache directory.
#[must_use]
pub fn default_model_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::cache_dir().map_or_else(
        || PathBuf::from("models"),
        |dir| dir.join("cutout").join("models"),
    )
}

impl ServerConfig {
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Socket address the server binds to
    ///
    /// `host` may be an IP literal or a name such as `localhost`; names bind to
    /// the first address they resolve to.
    ///
    /// # Errors
    /// - Host does not resolve to any address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let invalid = |reason: String| {
            CutoutError::invalid_config(format!(
                "Invalid bind address {}:{}: {reason}",
                self.host, self.port
            ))
        };

        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("host resolved to no addresses".to_string()))
    }

    /// Overrides configured for a backend
    #[must_use]
    pub fn overrides(&self, kind: ModelKind) -> &ModelOverrides {
        match kind {
            ModelKind::Precise => &self.precise_model,
            ModelKind::Fast => &self.fast_model,
        }
    }

    /// Download URL for a backend's weights
    #[must_use]
    pub fn model_url(&self, kind: ModelKind) -> &str {
        self.overrides(kind)
            .url
            .as_deref()
            .unwrap_or(kind.descriptor().url)
    }

    /// Whether a backend should be started
    #[must_use]
    pub fn is_enabled(&self, kind: ModelKind) -> bool {
        match kind {
            ModelKind::Precise => self.enable_precise,
            ModelKind::Fast => self.enable_fast,
        }
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Port is zero
    /// - Upload limit or download timeout is zero
    /// - Both backends are disabled
    /// - A SHA-256 pin is not 64 hex characters
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(CutoutError::config_value_error("port", self.port, "1-65535"));
        }

        if self.max_upload_bytes == 0 {
            return Err(CutoutError::config_value_error(
                "max upload bytes",
                self.max_upload_bytes,
                "> 0",
            ));
        }

        if self.download_timeout_secs == 0 {
            return Err(CutoutError::config_value_error(
                "download timeout",
                self.download_timeout_secs,
                "> 0 seconds",
            ));
        }

        if !self.enable_precise && !self.enable_fast {
            return Err(CutoutError::invalid_config(
                "At least one of the precise and fast backends must be enabled",
            ));
        }

        for kind in ModelKind::ALL {
            if let Some(hash) = &self.overrides(kind).sha256 {
                if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(CutoutError::invalid_config(format!(
                        "SHA-256 pin for the {kind} model must be 64 hex characters"
                    )));
                }
            }
        }

        self.bind_addr()?;
        Ok(())
    }
}

/// Builder for `ServerConfig`
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = dir.into();
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn enable_precise(mut self, enable: bool) -> Self {
        self.config.enable_precise = enable;
        self
    }

    #[must_use]
    pub fn enable_fast(mut self, enable: bool) -> Self {
        self.config.enable_fast = enable;
        self
    }

    #[must_use]
    pub fn mode_fallback(mut self, fallback: bool) -> Self {
        self.config.mode_fallback = fallback;
        self
    }

    #[must_use]
    pub fn model_overrides(mut self, kind: ModelKind, overrides: ModelOverrides) -> Self {
        match kind {
            ModelKind::Precise => self.config.precise_model = overrides,
            ModelKind::Fast => self.config.fast_model = overrides,
        }
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Any failure reported by [`ServerConfig::validate`]
    pub fn build(self) -> Result<ServerConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

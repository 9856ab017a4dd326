//! Process-wide request context
//!
//! Both backends are brought up once, before the server accepts connections,
//! and then shared read-only by every request. Each backend starts (or fails)
//! on its own: a failed download or session build leaves that backend
//! unavailable and logged, and startup as a whole only fails when nothing came
//! up.

use crate::config::ServerConfig;
use crate::download::ModelFetcher;
use crate::error::{CutoutError, Result};
use crate::fast::{FastRemover, U2NetRemover};
use crate::inference::InferenceBackend;
use crate::models::ModelKind;
use crate::processor::{Mode, PreciseProcessor};
use crate::tracing_config::spans;
use crate::types::CutoutOutput;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppContext {
    precise: Option<Arc<PreciseProcessor>>,
    fast: Option<Arc<dyn FastRemover>>,
    mode_fallback: bool,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("precise", &self.precise.is_some())
            .field("fast", &self.fast.is_some())
            .field("mode_fallback", &self.mode_fallback)
            .finish()
    }
}

impl AppContext {
    /// Assemble a context from already-built pipelines
    ///
    /// # Errors
    /// - Neither pipeline is present
    pub fn new(
        precise: Option<Arc<PreciseProcessor>>,
        fast: Option<Arc<dyn FastRemover>>,
        mode_fallback: bool,
    ) -> Result<Self> {
        if precise.is_none() && fast.is_none() {
            return Err(CutoutError::model("No background removal backend is available"));
        }
        Ok(Self {
            precise,
            fast,
            mode_fallback,
        })
    }

    /// Acquire weights and build ONNX Runtime sessions for every enabled backend
    ///
    /// # Errors
    /// - No backend could be brought up
    #[cfg(feature = "onnx")]
    pub async fn initialize(config: &ServerConfig, fetcher: &dyn ModelFetcher) -> Result<Self> {
        let provider = config.execution_provider;
        let threads = config.intra_threads;
        Self::initialize_with(config, fetcher, move |kind, path| {
            let backend = crate::backends::OnnxBackend::load(kind, path, provider, threads)?;
            Ok(Arc::new(backend) as Arc<dyn InferenceBackend>)
        })
        .await
    }

    /// Startup with a caller-supplied session loader
    ///
    /// `loader` runs on the blocking thread pool once per enabled backend,
    /// after its weights are local.
    ///
    /// # Errors
    /// - No backend could be brought up
    pub async fn initialize_with<L>(
        config: &ServerConfig,
        fetcher: &dyn ModelFetcher,
        loader: L,
    ) -> Result<Self>
    where
        L: Fn(ModelKind, &Path) -> Result<Arc<dyn InferenceBackend>> + Send + Sync + 'static,
    {
        let loader = Arc::new(loader);
        let mut precise = None;
        let mut fast = None;

        for kind in ModelKind::ALL {
            if !config.is_enabled(kind) {
                info!(backend = %kind, "Backend disabled by configuration");
                continue;
            }

            let span = spans::model_loading(
                kind.descriptor().name,
                &config.execution_provider.to_string(),
            );
            match Self::bring_up(kind, fetcher, Arc::clone(&loader))
                .instrument(span)
                .await
            {
                Ok(backend) => {
                    info!(backend = %kind, engine = backend.name(), "Backend ready");
                    match kind {
                        ModelKind::Precise => {
                            precise = Some(Arc::new(PreciseProcessor::new(backend)));
                        },
                        ModelKind::Fast => {
                            fast = Some(Arc::new(U2NetRemover::new(backend)) as Arc<dyn FastRemover>);
                        },
                    }
                },
                Err(e) => {
                    error!(backend = %kind, error = %e, "Backend failed to start and will be unavailable");
                },
            }
        }

        let context = Self::new(precise, fast, config.mode_fallback)?;
        if context.available().len() < ModelKind::ALL.len() {
            warn!(available = ?context.available(), "Serving with a reduced set of backends");
        }
        Ok(context)
    }

    async fn bring_up<L>(
        kind: ModelKind,
        fetcher: &dyn ModelFetcher,
        loader: Arc<L>,
    ) -> Result<Arc<dyn InferenceBackend>>
    where
        L: Fn(ModelKind, &Path) -> Result<Arc<dyn InferenceBackend>> + Send + Sync + 'static,
    {
        let path = fetcher.ensure_model(kind).await?;
        tokio::task::spawn_blocking(move || loader(kind, &path))
            .await
            .map_err(|e| CutoutError::internal(format!("Session loader panicked: {e}")))?
    }

    /// Backends that came up at startup
    #[must_use]
    pub fn available(&self) -> Vec<ModelKind> {
        let mut kinds = Vec::new();
        if self.precise.is_some() {
            kinds.push(ModelKind::Precise);
        }
        if self.fast.is_some() {
            kinds.push(ModelKind::Fast);
        }
        kinds
    }

    #[must_use]
    pub fn mode_fallback(&self) -> bool {
        self.mode_fallback
    }

    /// Resolve a raw mode field with this context's fallback policy
    ///
    /// # Errors
    /// - Unrecognized mode with fallback disabled
    pub fn resolve_mode(&self, raw: Option<&str>) -> Result<Mode> {
        Mode::resolve(raw, self.mode_fallback)
    }

    /// Cut out one uploaded image on the blocking thread pool
    ///
    /// # Errors
    /// - Requested backend unavailable
    /// - Any pipeline failure
    pub async fn cutout(
        &self,
        bytes: Vec<u8>,
        mode: Mode,
        edge_smoothing: bool,
    ) -> Result<CutoutOutput> {
        let context = self.clone();
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || {
            span.in_scope(|| context.cutout_blocking(&bytes, mode, edge_smoothing))
        })
            .await
            .map_err(|e| CutoutError::internal(format!("Processing task failed: {e}")))?
    }

    /// Synchronous form of [`AppContext::cutout`]
    ///
    /// # Errors
    /// - Requested backend unavailable
    /// - Any pipeline failure
    pub fn cutout_blocking(
        &self,
        bytes: &[u8],
        mode: Mode,
        edge_smoothing: bool,
    ) -> Result<CutoutOutput> {
        match mode {
            Mode::Precise => self
                .precise
                .as_ref()
                .ok_or_else(|| unavailable(mode))?
                .process(bytes, edge_smoothing),
            Mode::Fast => {
                let remover = self.fast.as_ref().ok_or_else(|| unavailable(mode))?;
                let png = remover.remove(bytes, edge_smoothing)?;
                let dimensions = ImageReader::with_format(Cursor::new(&png), ImageFormat::Png)
                    .into_dimensions()
                    .map_err(|e| CutoutError::encode(format!("Fast backend produced invalid PNG: {e}")))?;
                Ok(CutoutOutput {
                    png,
                    dimensions,
                    timings: None,
                })
            },
        }
    }
}

fn unavailable(mode: Mode) -> CutoutError {
    CutoutError::unavailable(format!("The {mode} backend is not available"))
}

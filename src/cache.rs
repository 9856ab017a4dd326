//! Local model directory management
//!
//! Weights live as flat files inside one directory (see
//! [`crate::config::default_model_dir`]). This module owns path resolution and
//! the "is it already here" check that keeps downloads to at most one per file.

use crate::error::{CutoutError, Result};
use crate::models::ModelKind;
use std::fs;
use std::path::{Path, PathBuf};

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open (and create if missing) a cache rooted at `cache_dir`
    ///
    /// # Errors
    /// - Failed to create cache directory
    pub fn new<P: Into<PathBuf>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.into();

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                CutoutError::file_io_error("create model directory", &cache_dir, &e)
            })?;
        }

        Ok(Self { cache_dir })
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path where a model's weights are (or will be) stored
    #[must_use]
    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        self.cache_dir.join(kind.descriptor().file_name)
    }

    /// Check if a model is cached
    ///
    /// A zero-length file counts as missing; it can only be the leftover of an
    /// interrupted write from an older process.
    #[must_use]
    pub fn is_cached(&self, kind: ModelKind) -> bool {
        fs::metadata(self.model_path(kind))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// Temporary path used while a download is in flight
    #[must_use]
    pub fn partial_path(&self, kind: ModelKind) -> PathBuf {
        self.cache_dir
            .join(format!("{}.part", kind.descriptor().file_name))
    }
}

/// Format bytes into human-readable size
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS.get(unit_index).copied().unwrap_or("B");
    if unit_index == 0 {
        format!("{bytes} {unit}")
    } else {
        format!("{size:.1} {unit}")
    }
}

//! Model weight acquisition
//!
//! Weights are fetched at most once: [`ModelDownloader::ensure_model`] returns
//! immediately when the file is already in the cache, otherwise it streams the
//! response into a `.part` file next to the target, checks an optional SHA-256
//! pin and renames the file into place. There are no automatic retries.

use crate::cache::{format_size, ModelCache};
use crate::config::ServerConfig;
use crate::error::{CutoutError, Result};
use crate::models::ModelKind;
use async_trait::async_trait;
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Source of local model files, consulted once per backend during startup
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    /// Make sure the weights for `kind` exist locally and return their path
    ///
    /// # Errors
    /// - Network or HTTP failures
    /// - File system errors
    /// - Checksum mismatch
    async fn ensure_model(&self, kind: ModelKind) -> Result<PathBuf>;
}

/// Where and how to fetch one model
#[derive(Debug, Clone)]
struct FetchTarget {
    url: String,
    sha256: Option<String>,
}

/// HTTP model downloader backed by a [`ModelCache`]
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
    targets: HashMap<ModelKind, FetchTarget>,
}

impl ModelDownloader {
    /// Create a downloader from the server configuration
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .map_err(|e| CutoutError::network_error("Failed to create HTTP client", e))?;

        let cache = ModelCache::new(&config.model_dir)?;

        let targets = ModelKind::ALL
            .into_iter()
            .map(|kind| {
                let target = FetchTarget {
                    url: config.model_url(kind).to_string(),
                    sha256: config.overrides(kind).sha256.clone(),
                };
                (kind, target)
            })
            .collect();

        Ok(Self {
            client,
            cache,
            targets,
        })
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    fn target(&self, kind: ModelKind) -> Result<&FetchTarget> {
        self.targets
            .get(&kind)
            .ok_or_else(|| CutoutError::internal(format!("No download target for {kind} model")))
    }

    /// Stream `url` into `partial`, returning the byte count and SHA-256 digest
    async fn download_file(&self, url: &str, partial: &Path) -> Result<(u64, String)> {
        log::debug!("Downloading: {} -> {}", url, partial.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CutoutError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(CutoutError::network_error(
                format!("Failed to download {url}"),
                format!("HTTP status {}", response.status()),
            ));
        }

        let total_size = response.content_length();

        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(|e| CutoutError::file_io_error("create file", partial, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| CutoutError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| CutoutError::file_io_error("write to file", partial, &e))?;

            downloaded += bytes_read as u64;
            if let Some(total) = total_size {
                log::trace!("{url}: {downloaded}/{total} bytes");
            }
        }

        file.flush()
            .await
            .map_err(|e| CutoutError::file_io_error("flush file", partial, &e))?;

        if downloaded == 0 {
            return Err(CutoutError::network_error(
                format!("Failed to download {url}"),
                "empty response body",
            ));
        }

        Ok((downloaded, format!("{:x}", hasher.finalize())))
    }
}

#[async_trait]
impl ModelFetcher for ModelDownloader {
    async fn ensure_model(&self, kind: ModelKind) -> Result<PathBuf> {
        let final_path = self.cache.model_path(kind);

        if self.cache.is_cached(kind) {
            if let Some(expected) = &self.target(kind)?.sha256 {
                let actual = file_sha256(&final_path)?;
                if !expected.eq_ignore_ascii_case(&actual) {
                    return Err(CutoutError::model(format!(
                        "Cached {} does not match its SHA-256 pin (expected {}, got {}); delete it to refetch",
                        final_path.display(),
                        expected,
                        actual
                    )));
                }
            }
            log::info!(
                "Using cached {} model at {}",
                kind.descriptor().name,
                final_path.display()
            );
            return Ok(final_path);
        }

        let target = self.target(kind)?;
        let partial = self.cache.partial_path(kind);
        log::info!("Fetching {} model from {}", kind.descriptor().name, target.url);

        let result = self.download_file(&target.url, &partial).await;
        let (size, digest) = match result {
            Ok(done) => done,
            Err(e) => {
                if let Err(cleanup_err) = tokio::fs::remove_file(&partial).await {
                    if cleanup_err.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("Failed to remove partial download: {}", cleanup_err);
                    }
                }
                return Err(e);
            },
        };

        if let Some(expected) = &target.sha256 {
            if !expected.eq_ignore_ascii_case(&digest) {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(CutoutError::model(format!(
                    "Checksum mismatch for {}: expected {}, got {}",
                    kind.descriptor().file_name,
                    expected,
                    digest
                )));
            }
        }

        tokio::fs::rename(&partial, &final_path)
            .await
            .map_err(|e| CutoutError::file_io_error("move downloaded model into place", &final_path, &e))?;

        log::info!(
            "Downloaded {} model ({}, sha256 {})",
            kind.descriptor().name,
            format_size(size),
            digest
        );
        Ok(final_path)
    }
}

/// Compute the SHA-256 of a file on disk
///
/// # Errors
/// - File cannot be read
pub fn file_sha256(path: &Path) -> Result<String> {
    let contents = std::fs::read(path)
        .map_err(|e| CutoutError::file_io_error("read file for verification", path, &e))?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(format!("{:x}", hasher.finalize()))
}

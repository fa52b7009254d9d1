//! Archive download with a local cache.
//!
//! Archives are cached under a key derived from the reference date, so a
//! re-run for the same month is served from disk. Writes go through a temp
//! file in the cache directory and are renamed into place, so an interrupted
//! download never leaves a partial artifact behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::data::http::Transport;
use crate::data::retry::{RetryFailure, RetryPolicy, Sleeper};
use crate::domain::RemoteFileRef;
use crate::error::DownloadError;

/// Handle to a cached archive on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub reference_date: NaiveDate,
    /// Name of the remote file this artifact was fetched from.
    pub filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    /// Served from the cache without a network call.
    Cached,
    Downloaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub artifact: Artifact,
    pub source: FetchSource,
}

pub struct Downloader<'a> {
    transport: &'a dyn Transport,
    sleeper: &'a dyn Sleeper,
    retry: &'a RetryPolicy,
    cache_dir: PathBuf,
}

impl<'a> Downloader<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        sleeper: &'a dyn Sleeper,
        retry: &'a RetryPolicy,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            sleeper,
            retry,
            cache_dir: cache_dir.into(),
        }
    }

    /// Cache path for a reference date.
    pub fn cache_path(&self, reference_date: NaiveDate) -> PathBuf {
        cache_path(&self.cache_dir, reference_date)
    }

    pub fn fetch(&self, file: &RemoteFileRef, force: bool) -> Result<FetchOutcome, DownloadError> {
        let path = self.cache_path(file.reference_date);
        let artifact = Artifact {
            path: path.clone(),
            reference_date: file.reference_date,
            filename: file.filename.clone(),
        };

        if !force && path.is_file() {
            info!(path = %path.display(), "archive already cached, skipping download");
            return Ok(FetchOutcome {
                artifact,
                source: FetchSource::Cached,
            });
        }

        info!(url = %file.url, force, "downloading archive");
        let bytes = self
            .retry
            .run(self.sleeper, |_| self.transport.get(&file.url), |e| e.is_transient())
            .map_err(|failure| match failure {
                RetryFailure::Exhausted { attempts, last } => DownloadError::Exhausted {
                    url: file.url.clone(),
                    attempts,
                    last,
                },
                RetryFailure::Fatal { error, .. } => DownloadError::Rejected {
                    url: file.url.clone(),
                    source: error,
                },
            })?;

        if bytes.is_empty() {
            return Err(DownloadError::EmptyBody { url: file.url.clone() });
        }

        write_atomic(&self.cache_dir, &path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "archive stored");

        Ok(FetchOutcome {
            artifact,
            source: FetchSource::Downloaded,
        })
    }
}

pub fn cache_path(cache_dir: &Path, reference_date: NaiveDate) -> PathBuf {
    cache_dir.join(format!("rfr_{}.zip", reference_date.format("%Y%m%d")))
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
    let cache_err = |source: std::io::Error| DownloadError::Cache {
        path: target.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(cache_err)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(cache_err)?;
    tmp.write_all(bytes).map_err(cache_err)?;
    tmp.as_file().sync_all().map_err(cache_err)?;
    tmp.persist(target).map_err(|e| cache_err(e.error))?;
    Ok(())
}

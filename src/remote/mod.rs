//! Remote image fetch
//!
//! Images referenced by object-storage URL are downloaded into a local
//! directory before entering the same pipeline as uploads.

mod download;
mod oss;

pub(crate) use download::{download_blocking, http_agent, remote_size, Download, DownloadOutcome};
pub use oss::OssFetcher;

use crate::error::{PlygateError, PlygateResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use ureq::http::Uri;

/// Downloads a remote object to local disk
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch `url` into `dest_dir`, returning the local file path
    async fn fetch(&self, url: &str, dest_dir: &Path) -> PlygateResult<PathBuf>;
}

/// A remote object reference split out of its URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    /// Full URL as given
    pub url: String,
    /// Object key, the URL path without the leading slash
    pub key: String,
    /// Last path segment
    pub file_name: String,
}

impl ObjectRef {
    /// Parse an http(s) object URL
    pub fn parse(url: &str) -> PlygateResult<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(PlygateError::Validation("URL is required".to_string()));
        }

        let uri: Uri = url
            .parse()
            .map_err(|e| PlygateError::Validation(format!("invalid URL {url:?}: {e}")))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => {
                return Err(PlygateError::Validation(format!(
                    "URL must be http or https: {url}"
                )))
            }
        }
        if uri.host().is_none() {
            return Err(PlygateError::Validation(format!("URL has no host: {url}")));
        }

        let key = uri.path().trim_start_matches('/').to_string();
        let file_name = key.rsplit('/').next().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(PlygateError::Validation(format!(
                "URL does not name a file: {url}"
            )));
        }

        Ok(Self {
            url: url.to_string(),
            key,
            file_name,
        })
    }

    /// Lowercase extension with leading dot, or empty
    pub fn extension(&self) -> String {
        file_extension(&self.file_name)
    }
}

/// Lowercase extension of a file name with its leading dot, or empty
pub fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default()
}

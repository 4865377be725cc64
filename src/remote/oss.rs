//! Aliyun OSS object fetch
//!
//! With `oss.bucket` and `oss.endpoint` configured, the URL path is used as
//! the object key inside that bucket and requests are signed with the OSS
//! header signature when credentials are available. Without them the URL is
//! fetched as given (public-read objects or presigned URLs).

use crate::cache::fingerprint::Fingerprint;
use crate::config::schema::OssConfig;
use crate::error::{PlygateError, PlygateResult};
use crate::remote::{
    download_blocking, http_agent, remote_size, Download, DownloadOutcome, ObjectRef,
    RemoteFetcher,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use ureq::Agent;

type HmacSha1 = Hmac<Sha1>;

/// Connect + transfer budget for one object download
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
struct Credentials {
    access_key_id: String,
    access_key_secret: String,
}

#[derive(Clone)]
struct BucketTarget {
    bucket: String,
    endpoint: String,
}

/// Fetches images from an OSS bucket (or any plain http URL)
#[derive(Clone)]
pub struct OssFetcher {
    agent: Agent,
    target: Option<BucketTarget>,
    credentials: Option<Credentials>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl OssFetcher {
    /// Create a fetcher from configuration
    pub fn new(config: &OssConfig) -> Self {
        let target = match (&config.bucket, &config.endpoint) {
            (Some(bucket), Some(endpoint)) => Some(BucketTarget {
                bucket: bucket.clone(),
                endpoint: endpoint.trim_end_matches('/').to_string(),
            }),
            _ => None,
        };
        let credentials = match (&config.access_key_id, &config.access_key_secret) {
            (Some(id), Some(secret)) => Some(Credentials {
                access_key_id: id.clone(),
                access_key_secret: secret.clone(),
            }),
            _ => None,
        };

        Self {
            agent: http_agent(DOWNLOAD_TIMEOUT),
            target,
            credentials,
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    fn request_url(&self, object: &ObjectRef) -> String {
        match &self.target {
            Some(t) => format!("https://{}.{}/{}", t.bucket, t.endpoint, object.key),
            None => object.url.clone(),
        }
    }

    fn headers(&self, verb: &str, object: &ObjectRef) -> PlygateResult<Vec<(&'static str, String)>> {
        let (Some(target), Some(creds)) = (&self.target, &self.credentials) else {
            return Ok(Vec::new());
        };
        let date = http_date();
        let to_sign = string_to_sign(verb, &date, &target.bucket, &object.key);
        let signature = sign(&creds.access_key_secret, &to_sign)?;
        Ok(vec![
            ("Date", date),
            (
                "Authorization",
                format!("OSS {}:{}", creds.access_key_id, signature),
            ),
        ])
    }

    fn fetch_blocking(&self, object: &ObjectRef, dest: &Path) -> PlygateResult<PathBuf> {
        let url = self.request_url(object);

        if let Ok(meta) = std::fs::metadata(dest) {
            let head = Download {
                url: &url,
                headers: self.headers("HEAD", object)?,
            };
            let remote = remote_size(&self.agent, &head);
            if meta.len() > 0 && remote.map_or(true, |size| size == meta.len()) {
                info!("File already downloaded, skipping: {}", dest.display());
                // Reuse restarts the file's retention clock.
                let touched =
                    std::fs::File::open(dest).and_then(|f| f.set_modified(SystemTime::now()));
                if let Err(e) = touched {
                    warn!("Failed to refresh {}: {}", dest.display(), e);
                }
                return Ok(dest.to_path_buf());
            }
        }

        let mut attempt = 1;
        loop {
            let get = Download {
                url: &url,
                headers: self.headers("GET", object)?,
            };
            match download_blocking(&self.agent, &get, dest) {
                Ok(DownloadOutcome::Saved { bytes }) => {
                    info!("Downloaded {} ({} bytes) to {}", object.url, bytes, dest.display());
                    return Ok(dest.to_path_buf());
                }
                Ok(DownloadOutcome::NotFound) => {
                    return Err(PlygateError::RemoteNotFound(object.url.clone()))
                }
                Err(e @ PlygateError::Download { .. }) if attempt < self.max_attempts => {
                    warn!(
                        "Download attempt {}/{} failed: {}",
                        attempt, self.max_attempts, e
                    );
                    std::thread::sleep(self.retry_delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl RemoteFetcher for OssFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> PlygateResult<PathBuf> {
        let object = ObjectRef::parse(url)?;
        let dest = local_path(dest_dir, &object);
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.fetch_blocking(&object, &dest))
            .await
            .map_err(|e| PlygateError::Internal(format!("download task failed: {e}")))?
    }
}

/// Local file for an object; the URL hash keeps same-named objects apart
fn local_path(dest_dir: &Path, object: &ObjectRef) -> PathBuf {
    let tag = Fingerprint::of_bytes(object.url.as_bytes()).short();
    dest_dir.join(format!("{}-{}", tag, object.file_name))
}

/// RFC 1123 date as OSS expects in the `Date` header
fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Canonical string for a header-signed request without body or
/// `x-oss-*` headers
fn string_to_sign(verb: &str, date: &str, bucket: &str, key: &str) -> String {
    format!("{verb}\n\n\n{date}\n/{bucket}/{key}")
}

/// Base64 HMAC-SHA1 of `data` under `secret`
fn sign(secret: &str, data: &str) -> PlygateResult<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| PlygateError::Internal(format!("invalid signing key: {e}")))?;
    mac.update(data.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

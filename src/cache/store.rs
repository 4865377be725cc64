//! Artifact store
//!
//! A flat directory of `<fingerprint>.ply` files. The directory listing is
//! the index; a file's mtime is its creation marker. Nothing is ever written
//! under a canonical name except by rename of a finished file.

use crate::cache::fingerprint::Fingerprint;
use crate::config::STAGING_DIR_NAME;
use crate::error::{PlygateError, PlygateResult};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extension of every published artifact
pub const ARTIFACT_EXTENSION: &str = "ply";

/// A published artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Fingerprint of the input that produced it
    pub fingerprint: Fingerprint,
    /// Canonical location under the store root
    pub path: PathBuf,
    /// Last-modified time (publication time)
    pub modified: SystemTime,
    /// Size in bytes
    pub size_bytes: u64,
}

impl Artifact {
    /// Public file name, `<hex>.ply`
    pub fn file_name(&self) -> String {
        artifact_file_name(&self.fingerprint)
    }

    /// Age relative to `now`; timestamps in the future count as zero
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.modified).unwrap_or_default()
    }
}

/// Canonical file name for a fingerprint
pub fn artifact_file_name(fingerprint: &Fingerprint) -> String {
    format!("{}.{}", fingerprint, ARTIFACT_EXTENSION)
}

/// Parse a canonical file name back into its fingerprint
pub fn parse_artifact_file_name(name: &str) -> Option<Fingerprint> {
    let stem = name.strip_suffix(ARTIFACT_EXTENSION)?.strip_suffix('.')?;
    stem.parse().ok()
}

/// Whether an artifact is still inside the retention window
pub fn is_fresh(artifact: &Artifact, now: SystemTime, retention: Duration) -> bool {
    artifact.age(now) < retention
}

/// Filesystem-backed artifact store
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    staging: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root` without touching the filesystem
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let staging = root.join(STAGING_DIR_NAME);
        Self { root, staging }
    }

    /// Create a store and make sure its directories exist
    pub async fn open(root: impl Into<PathBuf>) -> PlygateResult<Self> {
        let store = Self::new(root);
        fs::create_dir_all(&store.staging).await.map_err(|e| {
            PlygateError::io(format!("creating store {}", store.staging.display()), e)
        })?;
        Ok(store)
    }

    /// Store root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical path for a fingerprint
    pub fn artifact_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(artifact_file_name(fingerprint))
    }

    /// Find the artifact for a fingerprint, if one is published
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> PlygateResult<Option<Artifact>> {
        let path = self.artifact_path(fingerprint);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(Artifact {
                fingerprint: *fingerprint,
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size_bytes: meta.len(),
                path,
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PlygateError::io(
                format!("inspecting {}", path.display()),
                e,
            )),
        }
    }

    /// Delete an artifact; a missing file is not an error
    ///
    /// The file is only removed while its mtime still matches `artifact`,
    /// so a copy republished since the caller's lookup survives. Returns
    /// whether a file was removed.
    pub async fn evict(&self, artifact: &Artifact) -> PlygateResult<bool> {
        let current = match fs::metadata(&artifact.path).await {
            Ok(meta) => meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(PlygateError::io(
                    format!("inspecting {}", artifact.path.display()),
                    e,
                ))
            }
        };
        if current != artifact.modified {
            debug!(
                fingerprint = %artifact.fingerprint.short(),
                "Artifact was republished, keeping it"
            );
            return Ok(false);
        }

        match fs::remove_file(&artifact.path).await {
            Ok(()) => {
                debug!(fingerprint = %artifact.fingerprint.short(), "Evicted artifact");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PlygateError::io(
                format!("evicting {}", artifact.path.display()),
                e,
            )),
        }
    }

    /// Private directory for one generation, removed when dropped
    pub async fn staging_dir(&self) -> PlygateResult<TempDir> {
        fs::create_dir_all(&self.staging).await.map_err(|e| {
            PlygateError::io(format!("creating {}", self.staging.display()), e)
        })?;
        let staging = self.staging.clone();
        tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix("gen-")
                .tempdir_in(&staging)
                .map_err(|e| PlygateError::io("creating staging directory", e))
        })
        .await
        .map_err(|e| PlygateError::Internal(format!("staging task failed: {e}")))?
    }

    /// Move a finished file into the store under its canonical name
    ///
    /// The rename is atomic on one filesystem. Across filesystems the bytes
    /// are copied to a hidden temp name inside the root first, then renamed.
    pub async fn publish(
        &self,
        fingerprint: &Fingerprint,
        source: &Path,
    ) -> PlygateResult<Artifact> {
        let dest = self.artifact_path(fingerprint);
        touch(source).await?;

        match fs::rename(source, &dest).await {
            Ok(()) => {}
            Err(e) if is_cross_device(&e) => {
                let tmp = self
                    .root
                    .join(format!(".{}.{}.tmp", artifact_file_name(fingerprint), Uuid::new_v4()));
                if let Err(e) = fs::copy(source, &tmp).await {
                    let _ = fs::remove_file(&tmp).await;
                    return Err(PlygateError::io(
                        format!("copying {} into store", source.display()),
                        e,
                    ));
                }
                if let Err(e) = fs::rename(&tmp, &dest).await {
                    let _ = fs::remove_file(&tmp).await;
                    return Err(PlygateError::io(
                        format!("publishing {}", dest.display()),
                        e,
                    ));
                }
                let _ = fs::remove_file(source).await;
            }
            Err(e) => {
                return Err(PlygateError::io(
                    format!("publishing {}", dest.display()),
                    e,
                ))
            }
        }

        self.lookup(fingerprint).await?.ok_or_else(|| {
            PlygateError::Internal(format!("{} vanished after publish", dest.display()))
        })
    }

    /// List every published artifact
    pub async fn entries(&self) -> PlygateResult<Vec<Artifact>> {
        let mut artifacts = Vec::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(artifacts),
            Err(e) => {
                return Err(PlygateError::io(
                    format!("reading {}", self.root.display()),
                    e,
                ))
            }
        };

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| PlygateError::io("reading store entry", e))?
        {
            let name = entry.file_name();
            let Some(fingerprint) = name.to_str().and_then(parse_artifact_file_name) else {
                continue;
            };
            if let Some(artifact) = self.lookup(&fingerprint).await? {
                artifacts.push(artifact);
            }
        }

        artifacts.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(artifacts)
    }

    /// Evict every artifact older than the retention window
    ///
    /// Also clears staging leftovers from crashed generations that are
    /// older than the window. Returns the number of artifacts evicted.
    pub async fn sweep(&self, now: SystemTime, retention: Duration) -> PlygateResult<usize> {
        let mut evicted = 0;
        for artifact in self.entries().await? {
            if !is_fresh(&artifact, now, retention) && self.evict(&artifact).await? {
                evicted += 1;
            }
        }

        sweep_dir(&self.staging, now, retention).await;

        if evicted > 0 {
            info!("Cleaned up {} expired PLY cache file(s)", evicted);
        }
        Ok(evicted)
    }
}

/// Remove every entry of `dir` last modified before the retention window
///
/// Used for scratch directories (generation staging, remote downloads)
/// whose contents are only worth keeping while they may be reused. A
/// missing directory counts as empty. Returns the number of entries
/// removed.
pub async fn sweep_dir(dir: &Path, now: SystemTime, retention: Duration) -> usize {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return 0;
    };
    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < retention {
            continue;
        }
        let path = entry.path();
        let result = if meta.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        match result {
            Ok(()) => {
                debug!("Removed stale entry {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    removed
}

/// Stamp a file's mtime with the current time
async fn touch(path: &Path) -> PlygateResult<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_modified(SystemTime::now()))
            .map_err(|e| PlygateError::io(format!("stamping {}", path.display()), e))
    })
    .await
    .map_err(|e| PlygateError::Internal(format!("touch task failed: {e}")))?
}

fn is_cross_device(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(18))
}

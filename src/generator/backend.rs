//! Generator abstraction
//!
//! Lets the coordinator drive the real model process in production and a
//! fake in tests.

use crate::error::PlygateResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Turns one image into one point-cloud file
#[async_trait]
pub trait Generator: Send + Sync {
    /// Check the generator can run (binary present, model provisioned)
    async fn ensure_ready(&self) -> PlygateResult<()>;

    /// Generate a point cloud for `image`
    ///
    /// `workdir` is an empty directory private to this call; the returned
    /// path must lie inside it. Nothing outside `workdir` may be written.
    async fn generate(&self, image: &Path, workdir: &Path) -> PlygateResult<PathBuf>;

    /// Human-readable generator name for logs
    fn name(&self) -> &'static str;
}

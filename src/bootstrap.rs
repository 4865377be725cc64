//! Model provisioning
//!
//! Runs once before the server accepts requests. The checkpoint is fetched
//! on first use, then the generator is probed. Any failure here aborts
//! startup.

use crate::error::{PlygateError, PlygateResult};
use crate::generator::Generator;
use crate::remote::{download_blocking, http_agent, Download, DownloadOutcome};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

/// Checkpoints are large; allow a slow link plenty of time
const CHECKPOINT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Download the checkpoint to `path` unless it is already there
///
/// Returns true when a download happened.
pub async fn ensure_checkpoint(url: &str, path: &Path) -> PlygateResult<bool> {
    if path.is_file() {
        info!("Model checkpoint present at {}", path.display());
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PlygateError::io(format!("creating {}", parent.display()), e))?;
    }

    info!("Downloading model checkpoint from {}", url);
    let url_owned = url.to_string();
    let dest: PathBuf = path.to_path_buf();
    let outcome = tokio::task::spawn_blocking(move || {
        let agent = http_agent(CHECKPOINT_TIMEOUT);
        let request = Download {
            url: &url_owned,
            headers: Vec::new(),
        };
        download_blocking(&agent, &request, &dest)
    })
    .await
    .map_err(|e| PlygateError::Internal(format!("checkpoint download task failed: {e}")))?
    .map_err(|e| PlygateError::Bootstrap(e.to_string()))?;

    match outcome {
        DownloadOutcome::Saved { bytes } => {
            info!("Model checkpoint saved to {} ({} bytes)", path.display(), bytes);
            Ok(true)
        }
        DownloadOutcome::NotFound => Err(PlygateError::Bootstrap(format!(
            "model checkpoint not found at {url}"
        ))),
    }
}

/// Make sure the generator can serve requests
pub async fn provision(
    checkpoint_url: &str,
    checkpoint_path: &Path,
    generator: &dyn Generator,
) -> PlygateResult<()> {
    ensure_checkpoint(checkpoint_url, checkpoint_path).await?;
    generator.ensure_ready().await?;
    info!("Generator {} ready", generator.name());
    Ok(())
}

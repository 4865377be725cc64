//! Image dimension probe
//!
//! Only the header is read. Failures are logged and reported as `None`;
//! dimensions are informational and never block generation.

use std::path::Path;
use tracing::debug;

/// Width and height of the image at `path`, if its header can be read
pub async fn dimensions(path: &Path) -> Option<(u32, u32)> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || probe(&path))
        .await
        .ok()
        .flatten()
}

fn probe(path: &Path) -> Option<(u32, u32)> {
    match imagesize::size(path) {
        Ok(size) => Some((
            u32::try_from(size.width).ok()?,
            u32::try_from(size.height).ok()?,
        )),
        Err(e) => {
            debug!("Could not read image size of {}: {:?}", path.display(), e);
            None
        }
    }
}

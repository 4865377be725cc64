//! Blocking HTTP download shared by remote fetch and model bootstrap

use crate::error::{PlygateError, PlygateResult};
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;
use ureq::Agent;

/// Build the agent used for object and checkpoint downloads
///
/// Status codes are inspected by the caller rather than raised as errors.
pub(crate) fn http_agent(timeout: Duration) -> Agent {
    let config = Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    Agent::new_with_config(config)
}

/// One GET request
pub(crate) struct Download<'a> {
    pub url: &'a str,
    pub headers: Vec<(&'static str, String)>,
}

/// Outcome of a finished download
#[derive(Debug)]
pub(crate) enum DownloadOutcome {
    Saved { bytes: u64 },
    NotFound,
}

/// Stream a GET response into `dest`, atomically
///
/// The body lands in a temp file next to `dest` and is renamed into place
/// only once complete and non-empty.
pub(crate) fn download_blocking(
    agent: &Agent,
    request: &Download<'_>,
    dest: &Path,
) -> PlygateResult<DownloadOutcome> {
    let mut builder = agent.get(request.url);
    for (name, value) in &request.headers {
        builder = builder.header(*name, value);
    }
    let response = builder
        .call()
        .map_err(|e| PlygateError::download(request.url, e.to_string()))?;

    let status = response.status().as_u16();
    if status == 404 {
        return Ok(DownloadOutcome::NotFound);
    }
    if !(200..300).contains(&status) {
        return Err(PlygateError::download(
            request.url,
            format!("unexpected status {status}"),
        ));
    }

    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| PlygateError::io(format!("creating temp file in {}", dir.display()), e))?;

    let mut reader = response.into_body().into_reader();
    let bytes = copy_body(&mut reader, &mut tmp)
        .map_err(|e| PlygateError::download(request.url, e.to_string()))?;
    if bytes == 0 {
        return Err(PlygateError::download(request.url, "downloaded file is empty"));
    }

    tmp.persist(dest)
        .map_err(|e| PlygateError::io(format!("saving {}", dest.display()), e.error))?;

    debug!("Downloaded {} bytes from {} to {}", bytes, request.url, dest.display());
    Ok(DownloadOutcome::Saved { bytes })
}

/// Remote object size from a HEAD request, if the server reports one
pub(crate) fn remote_size(agent: &Agent, request: &Download<'_>) -> Option<u64> {
    let mut builder = agent.head(request.url);
    for (name, value) in &request.headers {
        builder = builder.header(*name, value);
    }
    let response = builder.call().ok()?;
    if !response.status().is_success() {
        return None;
    }
    response
        .headers()
        .get("content-length")?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn copy_body<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<u64> {
    let bytes = io::copy(reader, writer)?;
    writer.flush()?;
    Ok(bytes)
}

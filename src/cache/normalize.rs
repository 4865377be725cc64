//! PLY header normalization
//!
//! The generator declares some vertex properties as `uint`, which common
//! gaussian-splat readers reject. `int` has the same 4-byte width, so those
//! declarations are rewritten in the header and the binary payload after
//! `end_header` is copied through untouched.

use crate::error::{PlygateError, PlygateResult};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Give up looking for `end_header` after this many lines
pub const MAX_HEADER_LINES: usize = 1000;

const HEADER_TERMINATOR: &[u8] = b"end_header";
const UNSUPPORTED_DECL: &str = "property uint ";
const SUPPORTED_DECL: &str = "property int ";

/// Outcome of a normalization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Header lines that were rewritten
    pub rewritten: usize,
}

/// Rewrite `property uint <name>` header lines to `property int <name>`
///
/// The file is replaced by rename of a fully written sibling, so a failure
/// at any point leaves the original bytes in place. A header with no
/// terminator within [`MAX_HEADER_LINES`] is reported as
/// [`PlygateError::HeaderUnterminated`] without touching the file.
pub fn normalize(path: &Path) -> PlygateResult<NormalizeReport> {
    let file = File::open(path)
        .map_err(|e| PlygateError::io(format!("opening {}", path.display()), e))?;
    let mut reader = BufReader::new(file);

    let header = read_header(&mut reader)
        .map_err(|e| PlygateError::io(format!("reading header of {}", path.display()), e))?
        .ok_or_else(|| PlygateError::HeaderUnterminated {
            path: path.to_path_buf(),
            lines: MAX_HEADER_LINES,
        })?;

    let mut rewritten = 0;
    let header: Vec<Vec<u8>> = header
        .into_iter()
        .map(|line| match rewrite_line(&line) {
            Some(new) => {
                rewritten += 1;
                new
            }
            None => line,
        })
        .collect();

    if rewritten == 0 {
        return Ok(NormalizeReport { rewritten });
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut out = NamedTempFile::new_in(dir)
        .map_err(|e| PlygateError::io(format!("creating temp file in {}", dir.display()), e))?;

    write_body(&mut out, &header, &mut reader)
        .map_err(|e| PlygateError::io(format!("rewriting {}", path.display()), e))?;

    out.persist(path)
        .map_err(|e| PlygateError::io(format!("replacing {}", path.display()), e.error))?;

    debug!("Normalized {} header line(s) in {}", rewritten, path.display());
    Ok(NormalizeReport { rewritten })
}

/// Run [`normalize`] on the blocking pool
pub async fn normalize_file(path: PathBuf) -> PlygateResult<NormalizeReport> {
    tokio::task::spawn_blocking(move || normalize(&path))
        .await
        .map_err(|e| PlygateError::Internal(format!("normalize task failed: {e}")))?
}

/// Read header lines up to and including the terminator
///
/// Returns `None` when the terminator is missing or beyond the line bound.
fn read_header<R: BufRead>(reader: &mut R) -> io::Result<Option<Vec<Vec<u8>>>> {
    let mut lines = Vec::new();
    while lines.len() < MAX_HEADER_LINES {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        let done = line.trim_ascii() == HEADER_TERMINATOR;
        lines.push(line);
        if done {
            return Ok(Some(lines));
        }
    }
    Ok(None)
}

fn rewrite_line(line: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(line).ok()?;
    let indent = text.len() - text.trim_start().len();
    if !text[indent..].starts_with(UNSUPPORTED_DECL) {
        return None;
    }
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..indent]);
    out.push_str(SUPPORTED_DECL);
    out.push_str(&text[indent + UNSUPPORTED_DECL.len()..]);
    Some(out.into_bytes())
}

fn write_body<W: Write, R: BufRead>(
    out: &mut W,
    header: &[Vec<u8>],
    payload: &mut R,
) -> io::Result<()> {
    for line in header {
        out.write_all(line)?;
    }
    io::copy(payload, out)?;
    out.flush()
}

//! Content identity for input images
//!
//! A fingerprint is the SHA-256 digest of the exact input bytes. Same bytes,
//! same fingerprint, same artifact.

use crate::error::{PlygateError, PlygateResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes read per chunk while hashing
const CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 digest of an input image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Length of the hex form
    pub const HEX_LEN: usize = 64;

    /// Fingerprint an in-memory buffer
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut builder = FingerprintBuilder::new();
        builder.update(data);
        builder.finish()
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex chars, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = PlygateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::HEX_LEN || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(PlygateError::Validation(format!(
                "not a fingerprint: {s:?}"
            )));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| PlygateError::Validation(format!("not a fingerprint: {e}")))?;
        Ok(Self(bytes))
    }
}

/// Incremental hasher for inputs that arrive in pieces (multipart uploads)
#[derive(Clone, Default)]
pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(self.hasher.finalize().into())
    }
}

/// Fingerprint a byte stream, reading it in bounded chunks
pub async fn fingerprint_reader<R>(mut reader: R) -> std::io::Result<Fingerprint>
where
    R: AsyncRead + Unpin,
{
    let mut builder = FingerprintBuilder::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        builder.update(&buffer[..read]);
    }
    Ok(builder.finish())
}

/// Fingerprint a file on disk
pub async fn fingerprint_file(path: &Path) -> PlygateResult<Fingerprint> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| PlygateError::io(format!("opening {}", path.display()), e))?;

    fingerprint_reader(file)
        .await
        .map_err(|e| PlygateError::io(format!("hashing {}", path.display()), e))
}

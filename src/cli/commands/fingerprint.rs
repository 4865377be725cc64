//! Fingerprint command - print the cache key of a file

use crate::cache::{artifact_file_name, fingerprint_file};
use crate::cli::args::FingerprintArgs;
use crate::error::PlygateResult;

/// Execute the fingerprint command
pub async fn execute(args: FingerprintArgs) -> PlygateResult<()> {
    let fingerprint = fingerprint_file(&args.file).await?;
    println!("{}  {}", fingerprint, artifact_file_name(&fingerprint));
    Ok(())
}

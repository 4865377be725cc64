//! Normalize command - fix a PLY header in place

use crate::cache::normalize_file;
use crate::cli::args::NormalizeArgs;
use crate::error::PlygateResult;
use console::style;

/// Execute the normalize command
pub async fn execute(args: NormalizeArgs) -> PlygateResult<()> {
    let report = normalize_file(args.file.clone()).await?;

    if report.rewritten == 0 {
        println!("{} Nothing to rewrite in {}", style("[OK]").green(), args.file.display());
    } else {
        println!(
            "{} Rewrote {} property line(s) in {}",
            style("[OK]").green(),
            report.rewritten,
            args.file.display()
        );
    }
    Ok(())
}

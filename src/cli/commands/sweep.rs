//! Sweep command - evict expired artifacts

use crate::cache::{is_fresh, sweep_dir, ArtifactStore};
use crate::cli::args::SweepArgs;
use crate::config::Config;
use crate::error::PlygateResult;
use console::style;
use std::time::SystemTime;

const SECS_PER_HOUR: f64 = 3600.0;

/// Execute the sweep command
pub async fn execute(args: SweepArgs, config: &Config) -> PlygateResult<()> {
    let store = ArtifactStore::new(config.cache_dir());
    let retention = config.cache.retention();
    let now = SystemTime::now();

    if args.dry_run {
        let stale: Vec<_> = store
            .entries()
            .await?
            .into_iter()
            .filter(|artifact| !is_fresh(artifact, now, retention))
            .collect();

        for artifact in &stale {
            println!(
                "{}  {:.1}h  {} bytes",
                artifact.file_name(),
                artifact.age(now).as_secs_f64() / SECS_PER_HOUR,
                artifact.size_bytes
            );
        }
        println!("{} expired artifact(s) would be evicted", stale.len());
        return Ok(());
    }

    let evicted = store.sweep(now, retention).await?;
    let downloads = sweep_dir(&config.oss_temp_dir(), now, retention).await;
    println!(
        "{} Evicted {} expired artifact(s) from {}",
        style("[OK]").green(),
        evicted,
        store.root().display()
    );
    if downloads > 0 {
        println!("Removed {} expired download(s)", downloads);
    }
    Ok(())
}

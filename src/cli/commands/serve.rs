//! Serve command - provision the model and run the HTTP API

use crate::bootstrap;
use crate::cache::{sweep_dir, ArtifactStore, Coordinator};
use crate::cli::args::ServeArgs;
use crate::config::{Config, ConfigManager};
use crate::error::PlygateResult;
use crate::generator::{Generator, SharpGenerator};
use crate::ledger::TaskLedger;
use crate::remote::OssFetcher;
use crate::server::{self, AppState};
use console::style;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::info;

/// Execute the serve command
pub async fn execute(args: ServeArgs, config: &Config) -> PlygateResult<()> {
    ConfigManager::ensure_state_dirs(config).await?;

    let generator: Arc<dyn Generator> = Arc::new(SharpGenerator::from_config(config));
    bootstrap::provision(
        &config.model.checkpoint_url,
        &config.checkpoint_path(),
        generator.as_ref(),
    )
    .await?;

    let store = ArtifactStore::open(config.cache_dir()).await?;
    let retention = config.cache.retention();
    let now = SystemTime::now();
    let evicted = store.sweep(now, retention).await?;
    let downloads = sweep_dir(&config.oss_temp_dir(), now, retention).await;
    info!(evicted, downloads, "Startup sweep finished");

    if config.cache.sweep_interval_secs > 0 {
        server::spawn_sweeper(
            store.clone(),
            vec![config.oss_temp_dir()],
            retention,
            Duration::from_secs(config.cache.sweep_interval_secs),
        );
    }

    let coordinator = Coordinator::new(
        store,
        generator,
        retention,
        config.generator.max_concurrent,
    );
    let state = Arc::new(AppState::new(
        config.clone(),
        coordinator,
        Arc::new(OssFetcher::new(&config.oss)),
        TaskLedger::from_config(&config.ledger),
    ));

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    eprintln!("{} Serving on {}", style("[OK]").green(), bind);
    server::serve(state, &bind).await
}

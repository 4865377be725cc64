//! HTTP surface
//!
//! Routes:
//! - `GET /` liveness
//! - `POST /api/upload` multipart image upload
//! - `POST /api/generate_from_oss_url` remote image by URL
//! - `GET /api/ply/{filename}` artifact download
//! - `GET /api/status/{task_id}` task ledger lookup

pub mod error;
pub mod handlers;

use crate::cache::{sweep_dir, ArtifactStore, Coordinator};
use crate::config::Config;
use crate::error::{PlygateError, PlygateResult};
use crate::ledger::TaskLedger;
use crate::remote::RemoteFetcher;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared request context
pub struct AppState {
    pub config: Config,
    pub coordinator: Coordinator,
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub ledger: TaskLedger,
}

impl AppState {
    pub fn new(
        config: Config,
        coordinator: Coordinator,
        fetcher: Arc<dyn RemoteFetcher>,
        ledger: TaskLedger,
    ) -> Self {
        Self {
            config,
            coordinator,
            fetcher,
            ledger,
        }
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(state.config.upload.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/upload", post(handlers::upload))
        .route(
            "/api/generate_from_oss_url",
            post(handlers::generate_from_oss_url),
        )
        .route("/api/ply/:filename", get(handlers::get_ply))
        .route("/api/status/:task_id", get(handlers::get_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allow-listed origins with credentials; methods and headers mirror the
/// preflight request
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: Arc<AppState>, bind: &str) -> PlygateResult<()> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| PlygateError::io(format!("binding {bind}"), e))?;
    let local = listener
        .local_addr()
        .map_err(|e| PlygateError::io("reading listener address", e))?;
    info!("Listening on http://{}", local);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| PlygateError::io("serving HTTP", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Evict expired artifacts every `interval`
///
/// Entries of each `scratch` directory older than `retention` are removed
/// on the same tick.
pub fn spawn_sweeper(
    store: ArtifactStore,
    scratch: Vec<PathBuf>,
    retention: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; startup already swept.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let now = SystemTime::now();
            if let Err(e) = store.sweep(now, retention).await {
                warn!("Background sweep failed: {}", e);
            }
            for dir in &scratch {
                sweep_dir(dir, now, retention).await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::tests::set_mtime;
    use crate::cache::Fingerprint;
    use tempfile::TempDir;

    #[tokio::test]
    async fn sweeper_evicts_on_interval() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::open(temp.path()).await.unwrap();
        let fp = Fingerprint::of_bytes(b"old");
        let staged = temp.path().join("s.ply");
        std::fs::write(&staged, b"x").unwrap();
        store.publish(&fp, &staged).await.unwrap();
        set_mtime(&store.artifact_path(&fp), SystemTime::now() - Duration::from_secs(120));

        let downloads = temp.path().join("downloads");
        std::fs::create_dir_all(&downloads).unwrap();
        let old_download = downloads.join("9f86d081-cat.png");
        let new_download = downloads.join("60303ae2-dog.png");
        std::fs::write(&old_download, b"old").unwrap();
        std::fs::write(&new_download, b"new").unwrap();
        set_mtime(&old_download, SystemTime::now() - Duration::from_secs(120));

        let handle = spawn_sweeper(
            store.clone(),
            vec![downloads],
            Duration::from_secs(60),
            Duration::from_millis(50),
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.abort();

        assert!(store.lookup(&fp).await.unwrap().is_none());
        assert!(!old_download.exists());
        assert!(new_download.exists());
    }

    #[test]
    fn invalid_cors_origins_are_skipped() {
        let _layer = cors_layer(&["http://localhost:5173".to_string(), "bad\norigin".to_string()]);
    }
}

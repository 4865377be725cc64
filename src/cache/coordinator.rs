//! Generation coordinator
//!
//! Resolves a fingerprint to a published artifact, generating it on a miss.
//! Concurrent misses for the same fingerprint share one generation: the
//! first caller spawns it and registers a shared handle, later callers
//! await that handle. Generation runs on its own task so a dropped request
//! does not abort it.

use crate::cache::fingerprint::Fingerprint;
use crate::cache::normalize::normalize_file;
use crate::cache::store::{is_fresh, Artifact, ArtifactStore};
use crate::error::{PlygateError, PlygateResult};
use crate::generator::Generator;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

/// Result of resolving a fingerprint
#[derive(Debug, Clone)]
pub struct Resolution {
    pub artifact: Artifact,
    /// True when no generation work was performed for this request
    pub cached: bool,
}

#[derive(Debug, Clone)]
struct Generated {
    artifact: Artifact,
    reused: bool,
}

type SharedGeneration = Shared<BoxFuture<'static, Result<Generated, Arc<PlygateError>>>>;

/// Single-flight front of the artifact store
pub struct Coordinator {
    store: ArtifactStore,
    generator: Arc<dyn Generator>,
    retention: Duration,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashMap<Fingerprint, SharedGeneration>>>,
}

impl Coordinator {
    /// `max_concurrent` bounds simultaneous generator runs across all
    /// fingerprints
    pub fn new(
        store: ArtifactStore,
        generator: Arc<dyn Generator>,
        retention: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            generator,
            retention,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Number of generations currently running
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Return the artifact for `fingerprint`, generating it from `image` on
    /// a miss
    ///
    /// A stale artifact is evicted before regeneration. `image` must hold
    /// the bytes `fingerprint` was computed from.
    pub async fn resolve(
        &self,
        fingerprint: Fingerprint,
        image: &Path,
    ) -> PlygateResult<Resolution> {
        if let Some(artifact) = self.fresh_hit(&fingerprint).await? {
            info!(fingerprint = %fingerprint.short(), "Using cached PLY file");
            return Ok(Resolution {
                artifact,
                cached: true,
            });
        }

        let generation = match self.joinable(&fingerprint).await {
            Some(existing) => existing,
            None => {
                // Staged before taking the map lock so a slow copy only
                // delays this request. The copy also frees the spawned task
                // from the caller's source file.
                let staging = self.store.staging_dir().await?;
                let staged_image = stage_image(image, staging.path()).await?;

                let mut in_flight = self.in_flight.lock().await;
                if let Some(existing) = in_flight.get(&fingerprint).cloned() {
                    // Another caller won the race while we were staging.
                    drop(in_flight);
                    drop(staging);
                    debug!(fingerprint = %fingerprint.short(), "Joining in-flight generation");
                    existing
                } else {
                    let generation = self.spawn_generation(fingerprint, staging, staged_image);
                    in_flight.insert(fingerprint, generation.clone());
                    generation
                }
            }
        };

        match generation.await {
            Ok(generated) => Ok(Resolution {
                artifact: generated.artifact,
                cached: generated.reused,
            }),
            Err(shared) => {
                Err(Arc::try_unwrap(shared).unwrap_or_else(|shared| shared.duplicate()))
            }
        }
    }

    async fn joinable(&self, fingerprint: &Fingerprint) -> Option<SharedGeneration> {
        let existing = self.in_flight.lock().await.get(fingerprint).cloned();
        if existing.is_some() {
            debug!(fingerprint = %fingerprint.short(), "Joining in-flight generation");
        }
        existing
    }

    async fn fresh_hit(&self, fingerprint: &Fingerprint) -> PlygateResult<Option<Artifact>> {
        match self.store.lookup(fingerprint).await? {
            Some(artifact) if is_fresh(&artifact, SystemTime::now(), self.retention) => {
                Ok(Some(artifact))
            }
            Some(stale) => {
                info!(fingerprint = %fingerprint.short(), "Cached PLY file expired, evicting");
                self.store.evict(&stale).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn spawn_generation(
        &self,
        fingerprint: Fingerprint,
        staging: tempfile::TempDir,
        image: PathBuf,
    ) -> SharedGeneration {
        let store = self.store.clone();
        let generator = self.generator.clone();
        let permits = self.permits.clone();
        let in_flight = self.in_flight.clone();
        let retention = self.retention;

        let handle = tokio::spawn(async move {
            let result: PlygateResult<Generated> = async {
                // A generation for this fingerprint may have published
                // between our lookup and taking the lease.
                if let Some(artifact) = store.lookup(&fingerprint).await? {
                    if is_fresh(&artifact, SystemTime::now(), retention) {
                        return Ok(Generated {
                            artifact,
                            reused: true,
                        });
                    }
                }

                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| PlygateError::Internal("generator pool closed".to_string()))?;

                let workdir = staging.path().join("work");
                fs::create_dir_all(&workdir)
                    .await
                    .map_err(|e| PlygateError::io(format!("creating {}", workdir.display()), e))?;

                info!(
                    fingerprint = %fingerprint.short(),
                    generator = generator.name(),
                    "Generating PLY file"
                );
                let output = generator.generate(&image, &workdir).await?;

                match normalize_file(output.clone()).await {
                    Ok(report) if report.rewritten > 0 => debug!(
                        fingerprint = %fingerprint.short(),
                        rewritten = report.rewritten,
                        "Normalized PLY header"
                    ),
                    Ok(_) => {}
                    Err(e @ PlygateError::HeaderUnterminated { .. }) => {
                        warn!(fingerprint = %fingerprint.short(), "Publishing unnormalized output: {}", e)
                    }
                    Err(e) => return Err(e),
                }

                let artifact = store.publish(&fingerprint, &output).await?;
                info!(
                    fingerprint = %fingerprint.short(),
                    size_bytes = artifact.size_bytes,
                    "PLY file generated"
                );
                Ok(Generated {
                    artifact,
                    reused: false,
                })
            }
            .await;

            drop(staging);
            in_flight.lock().await.remove(&fingerprint);
            if let Err(e) = &result {
                warn!(fingerprint = %fingerprint.short(), "Generation failed: {}", e);
            }
            result.map_err(Arc::new)
        });

        async move {
            handle.await.map_err(|e| {
                Arc::new(PlygateError::Internal(format!("generation task failed: {e}")))
            })?
        }
        .boxed()
        .shared()
    }
}

/// Copy the request image into the generation's private staging dir
async fn stage_image(image: &Path, staging: &Path) -> PlygateResult<PathBuf> {
    let name = image.file_name().ok_or_else(|| {
        PlygateError::Validation(format!("not a file path: {}", image.display()))
    })?;
    let source_dir = staging.join("source");
    fs::create_dir_all(&source_dir)
        .await
        .map_err(|e| PlygateError::io(format!("creating {}", source_dir.display()), e))?;
    let staged = source_dir.join(name);
    fs::copy(image, &staged)
        .await
        .map_err(|e| PlygateError::io(format!("staging {}", image.display()), e))?;
    Ok(staged)
}

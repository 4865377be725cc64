//! Task ledger
//!
//! In-memory outcome records, keyed by the task id returned with each
//! generation response. A record is `pending` only while its request is
//! still being handled. Records expire after a TTL and the map is capped; both limits
//! are enforced whenever a task is added.

use crate::config::schema::LedgerConfig;
use crate::error::{PlygateError, PlygateResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

/// One request's outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: Uuid,

    pub status: TaskStatus,

    /// Artifact file name once generated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ply_filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_height: Option<u32>,

    /// Whether the artifact came from the cache
    pub cached: bool,

    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    fn pending(dimensions: Option<(u32, u32)>, now: DateTime<Utc>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            status: TaskStatus::Pending,
            ply_filename: None,
            image_width: dimensions.map(|(w, _)| w),
            image_height: dimensions.map(|(_, h)| h),
            cached: false,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Bounded, expiring task map
#[derive(Debug)]
pub struct TaskLedger {
    tasks: RwLock<HashMap<Uuid, TaskRecord>>,
    ttl: Duration,
    max_entries: usize,
}

impl TaskLedger {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        let secs = i64::try_from(config.ttl_secs).unwrap_or(i64::MAX);
        Self::new(
            Duration::try_seconds(secs).unwrap_or(Duration::MAX),
            config.max_entries,
        )
    }

    /// Record a new pending task and return its id
    pub async fn begin(&self, dimensions: Option<(u32, u32)>) -> Uuid {
        let now = Utc::now();
        let record = TaskRecord::pending(dimensions, now);
        let id = record.task_id;

        let mut tasks = self.tasks.write().await;
        self.prune(&mut tasks, now);
        tasks.insert(id, record);
        debug!(task_id = %id, "Task started");
        id
    }

    /// Mark a task completed
    pub async fn complete(&self, id: Uuid, ply_filename: String, cached: bool) {
        self.update(id, |record| {
            record.status = TaskStatus::Completed;
            record.ply_filename = Some(ply_filename);
            record.cached = cached;
        })
        .await;
    }

    /// Mark a task failed
    pub async fn fail(&self, id: Uuid, message: String) {
        self.update(id, |record| {
            record.status = TaskStatus::Failed;
            record.error = Some(message);
        })
        .await;
    }

    /// Look up a task by its id string
    pub async fn get(&self, task_id: &str) -> PlygateResult<TaskRecord> {
        let not_found = || PlygateError::TaskNotFound(task_id.to_string());
        let id: Uuid = task_id.parse().map_err(|_| not_found())?;

        let tasks = self.tasks.read().await;
        match tasks.get(&id) {
            Some(record) if !self.expired(record, Utc::now()) => Ok(record.clone()),
            _ => Err(not_found()),
        }
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    async fn update(&self, id: Uuid, apply: impl FnOnce(&mut TaskRecord)) {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&id) {
            Some(record) => {
                apply(record);
                record.updated_at = Utc::now();
                debug!(task_id = %id, status = ?record.status, "Task updated");
            }
            None => debug!(task_id = %id, "Task already pruned, dropping update"),
        }
    }

    fn expired(&self, record: &TaskRecord, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(record.updated_at) > self.ttl
    }

    /// Drop expired records, then the oldest ones until there is room for
    /// one more
    fn prune(&self, tasks: &mut HashMap<Uuid, TaskRecord>, now: DateTime<Utc>) {
        tasks.retain(|_, record| !self.expired(record, now));

        if tasks.len() >= self.max_entries {
            let mut by_age: Vec<(DateTime<Utc>, Uuid)> =
                tasks.values().map(|r| (r.created_at, r.task_id)).collect();
            by_age.sort();
            let excess = tasks.len() + 1 - self.max_entries;
            for (_, id) in by_age.into_iter().take(excess) {
                tasks.remove(&id);
            }
        }
    }
}

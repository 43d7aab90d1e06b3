//! In-memory progress registry shared by workers and pollers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::config::DuplicatePolicy;
use crate::error::SchedulingError;
use crate::types::{JobId, QueueStats, Task, TaskStatus};

/// Concurrent map from source URL to its [`Task`].
///
/// The handle is cheap to clone; all clones share the same map. Every write
/// swaps in a complete record under the write lock, and no lock is held across
/// an `.await`, so pollers never wait on network or disk I/O.
#[derive(Clone, Default)]
pub struct ProgressStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
}

impl ProgressStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-written record (records are
    // swapped whole), so a poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Task>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Task>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the record for `url`.
    pub fn upsert(&self, url: &str, mut task: Task) {
        task.url = url.to_string();
        task.timestamp = Utc::now();
        self.write().insert(url.to_string(), task);
    }

    /// Current record for `url`, if tracked
    pub fn get(&self, url: &str) -> Option<Task> {
        self.read().get(url).cloned()
    }

    /// Copy of all records, most recently updated first
    pub fn snapshot(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.read().values().cloned().collect();
        tasks.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        tasks
    }

    /// Copy of all records keyed by URL
    pub fn snapshot_map(&self) -> HashMap<String, Task> {
        self.read().clone()
    }

    /// Remove every record in a terminal state; returns how many were removed.
    pub fn clear_finalized(&self) -> usize {
        let mut tasks = self.write();
        let before = tasks.len();
        tasks.retain(|_, task| !task.status.is_terminal());
        before - tasks.len()
    }

    /// Number of tracked records
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of records currently in `status`
    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.read().values().filter(|t| t.status == status).count()
    }

    /// Task counts grouped by status
    pub fn stats(&self) -> QueueStats {
        let tasks = self.read();
        let mut stats = QueueStats {
            total_jobs: tasks.len(),
            ..Default::default()
        };
        for task in tasks.values() {
            *stats
                .by_status
                .entry(task.status.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats
    }

    /// Admit a freshly queued task, applying the duplicate policy atomically.
    ///
    /// Returns the job that was displaced when `policy` is
    /// [`DuplicatePolicy::Replace`] and the URL was still active.
    pub(crate) fn admit(
        &self,
        task: Task,
        policy: DuplicatePolicy,
    ) -> std::result::Result<Option<JobId>, SchedulingError> {
        let mut tasks = self.write();

        let displaced = match tasks.get(&task.url) {
            Some(existing) if existing.status.is_active() => match policy {
                DuplicatePolicy::Reject => {
                    return Err(SchedulingError::AlreadyActive {
                        url: task.url.clone(),
                        status: existing.status,
                    });
                }
                DuplicatePolicy::Replace => Some(existing.job),
            },
            _ => None,
        };

        tasks.insert(task.url.clone(), task);
        Ok(displaced)
    }

    /// Apply `update` to the record for `url` if it still belongs to `job`.
    ///
    /// While the status stays the same in-progress state, progress never moves
    /// backwards. Returns `false` when the record was replaced or cleared.
    pub(crate) fn update_job(&self, url: &str, job: JobId, update: impl FnOnce(&mut Task)) -> bool {
        let mut tasks = self.write();
        let Some(current) = tasks.get(url) else {
            return false;
        };
        if current.job != job {
            return false;
        }

        let mut next = current.clone();
        update(&mut next);

        if next.status == current.status && current.status.is_active() {
            next.progress_percentage = next.progress_percentage.max(current.progress_percentage);
        }
        next.progress_percentage = next.progress_percentage.clamp(0.0, 100.0);
        next.timestamp = Utc::now();

        tasks.insert(url.to_string(), next);
        true
    }

    /// Drop the record for `url` if it still belongs to `job`.
    pub(crate) fn remove_job(&self, url: &str, job: JobId) -> bool {
        let mut tasks = self.write();
        if tasks.get(url).is_some_and(|t| t.job == job) {
            tasks.remove(url);
            true
        } else {
            false
        }
    }
}

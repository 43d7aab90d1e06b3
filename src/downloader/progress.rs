//! Read-side queries for polling consumers.

use std::collections::HashMap;

use crate::types::{ClearResult, Event, QueueStats, TaskView};

use super::MediaDownloader;

impl MediaDownloader {
    /// Point-in-time copy of every tracked task, keyed by URL.
    ///
    /// Cheap enough to call on every poll; workers are never blocked on I/O
    /// while the copy is taken.
    pub fn get_progress_snapshot(&self) -> HashMap<String, TaskView> {
        self.store.snapshot_map()
    }

    /// All tracked tasks, most recently updated first
    pub fn progress_list(&self) -> Vec<TaskView> {
        self.store.snapshot()
    }

    /// Current state of one task
    pub fn get_progress(&self, url: &str) -> Option<TaskView> {
        self.store.get(url)
    }

    /// Remove every task in `completed`, `converted`, `failed` or `skipped`.
    ///
    /// Queued and running tasks are left untouched.
    pub fn clear_finalized_progress(&self) -> ClearResult {
        let removed_count = self.store.clear_finalized();
        tracing::info!(removed_count, "Cleared finished entries");
        self.emit_event(Event::Cleared {
            removed: removed_count,
        });
        ClearResult {
            removed_count,
            message: format!("Cleared {removed_count} finished entries from progress list."),
        }
    }

    /// Task counts grouped by status
    pub fn queue_stats(&self) -> QueueStats {
        self.store.stats()
    }
}

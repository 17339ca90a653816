//! Task store: task id → first start time and cumulative duration.

use super::{Repository, Snapshot};
use crate::duration::WorkDuration;
use crate::error::{Error, Result};
use crate::issue::normalize_task_id;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Accumulated time for one task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// First time the task was ever started; merges never move it.
    pub start: DateTime<Local>,
    pub duration: WorkDuration,
}

/// Persisted task durations, keyed by normalized task id (sorted for stable reports and syncs).
pub struct TaskStore {
    snapshot: Snapshot<BTreeMap<String, TaskRecord>>,
}

impl TaskStore {
    /// Creates a store backed by `repo` without touching it yet.
    pub fn new(repo: Box<dyn Repository>) -> Self {
        TaskStore {
            snapshot: Snapshot::new(repo),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.snapshot.path()
    }

    pub fn set_repository(&mut self, repo: Box<dyn Repository>) {
        self.snapshot.set_repository(repo);
    }

    /// Re-reads the persisted snapshot; the file always wins over memory.
    pub fn load(&mut self) -> Result<()> {
        self.snapshot.reload()
    }

    pub fn save(&self) -> Result<()> {
        self.snapshot.save()
    }

    /// Tasks as of the last load or mutation.
    pub fn tasks(&self) -> &BTreeMap<String, TaskRecord> {
        self.snapshot.data()
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskRecord> {
        self.snapshot.data().get(&normalize_task_id(task_id))
    }

    /// Reloads, then adds `delta` to the task (creating it with `start` if new), then persists.
    ///
    /// Not atomic across processes: an edit made by another process between our reload
    /// and our save is overwritten.
    pub fn upsert(
        &mut self,
        task_id: &str,
        start: DateTime<Local>,
        delta: WorkDuration,
    ) -> Result<TaskRecord> {
        let id = normalize_task_id(task_id);
        debug!("Updating data for task: {}, start: {}, duration: {}", id, start, delta);
        self.load()?;
        let record = self
            .snapshot
            .data_mut()
            .entry(id)
            .and_modify(|r| r.duration += delta)
            .or_insert(TaskRecord {
                start,
                duration: delta,
            })
            .clone();
        self.save()?;
        Ok(record)
    }

    /// Reloads, deletes the task, persists.
    pub fn remove(&mut self, task_id: &str) -> Result<TaskRecord> {
        let id = normalize_task_id(task_id);
        self.load()?;
        let removed = self
            .snapshot
            .data_mut()
            .remove(&id)
            .ok_or(Error::NotFound {
                kind: "Task",
                name: id,
            })?;
        self.save()?;
        Ok(removed)
    }

    /// Reloads, deletes every listed task that is still present, persists. Returns how many went.
    pub fn remove_all<S: AsRef<str>>(&mut self, task_ids: &[S]) -> Result<usize> {
        self.load()?;
        let data = self.snapshot.data_mut();
        let removed = task_ids
            .iter()
            .filter(|id| {
                let id: &str = id.as_ref();
                data.remove(id).is_some()
            })
            .count();
        self.save()?;
        Ok(removed)
    }

    /// Sum of every stored duration.
    pub fn total(&self) -> WorkDuration {
        self.snapshot.data().values().map(|r| r.duration).sum()
    }
}

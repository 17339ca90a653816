//! The in-memory timer: at most one task is running at a time.
//!
//! Only committed time survives the process; the running interval is written to the
//! [`TaskStore`] when it stops, when another task starts, or on exit.

use crate::duration::WorkDuration;
use crate::error::Result;
use crate::issue::normalize_task_id;
use crate::store::TaskStore;
use chrono::{DateTime, Local};

/// Source of "now". Swapped for a manual clock in tests.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// The running task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveTask {
    pub task: String,
    pub started: DateTime<Local>,
}

impl ActiveTask {
    pub fn elapsed(&self, now: DateTime<Local>) -> WorkDuration {
        WorkDuration::between(&self.started, &now)
    }
}

/// A running interval that has been committed to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stopped {
    pub task: String,
    pub stopped_at: DateTime<Local>,
    /// Length of this interval.
    pub elapsed: WorkDuration,
    /// Stored cumulative duration after the merge.
    pub total: WorkDuration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started {
        task: String,
        at: DateTime<Local>,
    },
    /// The same task was already running; nothing changed.
    AlreadyRunning {
        task: String,
        elapsed: WorkDuration,
    },
    /// Another task was committed and stopped first.
    Switched {
        stopped: Stopped,
        task: String,
        at: DateTime<Local>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    Idle,
    Active(ActiveTask),
}

impl Session {
    pub fn active(&self) -> Option<&ActiveTask> {
        match self {
            Session::Idle => None,
            Session::Active(active) => Some(active),
        }
    }

    /// Name and running time of the active task, if any.
    pub fn current(&self, now: DateTime<Local>) -> Option<(&str, WorkDuration)> {
        self.active()
            .map(|active| (active.task.as_str(), active.elapsed(now)))
    }

    /// Starts `name`, first committing whatever else is running.
    pub fn start(
        &mut self,
        name: &str,
        store: &mut TaskStore,
        now: DateTime<Local>,
    ) -> Result<StartOutcome> {
        let task = normalize_task_id(name);
        if let Some(active) = self.active() {
            if active.task == task {
                return Ok(StartOutcome::AlreadyRunning {
                    elapsed: active.elapsed(now),
                    task,
                });
            }
        }
        let stopped = self.stop(store, now)?;
        *self = Session::Active(ActiveTask {
            task: task.clone(),
            started: now,
        });
        Ok(match stopped {
            Some(stopped) => StartOutcome::Switched { stopped, task, at: now },
            None => StartOutcome::Started { task, at: now },
        })
    }

    /// Commits the running interval and goes idle. `Ok(None)` when nothing was running.
    ///
    /// If the commit fails the session stays active, so a later exit can retry it.
    pub fn stop(&mut self, store: &mut TaskStore, now: DateTime<Local>) -> Result<Option<Stopped>> {
        let Some(active) = self.active() else {
            return Ok(None);
        };
        let elapsed = active.elapsed(now);
        let record = store.upsert(&active.task, active.started, elapsed)?;
        let task = active.task.clone();
        *self = Session::Idle;
        Ok(Some(Stopped {
            task,
            stopped_at: now,
            elapsed,
            total: record.duration,
        }))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Clock;
    use chrono::{DateTime, Duration, Local, TimeZone};
    use std::cell::Cell;
    use std::rc::Rc;

    /// Clock that only moves when told to. Clones share the same time.
    #[derive(Clone)]
    pub struct ManualClock(Rc<Cell<DateTime<Local>>>);

    impl ManualClock {
        pub fn new() -> Self {
            ManualClock(Rc::new(Cell::new(
                Local.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap(),
            )))
        }

        pub fn advance(&self, secs: i64) {
            self.0.set(self.0.get() + Duration::seconds(secs));
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Local> {
            self.0.get()
        }
    }
}

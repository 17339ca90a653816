//! Application state owned by the command loop: stores, timer, sync engine, settings.

use crate::config::Config;
use crate::duration::WorkDuration;
use crate::error::{Error, Result};
use crate::issue::normalize_task_id;
use crate::logging::LogControl;
use crate::remote::{IssueSummary, JiraClient, WorkLogClient};
use crate::session::{Clock, Session, StartOutcome, Stopped, SystemClock};
use crate::store::{AliasRecord, AliasRegistry, FileRepository, TaskRecord, TaskStore};
use crate::sync::{SyncEngine, SyncReport, TaskSync};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// One line of the `report` command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportRow {
    pub task: String,
    /// Stored duration, plus the running interval for the active task.
    pub duration: WorkDuration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub rows: Vec<ReportRow>,
    /// Active task and its running interval.
    pub live: Option<(String, WorkDuration)>,
    pub total: WorkDuration,
}

/// What the exit path managed to save.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExitReport {
    pub stopped: Option<Stopped>,
    /// Running interval that could not be committed.
    pub lost: Option<(String, WorkDuration)>,
}

pub struct App {
    pub config: Config,
    pub tasks: TaskStore,
    pub aliases: AliasRegistry,
    pub session: Session,
    pub sync: SyncEngine,
    pub log: LogControl,
    clock: Box<dyn Clock>,
}

impl App {
    pub fn new(
        config: Config,
        tasks: TaskStore,
        aliases: AliasRegistry,
        client: Box<dyn WorkLogClient>,
        clock: Box<dyn Clock>,
        log: LogControl,
    ) -> Self {
        App {
            config,
            tasks,
            aliases,
            session: Session::default(),
            sync: SyncEngine::new(client),
            log,
            clock,
        }
    }

    /// File-backed stores, a real Jira client and the system clock.
    pub fn from_config(config: Config, log: LogControl) -> Result<Self> {
        let tasks = TaskStore::new(Box::new(FileRepository::new(&config.data_file)));
        let aliases = AliasRegistry::new(Box::new(FileRepository::new(&config.alias_file)));
        let client = JiraClient::new(&config.jira_url, config.timeout)?;
        Ok(App::new(
            config,
            tasks,
            aliases,
            Box::new(client),
            Box::new(SystemClock),
            log,
        ))
    }

    pub fn now(&self) -> DateTime<Local> {
        self.clock.now()
    }

    pub fn start(&mut self, name: &str) -> Result<StartOutcome> {
        let now = self.now();
        self.session.start(name, &mut self.tasks, now)
    }

    pub fn stop(&mut self) -> Result<Option<Stopped>> {
        let now = self.now();
        self.session.stop(&mut self.tasks, now)
    }

    pub fn current(&self) -> Option<(String, WorkDuration)> {
        self.session
            .current(self.now())
            .map(|(task, elapsed)| (task.to_string(), elapsed))
    }

    /// Stored tasks with the running interval folded in, and the grand total.
    pub fn report(&mut self) -> Result<Report> {
        self.tasks.load()?;
        let live = self.current();
        let rows = self
            .tasks
            .tasks()
            .iter()
            .map(|(task, record)| {
                let running = live
                    .as_ref()
                    .filter(|(name, _)| name == task)
                    .map(|(_, elapsed)| *elapsed)
                    .unwrap_or(WorkDuration::ZERO);
                ReportRow {
                    task: task.clone(),
                    duration: record.duration + running,
                }
            })
            .collect();
        let total = self.tasks.total() + live.as_ref().map(|(_, d)| *d).unwrap_or_default();
        Ok(Report { rows, live, total })
    }

    /// Manually adds time to a task, as if it had just been tracked.
    pub fn add(&mut self, name: &str, duration: &str) -> Result<(String, TaskRecord)> {
        let duration = WorkDuration::parse(duration)?;
        let task = normalize_task_id(name);
        let now = self.now();
        let record = self.tasks.upsert(&task, now, duration)?;
        Ok((task, record))
    }

    /// The stored id for `name`, or `NotFound`.
    pub fn find_task(&mut self, name: &str) -> Result<String> {
        self.tasks.load()?;
        let task = normalize_task_id(name);
        if self.tasks.get(&task).is_some() {
            Ok(task)
        } else {
            Err(Error::NotFound {
                kind: "Task",
                name: task,
            })
        }
    }

    pub fn delete(&mut self, task: &str) -> Result<TaskRecord> {
        self.tasks.remove(task)
    }

    pub fn alias_list(&mut self) -> Result<Vec<(String, AliasRecord)>> {
        self.aliases.load()?;
        Ok(self
            .aliases
            .aliases()
            .iter()
            .map(|(a, r)| (a.clone(), r.clone()))
            .collect())
    }

    pub fn alias_add(&mut self, alias: &str, issue: &str, comment: &str) -> Result<AliasRecord> {
        self.aliases.add(alias, issue, comment)
    }

    pub fn find_alias(&mut self, alias: &str) -> Result<AliasRecord> {
        self.aliases.load()?;
        self.aliases.get(alias).cloned().ok_or_else(|| Error::NotFound {
            kind: "Alias",
            name: alias.to_string(),
        })
    }

    pub fn alias_remove(&mut self, alias: &str) -> Result<AliasRecord> {
        self.aliases.remove(alias)
    }

    pub fn sync(&mut self, progress: &mut dyn FnMut(&TaskSync)) -> Result<SyncReport> {
        self.sync
            .sync_all(&mut self.tasks, &mut self.aliases, progress)
    }

    pub fn assigned_issues(&mut self) -> Result<Vec<IssueSummary>> {
        self.sync.assigned_issues()
    }

    /// Commits the running task and forgets cached credentials. Never fails: if the
    /// commit cannot be written, the lost interval is reported instead.
    pub fn shutdown(&mut self) -> ExitReport {
        self.sync.clear_credentials();
        let now = self.now();
        match self.session.stop(&mut self.tasks, now) {
            Ok(stopped) => ExitReport {
                stopped,
                lost: None,
            },
            Err(e) => {
                error!("Could not save the running task on exit: {}", e);
                let lost = self
                    .session
                    .current(now)
                    .map(|(task, elapsed)| (task.to_string(), elapsed));
                ExitReport {
                    stopped: None,
                    lost,
                }
            }
        }
    }

    /// Points the Jira client at a new base URL. Returns the old URL.
    pub fn set_jira_url(&mut self, url: &str) -> Result<String> {
        let client = JiraClient::new(url, self.config.timeout)?;
        self.sync.set_client(Box::new(client));
        info!("Jira URL set to {}", url.trim());
        Ok(std::mem::replace(
            &mut self.config.jira_url,
            url.trim().to_string(),
        ))
    }

    /// Switches the task store to another file. Returns the old path.
    pub fn set_data_file(&mut self, path: PathBuf) -> PathBuf {
        if self.session.active().is_some() {
            warn!("Task store changed while a task is running; it will be saved to the new file");
        }
        self.tasks
            .set_repository(Box::new(FileRepository::new(&path)));
        info!("Task store is now {}", self.tasks.path().display());
        std::mem::replace(&mut self.config.data_file, path)
    }

    /// Switches the alias registry to another file. Returns the old path.
    pub fn set_alias_file(&mut self, path: PathBuf) -> PathBuf {
        self.aliases
            .set_repository(Box::new(FileRepository::new(&path)));
        info!("Alias store is now {}", self.aliases.path().display());
        std::mem::replace(&mut self.config.alias_file, path)
    }

    /// Changes log verbosity. Returns the old level.
    pub fn set_log_level(&mut self, level: &str) -> Result<String> {
        let old = self.log.set_level(level)?;
        self.config.log_level = self.log.level().to_string();
        Ok(old)
    }
}

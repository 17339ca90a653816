//! Posting stored durations to Jira and reconciling the task store with the results.
//!
//! Tasks are independent: a rejected or unpostable task stays in the store for a later
//! sync and the batch carries on. Two failures stop the batch early because every later
//! request would fail the same way: a 401 (credentials are marked invalid) and a transport
//! failure (the server is unreachable). Tasks posted before the stop are still removed.

use crate::duration::WorkDuration;
use crate::error::{Error, Result};
use crate::issue::is_issue_key;
use crate::remote::{Credentials, IssueSummary, PostOutcome, SearchOutcome, WorkLogClient};
use crate::store::{AliasRegistry, TaskStore};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Jira refuses work-log entries shorter than a minute.
pub const MIN_WORKLOG_SECS: u64 = 60;

/// What happened to one task during a sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Posted,
    /// The task (or its alias) does not name a `LETTERS-DIGITS` issue.
    Ambiguous,
    Rejected(u16),
    Unauthorized,
    Unreachable(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskSync {
    pub task: String,
    pub issue: String,
    /// Seconds submitted (after the one-minute floor).
    pub seconds: u64,
    pub status: TaskStatus,
}

/// Why a batch stopped before reaching every task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncAbort {
    /// Credentials were refused; they must be re-entered before resuming.
    Unauthorized,
    Unreachable(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub succeeded: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    /// Tasks never attempted because the batch stopped early.
    pub pending: BTreeSet<String>,
    pub aborted: Option<SyncAbort>,
    /// Tasks left in the store afterwards.
    pub remaining: usize,
}

impl SyncReport {
    pub fn credentials_rejected(&self) -> bool {
        self.aborted == Some(SyncAbort::Unauthorized)
    }
}

/// Owns the remote client and the cached credentials.
pub struct SyncEngine {
    client: Box<dyn WorkLogClient>,
    credentials: Option<Credentials>,
}

impl SyncEngine {
    pub fn new(client: Box<dyn WorkLogClient>) -> Self {
        SyncEngine {
            client,
            credentials: None,
        }
    }

    pub fn set_client(&mut self, client: Box<dyn WorkLogClient>) {
        self.client = client;
    }

    /// True when there are no credentials or the server refused the cached ones.
    pub fn needs_credentials(&self) -> bool {
        !self.credentials.as_ref().is_some_and(Credentials::is_valid)
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    pub fn clear_credentials(&mut self) {
        self.credentials = None;
    }

    fn valid_credentials(&self) -> Result<Credentials> {
        match &self.credentials {
            Some(c) if c.is_valid() => Ok(c.clone()),
            _ => Err(Error::Authentication),
        }
    }

    fn invalidate(&mut self) {
        if let Some(c) = self.credentials.as_mut() {
            c.invalidate();
        }
    }

    /// Posts every stored task, calling `progress` after each one, then removes the
    /// tasks that were accepted.
    pub fn sync_all(
        &mut self,
        tasks: &mut TaskStore,
        aliases: &mut AliasRegistry,
        progress: &mut dyn FnMut(&TaskSync),
    ) -> Result<SyncReport> {
        let credentials = self.valid_credentials()?;
        tasks.load()?;
        aliases.load()?;

        let batch: Vec<(String, WorkDuration)> = tasks
            .tasks()
            .iter()
            .map(|(id, record)| (id.clone(), record.duration))
            .collect();
        let mut report = SyncReport::default();

        for (task, duration) in batch {
            if report.aborted.is_some() {
                report.pending.insert(task);
                continue;
            }
            let (issue, comment) = aliases.resolve(&task);
            let seconds = duration.as_secs().max(MIN_WORKLOG_SECS);
            let postable = is_issue_key(&issue);
            let issue = if postable {
                issue.to_ascii_uppercase()
            } else {
                issue
            };
            let status = if postable {
                match self.client.post_work_log(&issue, &comment, seconds, &credentials) {
                    PostOutcome::Created => TaskStatus::Posted,
                    PostOutcome::Unauthorized => TaskStatus::Unauthorized,
                    PostOutcome::Rejected(code) => TaskStatus::Rejected(code),
                    PostOutcome::Transport(msg) => TaskStatus::Unreachable(msg),
                }
            } else {
                TaskStatus::Ambiguous
            };
            let entry = TaskSync {
                task: task.clone(),
                issue,
                seconds,
                status,
            };
            match &entry.status {
                TaskStatus::Posted => {
                    info!("Posted {} seconds for {} to {}", seconds, task, entry.issue);
                    report.succeeded.insert(task);
                }
                TaskStatus::Ambiguous => {
                    warn!("Skipping ambiguous task id {}", task);
                    report.failed.insert(task);
                }
                TaskStatus::Rejected(code) => {
                    warn!("Failed to post data for {} (HTTP {})", task, code);
                    report.failed.insert(task);
                }
                TaskStatus::Unauthorized => {
                    warn!("401 Unauthorized posting {}; aborting sync", task);
                    self.invalidate();
                    report.aborted = Some(SyncAbort::Unauthorized);
                    report.pending.insert(task);
                }
                TaskStatus::Unreachable(msg) => {
                    warn!("Jira unreachable posting {}: {}; aborting sync", task, msg);
                    report.aborted = Some(SyncAbort::Unreachable(msg.clone()));
                    report.pending.insert(task);
                }
            }
            progress(&entry);
        }

        if !report.succeeded.is_empty() {
            let done: Vec<&String> = report.succeeded.iter().collect();
            tasks.remove_all(&done)?;
        }
        report.remaining = tasks.tasks().len();
        Ok(report)
    }

    /// Open issues assigned to the current user. A 401 invalidates the cached credentials.
    pub fn assigned_issues(&mut self) -> Result<Vec<IssueSummary>> {
        let credentials = self.valid_credentials()?;
        match self.client.search_assigned_open_issues(&credentials) {
            SearchOutcome::Found(issues) => Ok(issues),
            SearchOutcome::Unauthorized => {
                self.invalidate();
                Err(Error::Authentication)
            }
            SearchOutcome::Rejected(code) => Err(Error::Remote(format!("HTTP {}", code))),
            SearchOutcome::Transport(msg) => Err(Error::Remote(msg)),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeClient;
    use super::*;
    use crate::store::MemoryRepository;
    use chrono::{Local, TimeZone};

    struct Fixture {
        tasks: TaskStore,
        aliases: AliasRegistry,
        client: FakeClient,
        engine: SyncEngine,
    }

    fn fixture(entries: &[(&str, &str)]) -> Fixture {
        let mut tasks = TaskStore::new(Box::new(MemoryRepository::new()));
        let start = Local.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        for (id, dur) in entries {
            tasks
                .upsert(id, start, WorkDuration::parse(dur).unwrap())
                .unwrap();
        }
        let aliases = AliasRegistry::new(Box::new(MemoryRepository::new()));
        let client = FakeClient::default();
        let mut engine = SyncEngine::new(Box::new(client.clone()));
        engine.set_credentials(Credentials::new("mike", "pw"));
        Fixture {
            tasks,
            aliases,
            client,
            engine,
        }
    }

    fn run(f: &mut Fixture) -> (SyncReport, Vec<TaskSync>) {
        let mut seen = Vec::new();
        let report = f
            .engine
            .sync_all(&mut f.tasks, &mut f.aliases, &mut |e: &TaskSync| seen.push(e.clone()))
            .unwrap();
        (report, seen)
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ambiguous_task_does_not_block_others() {
        let mut f = fixture(&[("OPS-1", "00:10:00"), ("email", "00:20:00"), ("OPS-3", "00:30:00")]);
        f.aliases.add("standup", "OPS-9", "").unwrap();
        let (report, seen) = run(&mut f);
        assert_eq!(report.succeeded, set(&["OPS-1", "OPS-3"]));
        assert_eq!(report.failed, set(&["email"]));
        assert_eq!(report.remaining, 1);
        assert_eq!(f.client.posted_issues(), vec!["OPS-1", "OPS-3"]);
        assert!(f.tasks.get("email").is_some());
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].status, TaskStatus::Ambiguous);
    }

    #[test]
    fn test_alias_resolving_to_malformed_id_fails_alone() {
        let mut f = fixture(&[("a-task", "00:10:00"), ("b-task", "00:10:00"), ("c-task", "00:10:00")]);
        // An alias file edited by hand can hold a key that no longer validates.
        let raw = r#"{
            "a-task": {"issue": "OPS-1", "comment": "first"},
            "b-task": {"issue": "not an issue", "comment": ""},
            "c-task": {"issue": "OPS-3", "comment": "third"}
        }"#;
        let repo = MemoryRepository::with_contents(raw);
        f.aliases.set_repository(Box::new(repo));
        let (report, _) = run(&mut f);
        assert_eq!(report.succeeded, set(&["a-task", "c-task"]));
        assert_eq!(report.failed, set(&["b-task"]));
        let posted = f.client.posted.borrow();
        assert_eq!(posted[0].comment, "first");
        assert_eq!(posted[1].issue, "OPS-3");
    }

    #[test]
    fn test_unauthorized_first_post_removes_nothing() {
        let mut f = fixture(&[("OPS-1", "00:10:00"), ("OPS-2", "00:10:00"), ("OPS-3", "00:10:00")]);
        f.client.respond("OPS-1", PostOutcome::Unauthorized);
        let (report, _) = run(&mut f);
        assert!(report.credentials_rejected());
        assert!(report.succeeded.is_empty());
        assert_eq!(report.pending, set(&["OPS-1", "OPS-2", "OPS-3"]));
        assert_eq!(report.remaining, 3);
        assert_eq!(f.client.posted_issues(), vec!["OPS-1"]);
        assert!(f.engine.needs_credentials());
        let again = f
            .engine
            .sync_all(&mut f.tasks, &mut f.aliases, &mut |_: &TaskSync| {});
        assert!(matches!(again, Err(Error::Authentication)));
    }

    #[test]
    fn test_unauthorized_mid_batch_keeps_earlier_successes() {
        let mut f = fixture(&[("OPS-1", "00:10:00"), ("OPS-2", "00:10:00"), ("OPS-3", "00:10:00")]);
        f.client.respond("OPS-2", PostOutcome::Unauthorized);
        let (report, _) = run(&mut f);
        assert_eq!(report.succeeded, set(&["OPS-1"]));
        assert_eq!(report.pending, set(&["OPS-2", "OPS-3"]));
        assert_eq!(f.tasks.tasks().keys().collect::<Vec<_>>(), vec!["OPS-2", "OPS-3"]);

        f.engine.set_credentials(Credentials::new("mike", "right"));
        f.client.respond("OPS-2", PostOutcome::Created);
        let (report, _) = run(&mut f);
        assert_eq!(report.succeeded, set(&["OPS-2", "OPS-3"]));
        assert_eq!(report.remaining, 0);
    }

    #[test]
    fn test_rejected_task_continues_batch() {
        let mut f = fixture(&[("OPS-1", "00:10:00"), ("OPS-2", "00:10:00")]);
        f.client.respond("OPS-1", PostOutcome::Rejected(400));
        let (report, seen) = run(&mut f);
        assert_eq!(report.failed, set(&["OPS-1"]));
        assert_eq!(report.succeeded, set(&["OPS-2"]));
        assert_eq!(seen[0].status, TaskStatus::Rejected(400));
        assert!(!f.engine.needs_credentials());
    }

    #[test]
    fn test_transport_failure_aborts_batch() {
        let mut f = fixture(&[("OPS-1", "00:10:00"), ("OPS-2", "00:10:00")]);
        f.client.respond("OPS-1", PostOutcome::Transport("timed out".into()));
        let (report, _) = run(&mut f);
        assert_eq!(report.aborted, Some(SyncAbort::Unreachable("timed out".into())));
        assert_eq!(report.pending, set(&["OPS-1", "OPS-2"]));
        assert_eq!(f.client.posted_issues(), vec!["OPS-1"]);
        assert!(!f.engine.needs_credentials());
    }

    #[test]
    fn test_sub_minute_duration_is_clamped() {
        let mut f = fixture(&[("OPS-1", "00:00:10"), ("OPS-2", "01:00:01")]);
        run(&mut f);
        let posted = f.client.posted.borrow();
        assert_eq!(posted[0].seconds, 60);
        assert_eq!(posted[1].seconds, 3601);
        assert_eq!(posted[0].username, "mike");
    }

    #[test]
    fn test_lowercase_alias_issue_is_uppercased() {
        let mut f = fixture(&[("email", "00:05:00")]);
        f.aliases
            .set_repository(Box::new(MemoryRepository::with_contents(
                r#"{"email": {"issue": "ops-5", "comment": "Inbox"}}"#,
            )));
        let (report, _) = run(&mut f);
        assert_eq!(report.succeeded, set(&["email"]));
        assert_eq!(f.client.posted_issues(), vec!["OPS-5"]);
    }

    #[test]
    fn test_issue_like_alias_redirects_issue_like_task() {
        let mut f = fixture(&[("ops-1", "00:10:00")]);
        f.aliases.add("ops-1", "OPS-2", "standup").unwrap();
        let (report, seen) = run(&mut f);
        assert_eq!(report.succeeded, set(&["OPS-1"]));
        assert_eq!(f.client.posted_issues(), vec!["OPS-2"]);
        assert_eq!(f.client.posted.borrow()[0].comment, "standup");
        assert_eq!(seen[0].issue, "OPS-2");
    }

    #[test]
    fn test_sync_requires_credentials() {
        let mut f = fixture(&[("OPS-1", "00:10:00")]);
        f.engine.clear_credentials();
        assert!(f.engine.needs_credentials());
        let res = f.engine.sync_all(&mut f.tasks, &mut f.aliases, &mut |_: &TaskSync| {});
        assert!(matches!(res, Err(Error::Authentication)));
        assert!(f.client.posted_issues().is_empty());
    }

    #[test]
    fn test_assigned_issues_unauthorized_invalidates() {
        let mut f = fixture(&[]);
        *f.client.search.borrow_mut() = Some(SearchOutcome::Unauthorized);
        assert!(matches!(f.engine.assigned_issues(), Err(Error::Authentication)));
        assert!(f.engine.needs_credentials());
    }

    #[test]
    fn test_assigned_issues_found() {
        let mut f = fixture(&[]);
        let issues = vec![IssueSummary {
            key: "OPS-1".into(),
            summary: "Rotate certs".into(),
        }];
        *f.client.search.borrow_mut() = Some(SearchOutcome::Found(issues.clone()));
        assert_eq!(f.engine.assigned_issues().unwrap(), issues);
        *f.client.search.borrow_mut() = Some(SearchOutcome::Rejected(500));
        assert!(matches!(f.engine.assigned_issues(), Err(Error::Remote(_))));
        assert!(!f.engine.needs_credentials());
    }
}

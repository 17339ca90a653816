//! Alias registry: short task names mapped to a Jira issue and a default work-log comment.

use super::{Repository, Snapshot};
use crate::error::{Error, Result};
use crate::issue::{normalize_task_id, parse_issue_key};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    /// Upper-case `LETTERS-DIGITS` issue key.
    pub issue: String,
    #[serde(default)]
    pub comment: String,
}

pub struct AliasRegistry {
    snapshot: Snapshot<BTreeMap<String, AliasRecord>>,
}

impl AliasRegistry {
    pub fn new(repo: Box<dyn Repository>) -> Self {
        AliasRegistry {
            snapshot: Snapshot::new(repo),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.snapshot.path()
    }

    pub fn set_repository(&mut self, repo: Box<dyn Repository>) {
        self.snapshot.set_repository(repo);
    }

    pub fn load(&mut self) -> Result<()> {
        self.snapshot.reload()
    }

    pub fn save(&self) -> Result<()> {
        self.snapshot.save()
    }

    pub fn aliases(&self) -> &BTreeMap<String, AliasRecord> {
        self.snapshot.data()
    }

    /// Alias names are keyed like task ids, so `ops-1` and `OPS-1` are the same alias.
    pub fn get(&self, alias: &str) -> Option<&AliasRecord> {
        self.snapshot.data().get(&normalize_task_id(alias))
    }

    /// Maps `alias` to `issue` (validated, upper-cased), replacing any previous mapping.
    /// The comment's words are re-joined with single spaces.
    pub fn add(&mut self, alias: &str, issue: &str, comment: &str) -> Result<AliasRecord> {
        let issue = parse_issue_key(issue)?;
        let record = AliasRecord {
            issue,
            comment: comment.split_whitespace().collect::<Vec<_>>().join(" "),
        };
        self.load()?;
        self.snapshot
            .data_mut()
            .insert(normalize_task_id(alias), record.clone());
        self.save()?;
        Ok(record)
    }

    /// Deletes an alias. Confirmation is the caller's job.
    pub fn remove(&mut self, alias: &str) -> Result<AliasRecord> {
        let alias = normalize_task_id(alias);
        self.load()?;
        let removed = self
            .snapshot
            .data_mut()
            .remove(&alias)
            .ok_or(Error::NotFound {
                kind: "Alias",
                name: alias,
            })?;
        self.save()?;
        Ok(removed)
    }

    /// The issue and comment a task posts to: its alias if one exists, otherwise the task
    /// id itself with no comment. The issue is not validated here.
    pub fn resolve(&self, task_id: &str) -> (String, String) {
        match self.get(task_id) {
            Some(record) => (record.issue.clone(), record.comment.clone()),
            None => (task_id.to_string(), String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileRepository, MemoryRepository};

    #[test]
    fn test_add_normalizes_issue_and_comment() {
        let mut reg = AliasRegistry::new(Box::new(MemoryRepository::new()));
        let rec = reg.add("email", "cisops-1125", "  Daily   emails ").unwrap();
        assert_eq!(rec.issue, "CISOPS-1125");
        assert_eq!(rec.comment, "Daily emails");
        assert_eq!(reg.get("email"), Some(&rec));
    }

    #[test]
    fn test_add_rejects_bad_issue() {
        let repo = MemoryRepository::new();
        let mut reg = AliasRegistry::new(Box::new(repo.clone()));
        assert!(matches!(reg.add("email", "emails", ""), Err(Error::Validation { .. })));
        assert!(repo.contents().is_none());
    }

    #[test]
    fn test_resolve_falls_back_to_task_id() {
        let mut reg = AliasRegistry::new(Box::new(MemoryRepository::new()));
        reg.add("email", "OPS-7", "Inbox").unwrap();
        assert_eq!(reg.resolve("email"), ("OPS-7".to_string(), "Inbox".to_string()));
        assert_eq!(reg.resolve("OPS-9"), ("OPS-9".to_string(), String::new()));
        assert_eq!(reg.resolve("lunch"), ("lunch".to_string(), String::new()));
    }

    #[test]
    fn test_issue_like_alias_names_are_normalized() {
        let mut reg = AliasRegistry::new(Box::new(MemoryRepository::new()));
        reg.add("ops-1", "OPS-2", "standup").unwrap();
        assert!(reg.aliases().contains_key("OPS-1"));
        assert_eq!(reg.resolve("OPS-1"), ("OPS-2".to_string(), "standup".to_string()));
        assert_eq!(reg.remove("Ops-1").unwrap().issue, "OPS-2");
    }

    #[test]
    fn test_remove() {
        let mut reg = AliasRegistry::new(Box::new(MemoryRepository::new()));
        reg.add("email", "OPS-7", "").unwrap();
        assert!(matches!(reg.remove("mail"), Err(Error::NotFound { .. })));
        assert_eq!(reg.remove("email").unwrap().issue, "OPS-7");
        assert!(reg.aliases().is_empty());
    }

    #[test]
    fn test_aliases_persist_separately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timey_alias.json");
        let mut reg = AliasRegistry::new(Box::new(FileRepository::new(&path)));
        reg.add("standup", "OPS-3", "Daily standup").unwrap();

        let mut reopened = AliasRegistry::new(Box::new(FileRepository::new(&path)));
        reopened.load().unwrap();
        assert_eq!(reopened.get("standup").unwrap().comment, "Daily standup");
    }
}

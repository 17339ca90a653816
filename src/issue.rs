//! Jira issue keys (`LETTERS-DIGITS`) and task-name normalization.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static ISSUE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]+-[0-9]+$").expect("valid regex"));

/// True if `s` looks like a Jira issue key, in any case.
pub fn is_issue_key(s: &str) -> bool {
    ISSUE_KEY.is_match(s)
}

/// Upper-cases names shaped like issue keys so `cisops-42` and `CISOPS-42` share one record;
/// anything else is kept verbatim.
pub fn normalize_task_id(name: &str) -> String {
    let name = name.trim();
    if is_issue_key(name) {
        name.to_ascii_uppercase()
    } else {
        name.to_string()
    }
}

/// Validates and upper-cases an issue key.
pub fn parse_issue_key(s: &str) -> Result<String> {
    let s = s.trim();
    if is_issue_key(s) {
        Ok(s.to_ascii_uppercase())
    } else {
        Err(Error::Validation { id: s.to_string() })
    }
}

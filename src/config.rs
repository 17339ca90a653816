//! Startup configuration: command-line flags with environment fallbacks.

use crate::error::Result;
use crate::logging::{self, DEFAULT_LOG_LEVEL};
use crate::remote::{DEFAULT_JIRA_URL, DEFAULT_TIMEOUT_SECS};
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default directory under `$HOME` for the store files.
const DEFAULT_DATA_DIR: &str = ".timey";
const DATA_FILE_NAME: &str = "timey_data.json";
const ALIAS_FILE_NAME: &str = "timey_alias.json";

/// Interactive time tracker that posts work logs to Jira.
#[derive(Parser, Debug, Clone)]
#[command(name = "timey", version, about)]
pub struct Cli {
    /// Base URL of the Jira server.
    #[arg(long, env = "TIMEY_JIRA_URL", default_value = DEFAULT_JIRA_URL)]
    pub jira_url: String,

    /// Task duration store [default: $HOME/.timey/timey_data.json]
    #[arg(long, env = "TIMEY_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// Alias store [default: $HOME/.timey/timey_alias.json]
    #[arg(long, env = "TIMEY_ALIAS_FILE")]
    pub alias_file: Option<PathBuf>,

    /// error, warn, info, debug or trace.
    #[arg(long, env = "TIMEY_LOG", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "TIMEY_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

/// Resolved settings the application runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub jira_url: String,
    pub data_file: PathBuf,
    pub alias_file: PathBuf,
    pub log_level: String,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let dir = data_dir();
        Config {
            jira_url: DEFAULT_JIRA_URL.to_string(),
            data_file: dir.join(DATA_FILE_NAME),
            alias_file: dir.join(ALIAS_FILE_NAME),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Fills unset paths with defaults and validates the log level.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let defaults = Config::default();
        Ok(Config {
            jira_url: cli.jira_url.trim().to_string(),
            data_file: cli.data_file.unwrap_or(defaults.data_file),
            alias_file: cli.alias_file.unwrap_or(defaults.alias_file),
            log_level: logging::parse_level(&cli.log_level)?.to_string(),
            timeout: Duration::from_secs(cli.timeout_secs.max(1)),
        })
    }
}

/// `$HOME/.timey`, or `./.timey` if `HOME` is unset.
fn data_dir() -> PathBuf {
    env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DATA_DIR)
}

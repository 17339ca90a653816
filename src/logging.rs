//! tracing setup with a level that can be changed while the shell runs.

use crate::error::{Error, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

pub const DEFAULT_LOG_LEVEL: &str = "warn";
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Normalizes a user-supplied level name. `warning` and `critical` are accepted for
/// `warn` and `error`.
pub fn parse_level(s: &str) -> Result<&'static str> {
    let lower = s.trim().to_ascii_lowercase();
    let name = match lower.as_str() {
        "warning" => "warn",
        "critical" => "error",
        other => other,
    };
    LEVELS
        .iter()
        .copied()
        .find(|l| *l == name)
        .ok_or_else(|| Error::Config(format!("Available levels: {}", LEVELS.join(", "))))
}

/// Current log level plus the handle that applies changes to the live subscriber.
pub struct LogControl {
    level: String,
    handle: Option<reload::Handle<EnvFilter, Registry>>,
}

impl LogControl {
    /// A control not attached to any subscriber; level changes are only recorded.
    #[cfg(test)]
    pub fn detached(level: &str) -> Self {
        LogControl {
            level: level.to_string(),
            handle: None,
        }
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    /// Applies a new level and returns the old one.
    pub fn set_level(&mut self, level: &str) -> Result<String> {
        let level = parse_level(level)?;
        if let Some(handle) = &self.handle {
            handle
                .reload(EnvFilter::new(level))
                .map_err(|e| Error::Config(format!("cannot change log level: {}", e)))?;
        }
        Ok(std::mem::replace(&mut self.level, level.to_string()))
    }
}

/// Installs the global subscriber writing to stderr. `RUST_LOG` overrides `level` at startup.
pub fn init(level: &str) -> Result<LogControl> {
    let level = parse_level(level)?;
    let (filter, effective) = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            let shown = filter.to_string();
            (filter, shown)
        }
        Err(_) => (EnvFilter::new(level), level.to_string()),
    };
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| Error::Config(format!("cannot initialize logging: {}", e)))?;
    Ok(LogControl {
        level: effective,
        handle: Some(handle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG").unwrap(), "debug");
        assert_eq!(parse_level("Warning").unwrap(), "warn");
        assert_eq!(parse_level("critical").unwrap(), "error");
        assert!(matches!(parse_level("loud"), Err(Error::Config(_))));
    }

    #[test]
    fn test_detached_set_level_returns_old() {
        let mut log = LogControl::detached("warn");
        assert_eq!(log.set_level("INFO").unwrap(), "warn");
        assert_eq!(log.level(), "info");
        assert!(log.set_level("verbose").is_err());
        assert_eq!(log.level(), "info");
    }
}

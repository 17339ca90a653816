//! Error taxonomy for timey commands.

use std::path::PathBuf;
use thiserror::Error;

/// Every way a timey operation can fail.
///
/// Only [`Error::Persistence`] is fatal: the shell answers it by committing the
/// active session and exiting. All other variants are reported and the loop continues.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed duration or time input.
    #[error("Invalid time \"{input}\". Time must be in the format hh:mm:ss.")]
    Format { input: String },

    /// Malformed issue id.
    #[error("Invalid format for Jira story \"{id}\". Expected LETTERS-DIGITS, e.g. CISOPS-42.")]
    Validation { id: String },

    /// Deleting or removing something that does not exist.
    #[error("{kind} \"{name}\" could not be found")]
    NotFound { kind: &'static str, name: String },

    /// The store file exists but cannot be read or written.
    #[error("cannot access {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote service answered 401.
    #[error("401 Unauthorized. Please check your credentials.")]
    Authentication,

    /// Any other remote failure.
    #[error("Jira request failed: {0}")]
    Remote(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True when the error must trigger the commit-then-exit path.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Persistence { .. })
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Persistence {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

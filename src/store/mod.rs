//! Whole-file snapshot persistence shared by the task store and the alias registry.
//!
//! Each store is one JSON object in one file. The file is the source of truth: it is
//! re-read before every read or mutation and rewritten in full after every mutation.
//!
//! - missing file → an empty file is created and the store starts empty
//! - empty or unparsable file → the store starts empty (logged at debug level)
//! - any other I/O failure → [`Error::Persistence`](crate::error::Error::Persistence)

pub mod aliases;
pub mod tasks;

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::debug;

pub use aliases::{AliasRecord, AliasRegistry};
#[cfg(test)]
pub use memory::MemoryRepository;
pub use tasks::{TaskRecord, TaskStore};

/// Raw byte storage behind a snapshot.
pub trait Repository {
    /// Where the bytes live; used in messages.
    fn path(&self) -> PathBuf;
    /// `Ok(None)` when nothing has been stored yet.
    fn read(&self) -> io::Result<Option<Vec<u8>>>;
    fn create_empty(&self) -> io::Result<()>;
    fn write(&self, bytes: &[u8]) -> io::Result<()>;
}

/// Snapshot file on disk. Writes go to `<file>.tmp` and are renamed into place.
#[derive(Clone, Debug)]
pub struct FileRepository {
    path: PathBuf,
}

impl FileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileRepository { path: path.into() }
    }

    fn ensure_parent(&self) -> io::Result<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Repository for FileRepository {
    fn path(&self) -> PathBuf {
        self.path.clone()
    }

    fn read(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_empty(&self) -> io::Result<()> {
        self.ensure_parent()?;
        fs::File::create(&self.path).map(|_| ())
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        self.ensure_parent()?;
        let tmp = self.tmp_path();
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)
    }
}


/// One mapping persisted as a whole through a [`Repository`].
pub struct Snapshot<T> {
    repo: Box<dyn Repository>,
    data: T,
}

impl<T: Serialize + DeserializeOwned + Default> Snapshot<T> {
    pub fn new(repo: Box<dyn Repository>) -> Self {
        Snapshot {
            repo,
            data: T::default(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.repo.path()
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    /// Points the snapshot at a different repository; the next reload reads from it.
    pub fn set_repository(&mut self, repo: Box<dyn Repository>) {
        self.repo = repo;
        self.data = T::default();
    }

    /// Replaces the in-memory data with what the repository holds.
    pub fn reload(&mut self) -> Result<()> {
        self.data = load_snapshot(self.repo.as_ref())?;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        save_snapshot(self.repo.as_ref(), &self.data)
    }
}

fn load_snapshot<T: DeserializeOwned + Default>(repo: &dyn Repository) -> Result<T> {
    let path = repo.path();
    debug!("Loading from file: {}", path.display());
    let bytes = match repo.read() {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            repo.create_empty()
                .map_err(|e| Error::persistence(&path, e))?;
            debug!("Creating empty file {}. Creating empty data set", path.display());
            return Ok(T::default());
        }
        Err(e) => return Err(Error::persistence(&path, e)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    match serde_json::from_slice(&bytes) {
        Ok(data) => Ok(data),
        Err(e) => {
            debug!("Discarding unreadable data in {}: {}", path.display(), e);
            Ok(T::default())
        }
    }
}

fn save_snapshot<T: Serialize>(repo: &dyn Repository, data: &T) -> Result<()> {
    let path = repo.path();
    let mut bytes = serde_json::to_vec_pretty(data)
        .map_err(|e| Error::persistence(&path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
    bytes.push(b'\n');
    repo.write(&bytes).map_err(|e| Error::persistence(&path, e))
}

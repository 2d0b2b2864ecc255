use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage directory unusable: {0}")]
    Directory(String),
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Durable key-value store: one file per key inside a directory.
///
/// Values are replaced whole by writing a temp file and renaming it over the
/// old one, so readers see either the previous or the new value.
#[derive(Debug, Clone)]
pub struct DurableDir {
    dir: PathBuf,
}

impl DurableDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn put(&self, key: &str, value: &str) -> Result<PathBuf, PersistError> {
        let target = self.path_for(key)?;
        self.ensure_dir()?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }

    /// `None` when nothing was ever stored under `key`.
    pub fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        let target = self.path_for(key)?;
        match fs::read_to_string(&target) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Removing a missing key is not an error.
    pub fn remove(&self, key: &str) -> Result<(), PersistError> {
        let target = self.path_for(key)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(PersistError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn ensure_dir(&self) -> Result<(), PersistError> {
        if self.dir.exists() {
            if !self.dir.is_dir() {
                return Err(PersistError::Directory(format!(
                    "{} is not a directory",
                    self.dir.display()
                )));
            }
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| PersistError::Directory(e.to_string()))
    }
}

// src/run/store.rs

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{LaunchError, Result};
use crate::fs::FileSystem;

/// The implementation cache, seen from the launcher: find a cached
/// implementation by id, or add a freshly fetched one.
pub trait ImplementationStore: Debug {
    /// Directory holding implementation `id`.
    fn lookup(&self, id: &str) -> Result<PathBuf>;

    fn is_cached(&self, id: &str) -> bool {
        self.lookup(id).is_ok()
    }

    /// Move the fetched tree at `staged` into the store as `id` and return
    /// its new location. Committing an id that is already cached leaves
    /// the store unchanged.
    fn commit(&self, id: &str, staged: &Path) -> Result<PathBuf>;
}

/// Store made of plain directories, searched in order. Commits go to the
/// first one.
#[derive(Debug, Clone)]
pub struct DirStore {
    fs: Arc<dyn FileSystem>,
    dirs: Vec<PathBuf>,
}

impl DirStore {
    pub fn new(fs: Arc<dyn FileSystem>, dirs: Vec<PathBuf>) -> Self {
        Self { fs, dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

fn check_id(id: &str) -> Result<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains('/') {
        return Err(LaunchError::Selections(format!(
            "'{id}' is not a valid implementation id"
        )));
    }
    Ok(())
}

impl ImplementationStore for DirStore {
    fn lookup(&self, id: &str) -> Result<PathBuf> {
        check_id(id)?;
        self.dirs
            .iter()
            .map(|dir| dir.join(id))
            .find(|candidate| self.fs.is_dir(candidate))
            .ok_or_else(|| LaunchError::NotStored(id.to_string()))
    }

    fn commit(&self, id: &str, staged: &Path) -> Result<PathBuf> {
        check_id(id)?;
        if let Ok(existing) = self.lookup(id) {
            debug!(id, path = %existing.display(), "already cached; not committing");
            return Ok(existing);
        }

        let Some(first) = self.dirs.first() else {
            return Err(LaunchError::ConfigError(
                "no store directories configured".to_string(),
            ));
        };
        let target = first.join(id);
        self.fs.create_dir_all(first)?;
        self.fs.rename(staged, &target)?;
        info!(id, path = %target.display(), "implementation added to store");
        Ok(target)
    }
}

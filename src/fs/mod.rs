// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

pub mod mock;

/// Abstract filesystem interface used by the store, the trust database and
/// entry-point resolution.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    /// Replace the contents of `path`, creating parent directories.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    /// Move a file or directory tree. `to` must not exist yet.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }

        // Write next to the target, then rename over it, so a crash never
        // leaves a truncated file behind.
        let mut tmp = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => tempfile::NamedTempFile::new_in(parent),
            _ => tempfile::NamedTempFile::new_in("."),
        }
        .with_context(|| format!("creating temporary file for {:?}", path))?;
        tmp.write_all(contents)
            .with_context(|| format!("writing to file {:?}", path))?;
        tmp.persist(path)
            .with_context(|| format!("replacing file {:?}", path))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if to.exists() {
            anyhow::bail!("refusing to replace existing {:?}", to);
        }
        fs::rename(from, to).with_context(|| format!("moving {:?} to {:?}", from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_replaces_contents_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/trust.toml");
        let fs = RealFileSystem;

        fs.write(&path, b"first").unwrap();
        fs.write(&path, b"second").unwrap();

        assert_eq!(fs.read_to_string(&path).unwrap(), "second");
        assert!(fs.is_file(&path));
    }

    #[test]
    fn rename_refuses_to_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let fs = RealFileSystem;
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs.create_dir_all(&a).unwrap();
        fs.create_dir_all(&b).unwrap();

        assert!(fs.rename(&a, &b).is_err());
        fs.rename(&a, &dir.path().join("c")).unwrap();
        assert!(!fs.exists(&a));
        assert!(fs.is_dir(&dir.path().join("c")));
    }
}

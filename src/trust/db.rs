// src/trust/db.rs

//! Persistent record of which keys are trusted for which domains.
//!
//! Stored as TOML:
//!
//! ```toml
//! [keys."92429807C9853C0744A68B9AAE07828059A53CC1"]
//! domains = ["example.com", "0install.net"]
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{LaunchError, Result};
use crate::fs::FileSystem;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrustFile {
    #[serde(default)]
    keys: BTreeMap<String, KeyEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyEntry {
    #[serde(default)]
    domains: BTreeSet<String>,
}

type Watcher = Box<dyn Fn()>;

pub struct TrustDb {
    fs: Arc<dyn FileSystem>,
    /// `None` for an in-memory database that is never saved.
    path: Option<PathBuf>,
    keys: RefCell<BTreeMap<String, BTreeSet<String>>>,
    watchers: RefCell<Vec<Watcher>>,
}

impl TrustDb {
    /// Load the database at `path`. A missing file is an empty database.
    pub fn load(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let keys = if fs.exists(&path) {
            let text = fs.read_to_string(&path)?;
            let file: TrustFile = toml::from_str(&text).map_err(|e| {
                LaunchError::ConfigError(format!("trust database {}: {e}", path.display()))
            })?;
            file.keys
                .into_iter()
                .map(|(key, entry)| (key, entry.domains))
                .collect()
        } else {
            debug!(path = %path.display(), "no trust database yet");
            BTreeMap::new()
        };

        Ok(Self {
            fs,
            path: Some(path),
            keys: RefCell::new(keys),
            watchers: RefCell::new(Vec::new()),
        })
    }

    pub fn in_memory(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            path: None,
            keys: RefCell::new(BTreeMap::new()),
            watchers: RefCell::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_trusted(&self, fingerprint: &str, domain: &str) -> bool {
        self.keys
            .borrow()
            .get(fingerprint)
            .is_some_and(|domains| domains.contains(domain))
    }

    /// Domains `fingerprint` is trusted for.
    pub fn domains_for(&self, fingerprint: &str) -> Vec<String> {
        self.keys
            .borrow()
            .get(fingerprint)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Trust `fingerprint` for `domain`. Returns whether anything changed;
    /// the database is saved only when it did.
    pub fn trust_key(&self, fingerprint: &str, domain: &str) -> Result<bool> {
        let added = self
            .keys
            .borrow_mut()
            .entry(fingerprint.to_string())
            .or_default()
            .insert(domain.to_string());

        if added {
            if let Err(err) = self.save() {
                self.forget(fingerprint, domain);
                return Err(err);
            }
            info!(fingerprint, domain, "key trusted");
        } else {
            debug!(fingerprint, domain, "key already trusted");
        }
        Ok(added)
    }

    pub fn untrust_key(&self, fingerprint: &str, domain: &str) -> Result<bool> {
        let removed = self.forget(fingerprint, domain);

        if removed {
            if let Err(err) = self.save() {
                self.keys
                    .borrow_mut()
                    .entry(fingerprint.to_string())
                    .or_default()
                    .insert(domain.to_string());
                return Err(err);
            }
            info!(fingerprint, domain, "key no longer trusted");
        }
        Ok(removed)
    }

    /// Drop the in-memory grant only; the caller decides about saving.
    fn forget(&self, fingerprint: &str, domain: &str) -> bool {
        let mut keys = self.keys.borrow_mut();
        let removed = keys
            .get_mut(fingerprint)
            .is_some_and(|domains| domains.remove(domain));
        if keys.get(fingerprint).is_some_and(BTreeSet::is_empty) {
            keys.remove(fingerprint);
        }
        removed
    }

    /// Register a callback run by [`notify`](Self::notify).
    pub fn watch(&self, watcher: impl Fn() + 'static) {
        self.watchers.borrow_mut().push(Box::new(watcher));
    }

    /// Tell watchers that trust grants changed.
    pub fn notify(&self) {
        let watchers = self.watchers.borrow();
        debug!(watchers = watchers.len(), "notifying trust watchers");
        for watcher in watchers.iter() {
            watcher();
        }
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = TrustFile {
            keys: self
                .keys
                .borrow()
                .iter()
                .map(|(key, domains)| {
                    (
                        key.clone(),
                        KeyEntry {
                            domains: domains.clone(),
                        },
                    )
                })
                .collect(),
        };
        let text = toml::to_string_pretty(&file)
            .map_err(|e| LaunchError::Internal(format!("serializing trust database: {e}")))?;
        self.fs.write(path, text.as_bytes())?;
        debug!(path = %path.display(), "trust database saved");
        Ok(())
    }
}

impl fmt::Debug for TrustDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustDb")
            .field("path", &self.path)
            .field("keys", &self.keys.borrow())
            .finish_non_exhaustive()
    }
}

/// Trust domain of an interface URI: its network location.
pub fn domain_from_url(url: &str) -> Result<String> {
    let rest = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or("");
    let netloc = rest.split(['/', '?', '#']).next().unwrap_or("");

    if netloc.is_empty() || netloc == "*" {
        return Err(LaunchError::BadDomain(url.to_string()));
    }
    Ok(netloc.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use std::cell::Cell;
    use std::rc::Rc;

    const FPR: &str = "92429807C9853C0744A68B9AAE07828059A53CC1";

    #[test]
    fn domains_are_network_locations() {
        assert_eq!(
            domain_from_url("http://example.com/feeds/app.xml").unwrap(),
            "example.com"
        );
        assert_eq!(
            domain_from_url("https://example.com:8080/x").unwrap(),
            "example.com:8080"
        );
        assert!(matches!(
            domain_from_url("/local/feed.xml"),
            Err(LaunchError::BadDomain(_))
        ));
        assert!(domain_from_url("http://*/x").is_err());
    }

    #[test]
    fn grants_persist_across_loads() {
        let fs = Arc::new(MockFileSystem::new());
        let path = Path::new("/config/trust.toml");

        let db = TrustDb::load(fs.clone(), path).unwrap();
        assert!(db.trust_key(FPR, "example.com").unwrap());
        assert!(!db.trust_key(FPR, "example.com").unwrap());

        let reloaded = TrustDb::load(fs.clone(), path).unwrap();
        assert!(reloaded.is_trusted(FPR, "example.com"));
        assert!(!reloaded.is_trusted(FPR, "other.org"));
        assert_eq!(reloaded.domains_for(FPR), vec!["example.com".to_string()]);
    }

    #[test]
    fn untrusting_the_last_domain_forgets_the_key() {
        let fs = Arc::new(MockFileSystem::new());
        let db = TrustDb::load(fs.clone(), "/trust.toml").unwrap();
        db.trust_key(FPR, "example.com").unwrap();

        assert!(db.untrust_key(FPR, "example.com").unwrap());
        assert!(!db.untrust_key(FPR, "example.com").unwrap());
        let text = String::from_utf8(fs.contents("/trust.toml").unwrap()).unwrap();
        assert!(!text.contains(FPR), "{text}");
    }

    #[test]
    fn notify_runs_every_watcher() {
        let db = TrustDb::in_memory(Arc::new(MockFileSystem::new()));
        let calls = Rc::new(Cell::new(0));
        for _ in 0..2 {
            let calls = Rc::clone(&calls);
            db.watch(move || calls.set(calls.get() + 1));
        }

        db.notify();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn failed_save_leaves_the_key_untrusted() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let db = TrustDb::load(Arc::new(crate::fs::RealFileSystem), blocker.join("trust.toml"))
            .unwrap();

        assert!(db.trust_key(FPR, "example.com").is_err());
        assert!(!db.is_trusted(FPR, "example.com"));
        assert!(db.domains_for(FPR).is_empty());
    }
}

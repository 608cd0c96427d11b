// src/run/env.rs

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

/// Snapshot of a process environment that bindings are applied to.
///
/// The launcher hands it to the child as its complete environment; this
/// process's own environment is never modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnv {
    vars: BTreeMap<OsString, OsString>,
}

impl ProcessEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current process environment.
    pub fn from_current() -> Self {
        std::env::vars_os().collect()
    }

    pub fn get(&self, name: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars.get(name.as_ref()).map(OsString::as_os_str)
    }

    pub fn set(&mut self, name: impl Into<OsString>, value: impl Into<OsString>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: impl AsRef<OsStr>) -> Option<OsString> {
        self.vars.remove(name.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl FromIterator<(OsString, OsString)> for ProcessEnv {
    fn from_iter<I: IntoIterator<Item = (OsString, OsString)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

// src/selections/model.rs

use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{LaunchError, Result};
use crate::selections::binding::Binding;

/// Prefix marking an implementation provided by the host's package manager.
pub const PACKAGE_PREFIX: &str = "package:";

/// A complete, already-resolved set of implementation choices.
///
/// Keyed by interface URI; `interface` names the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selections {
    pub interface: String,
    selections: BTreeMap<String, Selection>,
}

impl Selections {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            selections: BTreeMap::new(),
        }
    }

    /// Add (or replace) the selection for `selection.interface`.
    pub fn insert(&mut self, selection: Selection) {
        self.selections
            .insert(selection.interface.clone(), selection);
    }

    pub fn get(&self, interface: &str) -> Option<&Selection> {
        self.selections.get(interface)
    }

    /// Like [`get`](Self::get), but a missing selection is an error.
    pub fn require(&self, interface: &str) -> Result<&Selection> {
        self.get(interface)
            .ok_or_else(|| LaunchError::MissingSelection(interface.to_string()))
    }

    pub fn root(&self) -> Result<&Selection> {
        self.require(&self.interface)
    }

    /// All selections, ordered by interface URI.
    pub fn iter(&self) -> impl Iterator<Item = &Selection> {
        self.selections.values()
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Check that the root exists, every dependency names a selection and
    /// the dependency graph is acyclic.
    pub fn validate(&self) -> Result<()> {
        crate::selections::graph::binding_order(self).map(|_| ())
    }
}

/// One resolved implementation for one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub interface: String,
    /// Managed cache id, absolute local path, or `package:` marker.
    pub id: String,
    pub version: Option<String>,
    /// Entry point relative to the implementation root.
    pub main: Option<String>,
    pub bindings: Vec<Binding>,
    pub dependencies: Vec<Dependency>,
    /// Archive to fetch when the implementation is not cached.
    pub source: Option<String>,
}

impl Selection {
    pub fn new(interface: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            id: id.into(),
            version: None,
            main: None,
            bindings: Vec::new(),
            dependencies: Vec::new(),
            source: None,
        }
    }

    pub fn is_package(&self) -> bool {
        self.id.starts_with(PACKAGE_PREFIX)
    }

    /// For implementations that live at a fixed place outside the store.
    pub fn local_path(&self) -> Option<&Path> {
        self.id.starts_with('/').then(|| Path::new(&self.id))
    }
}

/// An edge from one selection to another, with bindings applied to the
/// dependency's implementation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub interface: String,
    pub bindings: Vec<Binding>,
}

impl Dependency {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            bindings: Vec::new(),
        }
    }
}

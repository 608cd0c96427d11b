#![allow(dead_code)]

use std::path::{Path, PathBuf};

use zlaunch::config::{ConfigFile, RawConfigFile};
use zlaunch::selections::{Dependency, EnvironmentBinding, Selection, Selections};
use zlaunch::types::TrustPolicy;

/// Builder for `ConfigFile` with every path under `root`, so tests never
/// touch the per-user directories.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(root: &Path) -> Self {
        let mut config = RawConfigFile::default();
        config.store.dirs = vec![root.join("store")];
        config.store.staging_dir = Some(root.join("staging"));
        config.trust.db = Some(root.join("trust.toml"));
        Self { config }
    }

    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.store.dirs.push(dir.into());
        self
    }

    pub fn with_wrapper(mut self, wrapper: &str) -> Self {
        self.config.launch.wrapper = Some(wrapper.to_string());
        self
    }

    pub fn with_sandbox(mut self, sandbox: &str) -> Self {
        self.config.launch.sandbox = Some(sandbox.to_string());
        self
    }

    pub fn with_fetch_command(mut self, command: &str) -> Self {
        self.config.fetch.command = command.to_string();
        self
    }

    pub fn with_trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.config.trust.policy = policy;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for a validated `Selections` document.
pub struct SelectionsBuilder {
    sels: Selections,
}

impl SelectionsBuilder {
    pub fn new(root_interface: &str) -> Self {
        Self {
            sels: Selections::new(root_interface),
        }
    }

    pub fn with(mut self, selection: SelectionBuilder) -> Self {
        self.sels.insert(selection.build());
        self
    }

    pub fn build(self) -> Selections {
        self.sels
            .validate()
            .expect("Failed to build valid selections from builder");
        self.sels
    }
}

/// Builder for one `Selection`.
pub struct SelectionBuilder {
    sel: Selection,
}

impl SelectionBuilder {
    pub fn new(interface: &str, id: &str) -> Self {
        Self {
            sel: Selection::new(interface, id),
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.sel.version = Some(version.to_string());
        self
    }

    pub fn main(mut self, main: &str) -> Self {
        self.sel.main = Some(main.to_string());
        self
    }

    pub fn source(mut self, url: &str) -> Self {
        self.sel.source = Some(url.to_string());
        self
    }

    pub fn binding(mut self, binding: EnvironmentBinding) -> Self {
        self.sel.bindings.push(binding.into());
        self
    }

    pub fn requires(mut self, interface: &str, bindings: Vec<EnvironmentBinding>) -> Self {
        let mut dep = Dependency::new(interface);
        dep.bindings = bindings.into_iter().map(Into::into).collect();
        self.sel.dependencies.push(dep);
        self
    }

    pub fn build(self) -> Selection {
        self.sel
    }
}

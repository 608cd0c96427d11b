// src/selections/binding.rs

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::errors::LaunchError;

/// Separator used when a binding doesn't name one.
pub const DEFAULT_SEPARATOR: &str = ":";

/// Values assumed for well-known search paths when they are unset.
const BUILTIN_DEFAULTS: &[(&str, &str)] = &[
    ("PATH", "/bin:/usr/bin"),
    ("XDG_CONFIG_DIRS", "/etc/xdg"),
    ("XDG_DATA_DIRS", "/usr/local/share:/usr/share"),
];

/// Built-in fallback for `name`, if it is a well-known search path.
pub fn builtin_default(name: &str) -> Option<&'static str> {
    BUILTIN_DEFAULTS
        .iter()
        .find(|(var, _)| *var == name)
        .map(|(_, value)| *value)
}

/// A rule mutating the child process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Environment(EnvironmentBinding),
}

impl Binding {
    /// Name of the environment variable this binding controls.
    pub fn name(&self) -> &str {
        match self {
            Binding::Environment(env) => &env.name,
        }
    }

    /// New value of the variable, given the implementation `path` and the
    /// variable's current value.
    pub fn apply(&self, path: &Path, prior: Option<&OsStr>) -> OsString {
        match self {
            Binding::Environment(env) => env.apply(path, prior),
        }
    }
}

impl From<EnvironmentBinding> for Binding {
    fn from(binding: EnvironmentBinding) -> Self {
        Binding::Environment(binding)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BindingMode {
    #[default]
    Prepend,
    Append,
    Replace,
}

impl BindingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingMode::Prepend => "prepend",
            BindingMode::Append => "append",
            BindingMode::Replace => "replace",
        }
    }
}

impl fmt::Display for BindingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindingMode {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prepend" => Ok(BindingMode::Prepend),
            "append" => Ok(BindingMode::Append),
            "replace" => Ok(BindingMode::Replace),
            other => Err(LaunchError::Selections(format!(
                "unknown binding mode '{other}' (expected prepend, append or replace)"
            ))),
        }
    }
}

/// Where the bound value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSource {
    /// A path relative to the implementation directory.
    Insert(String),
    /// A literal value.
    Value(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentBinding {
    pub name: String,
    pub source: BindingSource,
    pub mode: BindingMode,
    pub separator: String,
    /// Used instead of the built-in default when the variable is unset.
    pub default: Option<String>,
}

impl EnvironmentBinding {
    pub fn insert(name: impl Into<String>, insert: impl Into<String>) -> Self {
        Self::new(name.into(), BindingSource::Insert(insert.into()))
    }

    pub fn value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name.into(), BindingSource::Value(value.into()))
    }

    fn new(name: String, source: BindingSource) -> Self {
        Self {
            name,
            source,
            mode: BindingMode::default(),
            separator: DEFAULT_SEPARATOR.to_string(),
            default: None,
        }
    }

    pub fn with_mode(mut self, mode: BindingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// New value for the variable given the implementation `path` and the
    /// variable's current value.
    pub fn apply(&self, path: &Path, prior: Option<&OsStr>) -> OsString {
        let extra: OsString = match &self.source {
            BindingSource::Insert(insert) => path.join(insert).into_os_string(),
            BindingSource::Value(value) => value.into(),
        };

        if self.mode == BindingMode::Replace {
            return extra;
        }

        let prior: Option<OsString> = prior
            .map(OsStr::to_os_string)
            .or_else(|| self.default.as_deref().map(OsString::from))
            .or_else(|| builtin_default(&self.name).map(OsString::from));

        let Some(prior) = prior else {
            return extra;
        };

        let (first, second) = match self.mode {
            BindingMode::Append => (prior, extra),
            _ => (extra, prior),
        };
        let mut joined = first;
        joined.push(&self.separator);
        joined.push(second);
        joined
    }
}

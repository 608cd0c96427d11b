// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::types::TrustPolicy;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [launch]
/// wrapper = "valgrind --quiet"
/// sandbox = "firejail --quiet --"
/// launcher = "zlaunch"
///
/// [store]
/// dirs = ["/var/cache/zlaunch/implementations"]
/// staging_dir = "/var/cache/zlaunch/staging"
///
/// [fetch]
/// command = "curl -fsSL \"$ZLAUNCH_URL\" | tar -xz -C \"$ZLAUNCH_DEST\""
///
/// [trust]
/// db = "/etc/zlaunch/trust.toml"
/// policy = "ask"
/// ```
///
/// All sections are optional; unset paths fall back to per-user
/// directories when the config is validated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub launch: LaunchSection,

    #[serde(default)]
    pub store: RawStoreSection,

    #[serde(default)]
    pub fetch: FetchSection,

    #[serde(default)]
    pub trust: RawTrustSection,
}

/// `[launch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchSection {
    /// Shell command the program is run through (debuggers, profilers).
    #[serde(default)]
    pub wrapper: Option<String>,

    /// Sandbox wrapper; when set, every launch goes through it.
    #[serde(default)]
    pub sandbox: Option<String>,

    /// Command the sandbox wrapper uses to re-enter the launcher.
    #[serde(default = "default_launcher")]
    pub launcher: String,
}

fn default_launcher() -> String {
    "zlaunch".to_string()
}

impl Default for LaunchSection {
    fn default() -> Self {
        Self {
            wrapper: None,
            sandbox: None,
            launcher: default_launcher(),
        }
    }
}

/// `[store]` section as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStoreSection {
    /// Directories searched for cached implementations, in order. New
    /// implementations are committed to the first.
    #[serde(default)]
    pub dirs: Vec<PathBuf>,

    /// Where fetches unpack before being committed.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

/// `[fetch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSection {
    /// Shell command run once per download, with the URL in `$ZLAUNCH_URL`
    /// and the directory to populate in `$ZLAUNCH_DEST`.
    #[serde(default = "default_fetch_command")]
    pub command: String,
}

fn default_fetch_command() -> String {
    "mkdir -p \"$ZLAUNCH_DEST\" && curl -fsSL \"$ZLAUNCH_URL\" | tar -xz -C \"$ZLAUNCH_DEST\""
        .to_string()
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            command: default_fetch_command(),
        }
    }
}

/// `[trust]` section as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrustSection {
    #[serde(default)]
    pub db: Option<PathBuf>,

    #[serde(default)]
    pub policy: TrustPolicy,
}

/// Validated configuration with every default resolved.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub launch: LaunchSection,
    pub store: StoreConfig,
    pub fetch: FetchSection,
    pub trust: TrustConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub dirs: Vec<PathBuf>,
    pub staging_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustConfig {
    pub db: PathBuf,
    pub policy: TrustPolicy,
}

impl ConfigFile {
    /// Internal constructor used after validation.
    pub(crate) fn new_unchecked(
        launch: LaunchSection,
        store: StoreConfig,
        fetch: FetchSection,
        trust: TrustConfig,
    ) -> Self {
        Self {
            launch,
            store,
            fetch,
            trust,
        }
    }
}

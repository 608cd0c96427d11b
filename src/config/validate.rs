// src/config/validate.rs

use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile, StoreConfig, TrustConfig};
use crate::errors::{LaunchError, Result};

const APP_DIR: &str = "zlaunch";

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::LaunchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_launch(&raw)?;
        validate_fetch(&raw)?;

        let store = resolve_store(&raw)?;
        let trust = resolve_trust(&raw)?;

        Ok(ConfigFile::new_unchecked(raw.launch, store, raw.fetch, trust))
    }
}

fn validate_launch(cfg: &RawConfigFile) -> Result<()> {
    for (key, value) in [
        ("wrapper", &cfg.launch.wrapper),
        ("sandbox", &cfg.launch.sandbox),
    ] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(LaunchError::ConfigError(format!(
                "[launch].{key} must not be empty (omit it instead)"
            )));
        }
    }

    if cfg.launch.launcher.trim().is_empty() {
        return Err(LaunchError::ConfigError(
            "[launch].launcher must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_fetch(cfg: &RawConfigFile) -> Result<()> {
    if cfg.fetch.command.trim().is_empty() {
        return Err(LaunchError::ConfigError(
            "[fetch].command must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn resolve_store(cfg: &RawConfigFile) -> Result<StoreConfig> {
    let dirs = if cfg.store.dirs.is_empty() {
        vec![default_under(dirs::cache_dir(), "implementations", "[store].dirs")?]
    } else {
        cfg.store.dirs.clone()
    };
    for dir in &dirs {
        ensure_absolute("[store].dirs", dir)?;
    }

    let staging_dir = match &cfg.store.staging_dir {
        Some(dir) => dir.clone(),
        None => default_under(dirs::cache_dir(), "staging", "[store].staging_dir")?,
    };
    ensure_absolute("[store].staging_dir", &staging_dir)?;

    Ok(StoreConfig { dirs, staging_dir })
}

fn resolve_trust(cfg: &RawConfigFile) -> Result<TrustConfig> {
    let db = match &cfg.trust.db {
        Some(path) => path.clone(),
        None => default_under(dirs::config_dir(), "trust.toml", "[trust].db")?,
    };
    ensure_absolute("[trust].db", &db)?;

    Ok(TrustConfig {
        db,
        policy: cfg.trust.policy,
    })
}

fn default_under(base: Option<PathBuf>, leaf: &str, key: &str) -> Result<PathBuf> {
    base.map(|b| b.join(APP_DIR).join(leaf)).ok_or_else(|| {
        LaunchError::ConfigError(format!(
            "cannot determine a default for {key} on this system; set it explicitly"
        ))
    })
}

fn ensure_absolute(key: &str, path: &Path) -> Result<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(LaunchError::ConfigError(format!(
            "{key} must be an absolute path (got {:?})",
            path
        )))
    }
}

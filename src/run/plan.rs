// src/run/plan.rs

//! Pure part of a launch: which environment the program gets and which
//! file it is. Nothing here starts a process.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::errors::{LaunchError, Result};
use crate::fs::FileSystem;
use crate::run::env::ProcessEnv;
use crate::run::store::ImplementationStore;
use crate::selections::{binding_order, Binding, Selection, Selections};

/// Where the implementation for `sel` lives, or `None` for host packages.
pub fn implementation_path(
    sel: &Selection,
    store: &dyn ImplementationStore,
) -> Result<Option<PathBuf>> {
    if sel.is_package() {
        return Ok(None);
    }
    if let Some(local) = sel.local_path() {
        return Ok(Some(local.to_path_buf()));
    }
    store.lookup(&sel.id).map(Some)
}

fn apply_binding(env: &mut ProcessEnv, binding: &Binding, path: &Path) {
    let prior = env.get(binding.name()).map(OsStr::to_os_string);
    let value = binding.apply(path, prior.as_deref());
    trace!(name = binding.name(), value = ?value, "binding applied");
    env.set(binding.name(), value);
}

/// Apply every binding in `sels` to `env`.
///
/// Selections are visited dependencies first. Each applies its own
/// bindings against its own path, then each dependency edge's bindings
/// against the dependency's path. Host packages have no path, so neither
/// their own bindings nor bindings on edges pointing at them are applied.
pub fn apply_bindings(
    sels: &Selections,
    store: &dyn ImplementationStore,
    env: &mut ProcessEnv,
) -> Result<()> {
    for sel in binding_order(sels)? {
        match implementation_path(sel, store)? {
            Some(path) => {
                for binding in &sel.bindings {
                    apply_binding(env, binding, &path);
                }
            }
            None if !sel.bindings.is_empty() => {
                debug!(interface = %sel.interface, "host package; skipping its bindings");
            }
            None => {}
        }

        for dep in &sel.dependencies {
            if dep.bindings.is_empty() {
                continue;
            }
            let dep_sel = sels.require(&dep.interface)?;
            let Some(dep_path) = implementation_path(dep_sel, store)? else {
                debug!(
                    from = %sel.interface,
                    to = %dep.interface,
                    "dependency is a host package; skipping edge bindings"
                );
                continue;
            };
            for binding in &dep.bindings {
                apply_binding(env, binding, &dep_path);
            }
        }
    }
    Ok(())
}

/// Executable to run for `root`, honouring an explicit `main_override`.
///
/// An absolute override is taken relative to the implementation root; a
/// relative one replaces the file name of the declared main.
pub fn resolve_program(
    root: &Selection,
    main_override: Option<&str>,
    store: &dyn ImplementationStore,
    fs: &dyn FileSystem,
) -> Result<PathBuf> {
    let not_executable = || LaunchError::NotExecutable(root.id.clone());

    let (program, main) = if root.is_package() {
        let main = main_override
            .or(root.main.as_deref())
            .ok_or_else(not_executable)?;
        (PathBuf::from(main), main.to_string())
    } else {
        let main: PathBuf = match main_override {
            None => root.main.as_deref().map(PathBuf::from).ok_or_else(not_executable)?,
            Some(abs) if abs.starts_with('/') => PathBuf::from(&abs[1..]),
            Some(rel) => match root.main.as_deref() {
                Some(declared) => Path::new(declared)
                    .parent()
                    .unwrap_or(Path::new(""))
                    .join(rel),
                None => PathBuf::from(rel),
            },
        };
        let root_dir = implementation_path(root, store)?.ok_or_else(not_executable)?;
        (root_dir.join(&main), main.display().to_string())
    };

    if !fs.exists(&program) {
        return Err(LaunchError::MissingFile {
            path: program.display().to_string(),
            id: root.id.clone(),
            main,
        });
    }
    debug!(program = %program.display(), "entry point resolved");
    Ok(program)
}

// src/run/runner.rs

use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::run::env::ProcessEnv;
use crate::run::launcher::{inherit_fd, shell_wrapper_args, LaunchCommand, ProcessLauncher};
use crate::run::plan::{apply_bindings, resolve_program};
use crate::run::store::ImplementationStore;
use crate::selections::{xml, Selections};

/// Caller choices for one launch attempt.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Report the command instead of running it.
    pub dry_run: bool,
    /// Overrides the root selection's declared main.
    pub main: Option<String>,
    /// Shell command the program is run through.
    pub wrapper: Option<String>,
    /// Sandbox wrapper; the launcher is re-entered inside it.
    pub sandbox: Option<String>,
    /// How the sandbox re-enters the launcher.
    pub launcher: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            main: None,
            wrapper: None,
            sandbox: None,
            launcher: "zlaunch".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was started; the message says what would have run.
    DryRun(String),
    /// The launcher took over.
    Launched,
}

/// A planned invocation, plus the sandbox handoff file that has to stay
/// open until the program starts.
struct Plan {
    command: LaunchCommand,
    _handoff: Option<File>,
}

/// Executes a fully cached set of selections.
pub struct Runner<'a> {
    options: RunOptions,
    store: &'a dyn ImplementationStore,
    fs: &'a dyn FileSystem,
    launcher: &'a mut dyn ProcessLauncher,
    base_env: ProcessEnv,
}

impl<'a> Runner<'a> {
    pub fn new(
        options: RunOptions,
        store: &'a dyn ImplementationStore,
        fs: &'a dyn FileSystem,
        launcher: &'a mut dyn ProcessLauncher,
    ) -> Self {
        Self {
            options,
            store,
            fs,
            launcher,
            base_env: ProcessEnv::from_current(),
        }
    }

    /// Start from `env` instead of this process's environment.
    pub fn with_env(mut self, env: ProcessEnv) -> Self {
        self.base_env = env;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run the program. With a real launcher this only returns for a dry
    /// run or on failure.
    pub fn run(&mut self, sels: &Selections, args: &[OsString]) -> Result<RunOutcome> {
        let plan = self.plan(sels, args)?;

        if self.options.dry_run {
            let report = format!("Would execute: {}", plan.command);
            info!(command = %plan.command, "dry run");
            return Ok(RunOutcome::DryRun(report));
        }

        self.launcher.exec(&plan.command)?;
        Ok(RunOutcome::Launched)
    }

    /// Run the program as a child, collecting everything it writes to
    /// stdout and stderr.
    ///
    /// Failures before or while starting the child are written into the
    /// output as well, and count as exit code 1.
    pub fn run_test(&mut self, sels: &Selections, args: &[OsString]) -> Result<Vec<u8>> {
        let mut output = tempfile::tempfile()?;

        let code = match self.plan(sels, args) {
            Ok(plan) if self.options.dry_run => {
                writeln!(output, "Would execute: {}", plan.command)?;
                0
            }
            Ok(plan) => {
                info!(command = %plan.command, "waiting for test process to finish");
                match self.launcher.run_captured(&plan.command, &output) {
                    Ok(code) => code,
                    Err(err) => {
                        warn!(error = %err, "test process could not be started");
                        writeln!(output, "{err}")?;
                        1
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "test process could not be prepared");
                writeln!(output, "{err}")?;
                1
            }
        };

        output.seek(SeekFrom::Start(0))?;
        let mut results = Vec::new();
        output.read_to_end(&mut results)?;

        if code != 0 {
            results.extend_from_slice(
                format!("Error from child process: exit code = {code}").as_bytes(),
            );
        }
        Ok(results)
    }

    fn plan(&self, sels: &Selections, args: &[OsString]) -> Result<Plan> {
        if let Some(sandbox) = &self.options.sandbox {
            return self.plan_sandboxed(sandbox, sels, args);
        }

        let mut env = self.base_env.clone();
        apply_bindings(sels, self.store, &mut env)?;

        let root = sels.root()?;
        let program = resolve_program(root, self.options.main.as_deref(), self.store, self.fs)?;

        let mut command = LaunchCommand::new(program, args.to_vec(), env);
        if let Some(wrapper) = &self.options.wrapper {
            command = command.wrapped(wrapper);
        }
        Ok(Plan {
            command,
            _handoff: None,
        })
    }

    /// Hand the selections to the sandbox through an inherited descriptor;
    /// the sandbox re-enters the launcher with `--set-selections-fd`.
    fn plan_sandboxed(&self, sandbox: &str, sels: &Selections, args: &[OsString]) -> Result<Plan> {
        let mut handoff = tempfile::tempfile()?;
        handoff.write_all(xml::to_xml(sels)?.as_bytes())?;
        handoff.flush()?;
        handoff.seek(SeekFrom::Start(0))?;
        let fd = inherit_fd(&handoff)?;
        debug!(fd, sandbox, "selections written for sandbox");

        let mut rest: Vec<OsString> = vec!["--set-selections-fd".into(), fd.to_string().into()];
        if let Some(wrapper) = &self.options.wrapper {
            rest.push("--wrapper".into());
            rest.push(wrapper.into());
        }
        rest.push("--".into());
        rest.extend(args.iter().cloned());

        let command = LaunchCommand::new(
            "/bin/sh",
            shell_wrapper_args(sandbox, self.options.launcher.clone().into(), rest),
            self.base_env.clone(),
        );
        Ok(Plan {
            command,
            _handoff: Some(handoff),
        })
    }
}

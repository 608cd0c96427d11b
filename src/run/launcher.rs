// src/run/launcher.rs

//! The narrow seam between launch planning and the operating system.
//!
//! Everything that actually starts a process goes through
//! [`ProcessLauncher`]; [`OsLauncher`] is the only implementation that
//! touches the OS. Tests substitute a recording launcher.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::errors::{LaunchError, Result};
use crate::run::env::ProcessEnv;

const SHELL: &str = "/bin/sh";

/// A fully resolved program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// The complete environment of the new process.
    pub env: ProcessEnv,
}

impl LaunchCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>, env: ProcessEnv) -> Self {
        Self {
            program: program.into(),
            args,
            env,
        }
    }

    /// Run this command through a shell `wrapper`, which receives the
    /// program and its arguments as `"$@"`.
    pub fn wrapped(self, wrapper: &str) -> Self {
        Self {
            program: PathBuf::from(SHELL),
            args: shell_wrapper_args(wrapper, self.program.into_os_string(), self.args),
            env: self.env,
        }
    }

    /// Program and arguments, space separated, for display.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(OsStr::to_string_lossy)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// `-c '<wrapper> "$@"' - <first> <rest...>`: arguments for `/bin/sh` so the
/// wrapper gets `first` and `rest` as positional parameters.
pub fn shell_wrapper_args(
    wrapper: &str,
    first: OsString,
    rest: impl IntoIterator<Item = OsString>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-c".into(),
        format!("{wrapper} \"$@\"").into(),
        "-".into(),
        first,
    ];
    args.extend(rest);
    args
}

/// Trait abstracting how programs are started.
pub trait ProcessLauncher {
    /// Replace the current process image with `cmd`.
    ///
    /// On a real OS this only returns on failure. Returning `Ok` means the
    /// launcher took over the process some other way (test doubles).
    fn exec(&mut self, cmd: &LaunchCommand) -> Result<()>;

    /// Run `cmd` as a child with stdout and stderr both appended to
    /// `output`, wait for it, and return its exit code.
    fn run_captured(&mut self, cmd: &LaunchCommand, output: &File) -> Result<i32>;
}

/// Production launcher using `std::process` on unix.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLauncher;

impl OsLauncher {
    fn command(cmd: &LaunchCommand) -> Command {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .env_clear()
            .envs(cmd.env.iter());
        command
    }
}

fn failed_to_run(program: &Path, err: impl fmt::Display) -> LaunchError {
    LaunchError::FailedToRun {
        program: program.display().to_string(),
        reason: err.to_string(),
    }
}

impl ProcessLauncher for OsLauncher {
    fn exec(&mut self, cmd: &LaunchCommand) -> Result<()> {
        info!(program = %cmd.program.display(), "executing");
        // Anything buffered would be lost with the old process image.
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();

        let err = Self::command(cmd).exec();
        Err(failed_to_run(&cmd.program, err))
    }

    fn run_captured(&mut self, cmd: &LaunchCommand, output: &File) -> Result<i32> {
        let stdout = output.try_clone()?;
        let stderr = output.try_clone()?;

        debug!(program = %cmd.program.display(), "starting captured child");
        let status = Self::command(cmd)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|e| failed_to_run(&cmd.program, e))?;

        let code = match (status.code(), status.signal()) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => 1,
        };
        debug!(program = %cmd.program.display(), code, "captured child exited");
        Ok(code)
    }
}

/// Let `file`'s descriptor survive `exec`, and return its number.
pub fn inherit_fd(file: &File) -> Result<RawFd> {
    let fd = file.as_raw_fd();

    // SAFETY: `fd` belongs to `file`, which stays open for the whole call;
    // F_GETFD/F_SETFD only touch the descriptor flags.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error().into());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error().into());
    }

    debug!(fd, "descriptor marked inheritable");
    Ok(fd)
}

// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `zlaunch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "zlaunch",
    version,
    about = "Fetch, trust-check and launch an already-resolved set of implementations.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `zlaunch/config.toml` in the user's configuration directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Read the selections document (canonical XML) from this file, or a
    /// length-prefixed selections message from stdin if the path is `-`.
    #[arg(long, value_name = "PATH", conflicts_with = "set_selections_fd")]
    pub selections: Option<PathBuf>,

    /// Read the selections document from this inherited file descriptor
    /// (used when re-entered from a sandbox wrapper).
    #[arg(long, value_name = "FD")]
    pub set_selections_fd: Option<i32>,

    /// Print the command that would run instead of running it.
    #[arg(long)]
    pub dry_run: bool,

    /// Program to run instead of the implementation's declared main.
    #[arg(long, value_name = "PATH")]
    pub main: Option<String>,

    /// Run the program through this shell command (e.g. a debugger).
    #[arg(long, value_name = "COMMAND")]
    pub wrapper: Option<String>,

    /// Run inside this sandbox wrapper command (overrides `[launch] sandbox`).
    #[arg(long, value_name = "COMMAND")]
    pub sandbox: Option<String>,

    /// Run the program as a child process and print everything it wrote.
    #[arg(long, conflicts_with_all = ["sandbox", "handoff"])]
    pub test: bool,

    /// Fetch missing implementations, then exit without running anything.
    #[arg(long, conflicts_with_all = ["test", "handoff"])]
    pub download_only: bool,

    /// Once everything is cached, write the length-prefixed selections to
    /// stdout for the calling process instead of running the program.
    #[arg(long)]
    pub handoff: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ZLAUNCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Arguments passed to the program.
    #[arg(last = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_arguments_follow_the_separator() {
        let args = CliArgs::try_parse_from([
            "zlaunch",
            "--selections",
            "sels.xml",
            "--wrapper",
            "gdb --args",
            "--",
            "-v",
            "input.txt",
        ])
        .unwrap();

        assert_eq!(args.selections, Some(PathBuf::from("sels.xml")));
        assert_eq!(args.wrapper.as_deref(), Some("gdb --args"));
        assert_eq!(args.args, vec!["-v".to_string(), "input.txt".to_string()]);
    }

    #[test]
    fn test_mode_excludes_sandbox() {
        let res = CliArgs::try_parse_from(["zlaunch", "--test", "--sandbox", "firejail"]);
        assert!(res.is_err());
    }
}

// src/lib.rs

pub mod cli;
pub mod config;
pub mod download;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod handler;
pub mod logging;
pub mod run;
pub mod selections;
pub mod tasks;
pub mod trust;
pub mod types;

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::os::fd::FromRawFd;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::model::ConfigFile;
use crate::download::{CommandFetcher, DownloadRegistry, LogObserver};
use crate::engine::{download_and_run, EventLoop, LoopEvent, Readiness};
use crate::errors::LaunchError;
use crate::fs::{FileSystem, RealFileSystem};
use crate::handler::{Handler, LogSink};
use crate::run::{DirStore, ImplementationStore, OsLauncher, RunOptions, RunOutcome, Runner};
use crate::selections::{handoff, xml, Selections};
use crate::tasks::Scheduler;
use crate::trust::{ConsolePrompt, PolicyPrompt, TrustDb, TrustGate, TrustPrompt};
use crate::types::{DispatchMode, TrustPolicy};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config and selections loading
/// - the tokio runtime that runs fetch commands and the Ctrl-C listener
/// - download registry / event loop / handler
/// - the download-and-run workflow
/// - dispatch (handoff, test capture, dry run, exec)
pub fn run(args: CliArgs) -> Result<i32> {
    let cfg = config::load_or_default(args.config.as_deref())?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let sels = Rc::new(load_selections(&args, fs.as_ref())?);
    info!(
        interface = %sels.interface,
        selections = sels.len(),
        "selections loaded"
    );

    let store: Rc<dyn ImplementationStore> =
        Rc::new(DirStore::new(Arc::clone(&fs), cfg.store.dirs.clone()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let (events_tx, events_rx) = mpsc::unbounded_channel::<LoopEvent>();

    // Ctrl-C → cancellation.
    {
        let tx = events_tx.clone();
        runtime.spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = tx.send(LoopEvent::Interrupted);
        });
    }

    let scheduler = Scheduler::new();
    let fetcher = CommandFetcher::new(
        runtime.handle().clone(),
        cfg.fetch.command.clone(),
        events_tx,
    );
    let registry = DownloadRegistry::new(
        scheduler.clone(),
        Box::new(fetcher),
        Rc::new(LogObserver),
        cfg.store.staging_dir.clone(),
    );
    let event_loop = EventLoop::new(scheduler.clone(), Rc::clone(&registry), events_rx);
    let cancelled = event_loop.cancelled().clone();

    let trust_db = TrustDb::load(Arc::clone(&fs), cfg.trust.db.clone())?;
    let gate = TrustGate::new(Rc::new(trust_db), trust_prompt(cfg.trust.policy));
    let mut handler = Handler::new(Box::new(event_loop), registry, gate, Box::new(LogSink));

    match download_and_run(&mut handler, &scheduler, &store, &sels, &cancelled)? {
        Readiness::Ready => {}
        Readiness::Cancelled => return Err(LaunchError::Cancelled.into()),
    }

    if args.download_only {
        info!("all implementations available");
        return Ok(0);
    }

    if args.handoff {
        let mut stdout = io::stdout().lock();
        handoff::write_to(&mut stdout, &sels)?;
        stdout.flush()?;
        debug!("selections handed off on stdout");
        return Ok(0);
    }

    let options = run_options(&args, &cfg);
    let mode = dispatch_mode(&args, &options);
    let program_args: Vec<OsString> = args.args.iter().map(OsString::from).collect();
    info!(?mode, dry_run = options.dry_run, "launching");

    let mut launcher = OsLauncher;
    let mut runner = Runner::new(options, store.as_ref(), fs.as_ref(), &mut launcher);

    match mode {
        DispatchMode::TestCapture => {
            let output = runner.run_test(&sels, &program_args)?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(&output)?;
            stdout.flush()?;
            Ok(0)
        }
        DispatchMode::Direct | DispatchMode::Sandbox => match runner.run(&sels, &program_args)? {
            RunOutcome::DryRun(report) => {
                println!("{report}");
                Ok(0)
            }
            RunOutcome::Launched => Ok(0),
        },
    }
}

/// Read the selections from an inherited descriptor, stdin (`-`), or a file.
fn load_selections(args: &CliArgs, fs: &dyn FileSystem) -> Result<Selections> {
    if let Some(fd) = args.set_selections_fd {
        ensure!(
            fd > 2,
            "invalid selections descriptor {fd} (standard streams cannot carry selections)"
        );
        // SAFETY: the descriptor was left open for us by the launcher that
        // started this process; nothing else in this process owns it.
        let mut file = unsafe { File::from_raw_fd(fd) };
        let mut text = String::new();
        file.read_to_string(&mut text)
            .with_context(|| format!("reading selections from descriptor {fd}"))?;
        return Ok(xml::from_xml(&text)?);
    }

    match args.selections.as_deref() {
        Some(path) if path == Path::new("-") => {
            let mut stdin = io::stdin().lock();
            Ok(handoff::read(&mut stdin)?)
        }
        Some(path) => {
            let text = fs.read_to_string(path)?;
            Ok(xml::from_xml(&text)?)
        }
        None => bail!("no selections given (use --selections or --set-selections-fd)"),
    }
}

/// CLI flags first, then `[launch]` from the config.
fn run_options(args: &CliArgs, cfg: &ConfigFile) -> RunOptions {
    // Re-entered from the sandbox: must not wrap ourselves again.
    let sandbox = if args.set_selections_fd.is_some() {
        None
    } else {
        args.sandbox.clone().or_else(|| cfg.launch.sandbox.clone())
    };

    RunOptions {
        dry_run: args.dry_run,
        main: args.main.clone(),
        wrapper: args.wrapper.clone().or_else(|| cfg.launch.wrapper.clone()),
        sandbox,
        launcher: cfg.launch.launcher.clone(),
    }
}

fn dispatch_mode(args: &CliArgs, options: &RunOptions) -> DispatchMode {
    if args.test {
        DispatchMode::TestCapture
    } else if options.sandbox.is_some() {
        DispatchMode::Sandbox
    } else {
        DispatchMode::Direct
    }
}

fn trust_prompt(policy: TrustPolicy) -> Box<dyn TrustPrompt> {
    match PolicyPrompt::for_policy(policy) {
        Some(fixed) => Box::new(fixed),
        None => Box::new(ConsolePrompt::new(BufReader::new(io::stdin()), io::stderr())),
    }
}

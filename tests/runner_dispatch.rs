// tests/runner_dispatch.rs

use std::ffi::{OsStr, OsString};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use zlaunch::errors::LaunchError;
use zlaunch::fs::RealFileSystem;
use zlaunch::run::{DirStore, OsLauncher, ProcessEnv, RunOptions, RunOutcome, Runner};
use zlaunch::selections::{xml, BindingMode, EnvironmentBinding, Selections};
use zlaunch_test_utils::builders::{SelectionBuilder, SelectionsBuilder};
use zlaunch_test_utils::fakes::FakeLauncher;
use zlaunch_test_utils::init_tracing;

const APP: &str = "http://example.com/app";
const LIB: &str = "http://example.com/lib";

struct Fixture {
    _dir: TempDir,
    store_dir: PathBuf,
    store: DirStore,
}

/// A store with an `app` implementation containing `bin/app` (a shell
/// script with the given body) and an empty `lib` implementation.
fn fixture(script: &str) -> Fixture {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store_dir = dir.path().join("store");

    let bin = store_dir.join("sha256=app").join("bin");
    fs::create_dir_all(&bin).unwrap();
    let app = bin.join("app");
    fs::write(&app, format!("#!/bin/sh\n{script}\n")).unwrap();
    fs::set_permissions(&app, fs::Permissions::from_mode(0o755)).unwrap();
    fs::create_dir_all(store_dir.join("sha256=lib").join("lib")).unwrap();

    let store = DirStore::new(Arc::new(RealFileSystem), vec![store_dir.clone()]);
    Fixture {
        _dir: dir,
        store_dir,
        store,
    }
}

fn selections() -> Selections {
    SelectionsBuilder::new(APP)
        .with(
            SelectionBuilder::new(APP, "sha256=app")
                .main("bin/app")
                .binding(EnvironmentBinding::insert("PATH", "bin"))
                .requires(
                    LIB,
                    vec![EnvironmentBinding::insert("LD_LIBRARY_PATH", "lib")
                        .with_mode(BindingMode::Append)],
                ),
        )
        .with(SelectionBuilder::new(LIB, "sha256=lib"))
        .build()
}

fn args(list: &[&str]) -> Vec<OsString> {
    list.iter().map(OsString::from).collect()
}

fn impl_path(fx: &Fixture, id: &str, rest: &str) -> PathBuf {
    fx.store_dir.join(id).join(rest)
}

#[test]
fn test_dry_run_reports_the_command_and_runs_nothing() {
    let fx = fixture("exit 0");
    let mut launcher = FakeLauncher::new();
    let options = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };

    let outcome = Runner::new(options, &fx.store, &RealFileSystem, &mut launcher)
        .with_env(ProcessEnv::new())
        .run(&selections(), &args(&["--verbose", "input.txt"]))
        .unwrap();

    let expected = format!(
        "Would execute: {} --verbose input.txt",
        impl_path(&fx, "sha256=app", "bin/app").display()
    );
    assert_eq!(outcome, RunOutcome::DryRun(expected));
    assert!(launcher.execs.is_empty());
    assert!(launcher.captured.is_empty());
}

#[test]
fn test_direct_exec_gets_bindings_from_the_whole_graph() {
    let fx = fixture("exit 0");
    let mut launcher = FakeLauncher::new();
    let mut env = ProcessEnv::new();
    env.set("LD_LIBRARY_PATH", "/opt/lib");
    env.set("HOME", "/home/user");

    let outcome = Runner::new(RunOptions::default(), &fx.store, &RealFileSystem, &mut launcher)
        .with_env(env)
        .run(&selections(), &[])
        .unwrap();
    assert_eq!(outcome, RunOutcome::Launched);

    let cmd = &launcher.execs[0];
    let bin = impl_path(&fx, "sha256=app", "bin");
    let lib = impl_path(&fx, "sha256=lib", "lib");
    assert_eq!(cmd.program, bin.join("app"));
    assert_eq!(
        cmd.env.get("PATH"),
        Some(OsStr::new(&format!("{}:/bin:/usr/bin", bin.display())))
    );
    assert_eq!(
        cmd.env.get("LD_LIBRARY_PATH"),
        Some(OsStr::new(&format!("/opt/lib:{}", lib.display())))
    );
    assert_eq!(cmd.env.get("HOME"), Some(OsStr::new("/home/user")));
}

#[test]
fn test_wrapper_and_main_override_compose() {
    let fx = fixture("exit 0");
    fs::write(impl_path(&fx, "sha256=app", "bin/helper"), "").unwrap();
    let mut launcher = FakeLauncher::new();
    let options = RunOptions {
        main: Some("helper".into()),
        wrapper: Some("strace -f".into()),
        ..RunOptions::default()
    };

    Runner::new(options, &fx.store, &RealFileSystem, &mut launcher)
        .with_env(ProcessEnv::new())
        .run(&selections(), &args(&["x"]))
        .unwrap();

    let cmd = &launcher.execs[0];
    assert_eq!(cmd.program, Path::new("/bin/sh"));
    assert_eq!(
        cmd.args,
        vec![
            OsString::from("-c"),
            OsString::from("strace -f \"$@\""),
            OsString::from("-"),
            impl_path(&fx, "sha256=app", "bin/helper").into_os_string(),
            OsString::from("x"),
        ]
    );
}

#[test]
fn test_missing_program_names_the_file() {
    let fx = fixture("exit 0");
    let mut launcher = FakeLauncher::new();
    let options = RunOptions {
        main: Some("/bin/nope".into()),
        ..RunOptions::default()
    };

    let err = Runner::new(options, &fx.store, &RealFileSystem, &mut launcher)
        .run(&selections(), &[])
        .unwrap_err();

    match err {
        LaunchError::MissingFile { path, .. } => {
            assert_eq!(PathBuf::from(path), impl_path(&fx, "sha256=app", "bin/nope"));
        }
        other => panic!("expected MissingFile, got {other:?}"),
    }
    assert!(launcher.execs.is_empty());
}

#[test]
fn test_capture_with_fake_launcher_appends_exit_code() {
    let fx = fixture("exit 0");
    let mut launcher = FakeLauncher::new().with_output(b"hello\n", 2);

    let output = Runner::new(RunOptions::default(), &fx.store, &RealFileSystem, &mut launcher)
        .run_test(&selections(), &[])
        .unwrap();

    assert_eq!(
        String::from_utf8(output).unwrap(),
        "hello\nError from child process: exit code = 2"
    );
    assert_eq!(launcher.captured.len(), 1);
}

#[test]
fn test_capture_runs_a_real_child() {
    let fx = fixture("echo \"out $1\"; echo \"err $PATH\" >&2; exit 0");
    let mut launcher = OsLauncher;

    let output = Runner::new(RunOptions::default(), &fx.store, &RealFileSystem, &mut launcher)
        .with_env(ProcessEnv::new())
        .run_test(&selections(), &args(&["one"]))
        .unwrap();
    let text = String::from_utf8(output).unwrap();

    let bin = impl_path(&fx, "sha256=app", "bin");
    assert!(text.contains("out one"), "{text}");
    assert!(text.contains(&format!("err {}:/bin:/usr/bin", bin.display())), "{text}");
    assert!(!text.contains("Error from child process"), "{text}");
}

#[test]
fn test_capture_of_a_failing_child() {
    let fx = fixture("echo hello; exit 2");
    let mut launcher = OsLauncher;

    let output = Runner::new(RunOptions::default(), &fx.store, &RealFileSystem, &mut launcher)
        .run_test(&selections(), &[])
        .unwrap();

    assert_eq!(
        String::from_utf8(output).unwrap(),
        "hello\nError from child process: exit code = 2"
    );
}

#[test]
fn test_library_cannot_be_run() {
    let fx = fixture("exit 0");
    let sels = SelectionsBuilder::new(LIB)
        .with(SelectionBuilder::new(LIB, "sha256=lib"))
        .build();
    let mut launcher = FakeLauncher::new();

    let err = Runner::new(RunOptions::default(), &fx.store, &RealFileSystem, &mut launcher)
        .run(&sels, &[])
        .unwrap_err();
    assert!(matches!(err, LaunchError::NotExecutable(id) if id == "sha256=lib"));
}

#[test]
fn test_sandbox_reads_canonical_selections_from_the_descriptor() {
    let fx = fixture("exit 0");
    let mut launcher = OsLauncher;
    // $1 is the launcher, $2 the flag and $3 the descriptor number.
    let options = RunOptions {
        sandbox: Some("f() { cat <&$3; }; f".into()),
        ..RunOptions::default()
    };

    let output = Runner::new(options, &fx.store, &RealFileSystem, &mut launcher)
        .run_test(&selections(), &args(&["x"]))
        .unwrap();
    let text = String::from_utf8(output).unwrap();

    assert!(!text.contains("Error from child process"), "{text}");
    assert_eq!(xml::from_xml(&text).unwrap(), selections());
}

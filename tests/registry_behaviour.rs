// tests/registry_behaviour.rs

use std::rc::Rc;

use zlaunch::download::{DownloadRegistry, DownloadStatus};
use zlaunch::errors::LaunchError;
use zlaunch::tasks::Scheduler;
use zlaunch_test_utils::fakes::{FakeFetcher, RecordingObserver};
use zlaunch_test_utils::init_tracing;

const URL: &str = "http://example.com/app-1.0.tgz";

fn registry(fetcher: FakeFetcher) -> (Scheduler, Rc<DownloadRegistry>, RecordingObserver) {
    init_tracing();
    let scheduler = Scheduler::new();
    let observer = RecordingObserver::default();
    let registry = DownloadRegistry::new(
        scheduler.clone(),
        Box::new(fetcher),
        Rc::new(observer.clone()),
        "/tmp/zlaunch-staging",
    );
    (scheduler, registry, observer)
}

#[test]
fn test_acquire_deduplicates_by_url() {
    let fetcher = FakeFetcher::new();
    let (_scheduler, registry, observer) = registry(fetcher.clone());

    let first = registry.acquire(URL, false);
    let second = registry.acquire(URL, false);

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(fetcher.started(), 1);
    assert_eq!(observer.snapshots(), vec![vec![URL.to_string()]]);
}

#[test]
fn test_completion_unregisters_and_notifies_once() {
    let fetcher = FakeFetcher::new();
    let (scheduler, registry, observer) = registry(fetcher.clone());

    let dl = registry.acquire(URL, false);
    let req = fetcher.request_for(URL).unwrap();
    assert!(req.dest.starts_with("/tmp/zlaunch-staging"));

    registry.fetch_finished(req.id, Ok(()));
    assert_eq!(dl.status(), DownloadStatus::Complete);
    scheduler.run_until_stalled();

    assert!(registry.is_empty());
    assert_eq!(
        observer.snapshots(),
        vec![vec![URL.to_string()], Vec::<String>::new()]
    );
}

#[test]
fn test_failed_download_is_returned_until_forced() {
    let fetcher = FakeFetcher::new();
    let (_scheduler, registry, observer) = registry(fetcher.clone());

    let failed = registry.acquire(URL, false);
    registry.fetch_finished(failed.fetch_id(), Err("404".into()));

    let again = registry.acquire(URL, false);
    assert!(Rc::ptr_eq(&failed, &again));
    assert_eq!(fetcher.started(), 1);

    let fresh = registry.acquire(URL, true);
    assert!(!Rc::ptr_eq(&failed, &fresh));
    assert_eq!(fresh.status(), DownloadStatus::Fetching);
    assert_eq!(failed.status(), DownloadStatus::Failed);
    assert_eq!(fetcher.started(), 2);
    assert_eq!(
        observer.snapshots(),
        vec![
            vec![URL.to_string()],
            Vec::<String>::new(),
            vec![URL.to_string()],
        ]
    );
}

#[test]
fn test_force_aborts_the_running_fetch() {
    let fetcher = FakeFetcher::new();
    let (scheduler, registry, observer) = registry(fetcher.clone());

    let old = registry.acquire(URL, false);
    let new = registry.acquire(URL, true);

    assert_eq!(old.status(), DownloadStatus::Aborted);
    assert!(fetcher.was_aborted(old.fetch_id()));
    assert!(!fetcher.was_aborted(new.fetch_id()));

    // The old monitor wakes up, but the entry now belongs to the new download.
    scheduler.run_until_stalled();
    assert_eq!(registry.urls(), vec![URL.to_string()]);
    assert!(Rc::ptr_eq(&registry.get(URL).unwrap(), &new));
    assert_eq!(observer.count(), 3);

    // A late report for the aborted fetch changes nothing.
    registry.fetch_finished(old.fetch_id(), Ok(()));
    assert_eq!(old.status(), DownloadStatus::Aborted);
    assert_eq!(new.status(), DownloadStatus::Fetching);
}

#[test]
fn test_abort_all_releases_every_waiter() {
    let fetcher = FakeFetcher::new();
    let (scheduler, registry, _observer) = registry(fetcher.clone());

    let a = registry.acquire("http://example.com/a.tgz", false);
    let b = registry.acquire("http://example.com/b.tgz", false);

    let waiters: Vec<_> = [a.clone(), b.clone()]
        .into_iter()
        .map(|dl| {
            scheduler.spawn(format!("waiting for {}", dl.url()), async move {
                dl.downloaded().wait().await;
                dl.downloaded().check()
            })
        })
        .collect();
    scheduler.run_until_stalled();

    registry.abort_all();
    scheduler.run_until_stalled();

    for task in &waiters {
        assert!(matches!(
            task.take_output(),
            Err(LaunchError::DownloadAborted(_))
        ));
    }
    assert!(fetcher.was_aborted(a.fetch_id()));
    assert!(fetcher.was_aborted(b.fetch_id()));
    assert!(registry.is_empty());
    assert!(scheduler.is_idle());
}

#[test]
fn test_backend_that_cannot_start_gives_a_failed_download() {
    let (scheduler, registry, observer) = registry(FakeFetcher::refusing());

    let dl = registry.acquire(URL, false);
    assert_eq!(dl.status(), DownloadStatus::Failed);
    match dl.downloaded().check() {
        Err(LaunchError::DownloadFailed { url, reason }) => {
            assert_eq!(url, URL);
            assert!(reason.contains("refused"), "{reason}");
        }
        other => panic!("expected DownloadFailed, got {other:?}"),
    }

    scheduler.run_until_stalled();
    assert!(registry.is_empty());
    assert_eq!(observer.count(), 2);
}

// tests/trust_gate.rs

use std::cell::Cell;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::Arc;

use zlaunch::errors::LaunchError;
use zlaunch::fs::RealFileSystem;
use zlaunch::trust::{ConsolePrompt, PolicyPrompt, Signature, TrustDb, TrustGate, TrustResponse};
use zlaunch_test_utils::init_tracing;

const FEED: &str = "http://example.com/feeds/app.xml";
const KEY_A: &str = "92429807C9853C0744A68B9AAE07828059A53CC1";
const KEY_B: &str = "DA9825AECAD089757CDABD8E07133F96CA74D8BA";

fn console(answers: &str) -> Box<ConsolePrompt<Cursor<Vec<u8>>, Vec<u8>>> {
    Box::new(ConsolePrompt::new(
        Cursor::new(answers.as_bytes().to_vec()),
        Vec::new(),
    ))
}

#[test]
fn test_accepted_keys_are_persisted_per_domain() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trust.toml");
    let fs = Arc::new(RealFileSystem);

    let db = Rc::new(TrustDb::load(fs.clone(), &path).unwrap());
    let notified = Rc::new(Cell::new(0));
    {
        let notified = Rc::clone(&notified);
        db.watch(move || notified.set(notified.get() + 1));
    }

    let mut gate = TrustGate::new(Rc::clone(&db), console("maybe\n\ny\n"));
    let signatures = [
        Signature::valid(KEY_A, 1_700_000_000),
        Signature::valid(KEY_B, 1_700_000_000),
    ];
    gate.confirm_trust(FEED, &signatures, b"<interface/>").unwrap();

    assert_eq!(notified.get(), 1);
    let reloaded = TrustDb::load(fs, &path).unwrap();
    assert!(reloaded.is_trusted(KEY_A, "example.com"));
    assert!(reloaded.is_trusted(KEY_B, "example.com"));
    assert!(!reloaded.is_trusted(KEY_A, "example.org"));
}

#[test]
fn test_rejection_trusts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trust.toml");
    let db = Rc::new(TrustDb::load(Arc::new(RealFileSystem), &path).unwrap());

    let mut gate = TrustGate::new(Rc::clone(&db), console("n\n"));
    let err = gate
        .confirm_trust(FEED, &[Signature::valid(KEY_A, 0)], b"")
        .unwrap_err();

    assert!(matches!(err, LaunchError::NotTrusted));
    assert_eq!(err.to_string(), "Not signed with a trusted key");
    assert!(!db.is_trusted(KEY_A, "example.com"));
    assert!(!path.exists());
}

#[test]
fn test_end_of_input_is_a_rejection() {
    let db = Rc::new(TrustDb::in_memory(Arc::new(RealFileSystem)));
    let mut gate = TrustGate::new(db, console(""));

    let err = gate
        .confirm_trust(FEED, &[Signature::valid(KEY_A, 0)], b"")
        .unwrap_err();
    assert!(matches!(err, LaunchError::NotTrusted));
}

#[test]
fn test_no_valid_signature_fails_without_asking() {
    let db = Rc::new(TrustDb::in_memory(Arc::new(RealFileSystem)));
    // Would trust anything if it were asked.
    let mut gate = TrustGate::new(Rc::clone(&db), Box::new(PolicyPrompt::new(TrustResponse::Trust)));

    let signatures = [
        Signature::Bad {
            fingerprint: KEY_A.to_string(),
            status: "EXPKEYSIG".to_string(),
        },
        Signature::Error {
            message: "unknown key".to_string(),
        },
    ];
    let err = gate.confirm_trust(FEED, &signatures, b"").unwrap_err();

    let text = err.to_string();
    assert!(text.starts_with("No valid signatures found"), "{text}");
    assert!(text.contains(KEY_A), "{text}");
    assert!(text.contains("unknown key"), "{text}");
    assert!(db.domains_for(KEY_A).is_empty());
}

#[test]
fn test_interface_without_domain_is_rejected() {
    let db = Rc::new(TrustDb::in_memory(Arc::new(RealFileSystem)));
    let mut gate = TrustGate::new(db, Box::new(PolicyPrompt::new(TrustResponse::Trust)));

    let err = gate
        .confirm_trust("/home/user/feed.xml", &[Signature::valid(KEY_A, 0)], b"")
        .unwrap_err();
    assert!(matches!(err, LaunchError::BadDomain(_)));
    assert!(err.to_string().starts_with("Can't extract domain from URL"));
}

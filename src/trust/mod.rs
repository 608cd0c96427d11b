// src/trust/mod.rs

//! The trust decision point: which signing keys may vouch for which
//! domains, and asking a human when a new key shows up.

pub mod db;
pub mod gate;
pub mod prompt;
pub mod signature;

pub use db::{domain_from_url, TrustDb};
pub use gate::TrustGate;
pub use prompt::{ConsolePrompt, PolicyPrompt, TrustPrompt, TrustRequest, TrustResponse};
pub use signature::Signature;

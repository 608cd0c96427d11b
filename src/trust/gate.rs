// src/trust/gate.rs

use std::rc::Rc;

use tracing::{info, warn};

use crate::errors::{LaunchError, Result};
use crate::trust::db::{domain_from_url, TrustDb};
use crate::trust::prompt::{TrustPrompt, TrustRequest, TrustResponse};
use crate::trust::signature::Signature;

/// Decides whether a freshly fetched, signed document may be used.
pub struct TrustGate {
    db: Rc<TrustDb>,
    prompt: Box<dyn TrustPrompt>,
}

impl TrustGate {
    pub fn new(db: Rc<TrustDb>, prompt: Box<dyn TrustPrompt>) -> Self {
        Self { db, prompt }
    }

    pub fn db(&self) -> &TrustDb {
        &self.db
    }

    /// Ask whether the valid keys among `signatures` should be trusted for
    /// the domain of `interface`. On acceptance every presented key is
    /// trusted for that domain and the database's watchers are notified.
    ///
    /// `fetched` is the untrusted document; it is never interpreted here and
    /// callers must not use it if this returns an error.
    pub fn confirm_trust(
        &mut self,
        interface: &str,
        signatures: &[Signature],
        fetched: &[u8],
    ) -> Result<()> {
        let valid: Vec<&Signature> = signatures.iter().filter(|s| s.is_valid()).collect();
        if valid.is_empty() {
            let listing: String = signatures.iter().map(|s| format!("\n- {s}")).collect();
            warn!(interface, signatures = signatures.len(), "no valid signatures");
            return Err(LaunchError::NoValidSignatures(listing));
        }

        let domain = domain_from_url(interface)?;
        info!(
            interface,
            domain = %domain,
            keys = valid.len(),
            bytes = fetched.len(),
            "asking whether to trust signing keys"
        );

        let request = TrustRequest {
            interface,
            domain: &domain,
            keys: &valid,
        };
        match self.prompt.confirm(&request)? {
            TrustResponse::Reject => {
                info!(interface, domain = %domain, "keys rejected");
                Err(LaunchError::NotTrusted)
            }
            TrustResponse::Trust => {
                for key in &valid {
                    if let Some(fingerprint) = key.fingerprint() {
                        info!(fingerprint, domain = %domain, "trusting key");
                        self.db.trust_key(fingerprint, &domain)?;
                    }
                }
                self.db.notify();
                Ok(())
            }
        }
    }
}

// src/trust/signature.rs

use std::fmt;

/// Result of checking one signature on a fetched document.
///
/// Verification itself happens elsewhere; the gate only looks at the
/// verdicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    Valid { fingerprint: String, timestamp: i64 },
    Bad { fingerprint: String, status: String },
    Error { message: String },
}

impl Signature {
    pub fn valid(fingerprint: impl Into<String>, timestamp: i64) -> Self {
        Signature::Valid {
            fingerprint: fingerprint.into(),
            timestamp,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Signature::Valid { .. })
    }

    /// Key fingerprint, for signatures that name one.
    pub fn fingerprint(&self) -> Option<&str> {
        match self {
            Signature::Valid { fingerprint, .. } | Signature::Bad { fingerprint, .. } => {
                Some(fingerprint)
            }
            Signature::Error { .. } => None,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Valid { fingerprint, .. } => write!(f, "Valid signature from {fingerprint}"),
            Signature::Bad {
                fingerprint,
                status,
            } => write!(f, "BAD signature by {fingerprint} ({status})"),
            Signature::Error { message } => write!(f, "Error checking signature: {message}"),
        }
    }
}

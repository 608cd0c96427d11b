use serde::Deserialize;

/// What to do when a fetched document is signed by keys nobody trusts yet.
///
/// - `Ask`: show the keys and ask on the terminal (default behaviour).
/// - `Trust`: accept the keys without asking. Meant for unattended setups
///   that already vet their feed sources some other way.
/// - `Deny`: refuse every new key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrustPolicy {
    #[default]
    Ask,
    Trust,
    Deny,
}

/// How a launch attempt hands the program over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Replace this process with the program.
    #[default]
    Direct,
    /// Re-run the launcher inside the configured sandbox wrapper.
    Sandbox,
    /// Run the program as a child and collect what it prints.
    TestCapture,
}

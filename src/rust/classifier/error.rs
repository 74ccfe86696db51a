use crate::ledger::LedgerError;
use crate::persistence::SnapshotError;

/// Represents the different types of errors that can occur in the categorizer.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The description or class was empty after normalization
    #[error("Empty input: {0}")]
    EmptyInput(String),
    /// A configuration value was rejected at build time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Some historical records were skipped during bootstrap
    #[error("Bootstrap skipped {skipped} record(s) ({applied} applied)")]
    PartialBootstrapFailure { applied: usize, skipped: usize },
    /// Error occurred while reading or writing the model snapshot
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    /// Error occurred while talking to the ledger
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    /// Every flush attempt has failed for longer than the allowed window
    #[error("Model is diverging from durable state: {failures} consecutive flush failures over {since_secs}s")]
    PersistenceDiverged { failures: u32, since_secs: u64 },
}

impl ClassifierError {
    pub(crate) fn empty(what: &str) -> Self {
        ClassifierError::EmptyInput(format!("{} cannot be empty", what))
    }
}

//! Error types for moltbook-birth.

use thiserror::Error;

/// Errors that can occur in birth certificate operations.
#[derive(Debug, Error)]
pub enum BirthError {
    /// A certificate already exists for this identity. One birth per
    /// credential lifetime; rotation is a separate flow.
    #[error("birth certificate already exists for '{0}'")]
    AlreadyExists(String),

    /// No certificate has been created yet. Expected for freshly
    /// registered agents; not an alarm.
    #[error("no birth certificate found for '{0}'")]
    NotFound(String),

    /// The stored record failed integrity validation. Fatal trust failure,
    /// always surfaced, never downgraded.
    #[error("birth certificate record is corrupt: {0}")]
    CorruptRecord(String),

    /// The enclave code measurement no longer matches the one captured at
    /// birth. Only raised under [`MismatchPolicy::Refuse`].
    ///
    /// [`MismatchPolicy::Refuse`]: crate::manager::MismatchPolicy::Refuse
    #[error("enclave code changed since birth: {birth} -> {current}")]
    CodeMismatch {
        /// Measurement captured at birth.
        birth: String,
        /// Measurement observed now.
        current: String,
    },

    /// Record key failed validation.
    #[error("invalid record key: {0}")]
    InvalidKey(String),

    /// The record store failed.
    #[error("record store error: {0}")]
    Storage(String),

    /// A record could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

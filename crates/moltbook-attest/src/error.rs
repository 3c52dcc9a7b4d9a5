//! Error types for moltbook-attest.

use thiserror::Error;

/// Errors that can occur while collecting or evaluating attestation evidence.
#[derive(Debug, Error)]
pub enum AttestError {
    /// The environment cannot produce the requested evidence. Expected when
    /// running outside the confidential VM; callers downgrade instead of
    /// failing.
    #[error("attestation unavailable: {0}")]
    Unavailable(String),

    /// Evidence was returned but failed structural parsing. Never folded
    /// into a lower tier.
    #[error("malformed quote: {0}")]
    MalformedQuote(String),

    /// A measurement value failed hex or length validation.
    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),

    /// A network operation against a remote endpoint failed.
    #[error("network error: {0}")]
    Network(String),

    /// A collector call exceeded its bounded timeout.
    #[error("operation timed out after {0}s")]
    Timeout(u64),

    /// Collector configuration was invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AttestError {
    /// Whether this failure may be folded into a degraded classification
    /// instead of propagating. Structural failures are never degradable.
    #[must_use]
    pub const fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Network(_) | Self::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_absence_failures_are_degradable() {
        assert!(AttestError::Unavailable("no TEE".into()).is_degradable());
        assert!(AttestError::Network("refused".into()).is_degradable());
        assert!(AttestError::Timeout(10).is_degradable());
    }

    #[test]
    fn structural_failures_are_not_degradable() {
        assert!(!AttestError::MalformedQuote("truncated".into()).is_degradable());
        assert!(!AttestError::InvalidMeasurement("odd length".into()).is_degradable());
        assert!(!AttestError::Config("empty endpoint".into()).is_degradable());
    }
}

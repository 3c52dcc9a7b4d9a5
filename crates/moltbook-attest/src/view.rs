//! The combined attestation view.
//!
//! A view is a pure, on-demand computation over freshly collected evidence:
//! nothing is cached, so there is no invalidation to get wrong. Callers that
//! need the current trust state collect a new view; callers that need the
//! trust state at a past instant (the birth certificate) keep the snapshot
//! they were given.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::CollectorConfig;
use crate::digest::AttestationBinding;
use crate::error::AttestError;
use crate::measurement::MeasurementSet;
use crate::quality::{classify, Summary, Tier};
use crate::quote::collect_enclave_measurements;
use crate::service::{collect_service_attestation, ServiceAttestation};

/// One complete, self-contained reading of the trust state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationView {
    /// Enclave-side measurements.
    pub enclave: MeasurementSet,
    /// Service-side attestation record.
    pub service: ServiceAttestation,
    /// Cryptographic binding over both sides.
    pub binding: AttestationBinding,
    /// Overall trust tier.
    pub tier: Tier,
    /// True only when both sides are fully verified.
    pub fully_verified: bool,
    /// Per-side summary for display.
    pub summary: Summary,
    /// Deterministic explanation of the current status.
    pub explanation: String,
    /// When this view was assembled.
    pub generated_at: DateTime<Utc>,
}

impl AttestationView {
    /// Assemble a view from already-collected records. Pure.
    #[must_use]
    pub fn assemble(
        enclave: MeasurementSet,
        service: ServiceAttestation,
        at: DateTime<Utc>,
    ) -> Self {
        let classification = classify(&enclave, &service);
        let binding = AttestationBinding::compute(&enclave, &service, at);
        Self {
            enclave,
            service,
            binding,
            tier: classification.tier,
            fully_verified: classification.fully_verified,
            summary: classification.summary,
            explanation: classification.explanation.to_string(),
            generated_at: at,
        }
    }
}

/// Collect both sides and assemble the current attestation view.
///
/// The two collectors run concurrently, each under its own bounded timeout.
/// Transient and absence failures degrade the view instead of failing it:
/// an unreachable enclave server yields an explicitly-absent measurement
/// set, an unreachable service yields an unverified service record.
/// Structural failures (`MalformedQuote`) are never degraded; they
/// propagate so that actively-wrong evidence is distinguishable from a
/// merely unsupported environment.
///
/// # Errors
///
/// Returns `AttestError::MalformedQuote` (or another non-degradable error)
/// when either side produced evidence that failed structural validation.
pub async fn collect_view(config: &CollectorConfig) -> Result<AttestationView, AttestError> {
    config.validate()?;

    let (enclave_result, service_result) = tokio::join!(
        collect_enclave_measurements(config),
        collect_service_attestation(config),
    );

    let enclave = match enclave_result {
        Ok(set) => set,
        Err(e) if e.is_degradable() => {
            warn!(error = %e, "enclave collection degraded");
            MeasurementSet::unavailable(e.to_string())
        }
        Err(e) => return Err(e),
    };

    let service = match service_result {
        Ok(record) => record,
        Err(e) if e.is_degradable() => {
            warn!(error = %e, "service collection degraded");
            ServiceAttestation::unverified(&config.service_endpoint, e.to_string())
        }
        Err(e) => return Err(e),
    };

    let view = AttestationView::assemble(enclave, service, Utc::now());
    info!(
        tier = %view.tier,
        fully_verified = view.fully_verified,
        "assembled attestation view"
    );
    Ok(view)
}

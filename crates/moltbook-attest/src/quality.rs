//! Trust tier classification.
//!
//! Maps the presence and validity of each side's evidence to a discrete
//! tier. The tier is capped by the weaker leg: one unverified side pulls
//! the whole attestation down, never averaged away. Explanations come from
//! a fixed table keyed by the status pair, so the same evidence always
//! produces the same words.

use serde::{Deserialize, Serialize};

use crate::measurement::MeasurementSet;
use crate::service::{ServiceAttestation, ServiceOutcome};

/// Discrete trust tier, declared weakest-first so `Ord` follows trust
/// strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Neither side verified.
    None,
    /// Exactly one side verified.
    Low,
    /// Enclave verified, service channel-authenticated only.
    Medium,
    /// Enclave fully measured and service hardware-verified.
    High,
}

impl Tier {
    /// Tier as a lowercase string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-side verification flag surfaced to dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifiedFlag {
    /// The side's evidence checks out.
    Verified,
    /// The side could not be verified.
    Unverified,
}

impl VerifiedFlag {
    const fn from_bool(verified: bool) -> Self {
        if verified {
            Self::Verified
        } else {
            Self::Unverified
        }
    }

    /// Flag as a lowercase string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Unverified => "unverified",
        }
    }
}

/// End-to-end privacy guarantee level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    /// Both legs verified; no operator can observe or alter the loop.
    Guaranteed,
    /// At least one leg lacks verification.
    Partial,
}

/// Human-readable summary of the attestation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Whether the agent's own code is verified.
    pub agent_code: VerifiedFlag,
    /// Whether the LLM inference side is verified.
    pub llm_inference: VerifiedFlag,
    /// The resulting end-to-end privacy level.
    pub end_to_end_privacy: PrivacyLevel,
}

/// The classifier's output: a tier plus its fixed explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Overall trust tier.
    pub tier: Tier,
    /// True only when both sides are fully verified.
    pub fully_verified: bool,
    /// Per-side summary for display.
    pub summary: Summary,
    /// Deterministic explanation selected from a fixed table.
    pub explanation: &'static str,
}

const EXPLANATION_FULL: &str = "Full end-to-end privacy verified. The agent code is running \
     unmodified in the confidential VM, and all LLM inference happens in the service's \
     confidential computing environment. No operator can read prompts, responses, or modify \
     behavior.";

const EXPLANATION_AGENT_ONLY: &str = "Agent code verified in the confidential VM. LLM service \
     attestation not available; only the TLS channel to the service could be authenticated.";

const EXPLANATION_SERVICE_ONLY: &str = "LLM inference verified in the service's confidential \
     environment. Agent code attestation not available (not running inside the confidential VM).";

const EXPLANATION_NONE: &str = "Attestation not available. The agent appears to be running in \
     development mode outside of confidential environments.";

/// Classify the combined trust level of both attestation sides.
///
/// The tier is the weaker leg's ceiling: a fully measured enclave talking
/// to an unproven service is capped at the service's strength, and the
/// reverse likewise. Hardware proof on the service side requires an
/// attestation payload; a bare authenticated channel counts as partial.
#[must_use]
pub fn classify(enclave: &MeasurementSet, service: &ServiceAttestation) -> Classification {
    let enclave_verified = enclave.is_fully_present();
    let service_verified = service.outcome == ServiceOutcome::Verified;

    let tier = match (enclave_verified, service.outcome) {
        (true, ServiceOutcome::Verified) => Tier::High,
        (true, ServiceOutcome::Partial) => Tier::Medium,
        (true, ServiceOutcome::Unverified) | (false, ServiceOutcome::Verified) => Tier::Low,
        (false, _) => Tier::None,
    };

    let explanation = match (enclave_verified, service_verified) {
        (true, true) => EXPLANATION_FULL,
        (true, false) => EXPLANATION_AGENT_ONLY,
        (false, true) => EXPLANATION_SERVICE_ONLY,
        (false, false) => EXPLANATION_NONE,
    };

    let fully_verified = enclave_verified && service_verified;

    Classification {
        tier,
        fully_verified,
        summary: Summary {
            agent_code: VerifiedFlag::from_bool(enclave_verified),
            llm_inference: VerifiedFlag::from_bool(service_verified),
            end_to_end_privacy: if fully_verified {
                PrivacyLevel::Guaranteed
            } else {
                PrivacyLevel::Partial
            },
        },
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{Measurement, REGISTER_HEX_LEN};
    use crate::service::{CertificateSummary, TlsChannelInfo};
    use chrono::{DateTime, Utc};
    use test_case::test_case;

    fn register(byte: u8) -> Measurement {
        Measurement::parse_exact(&format!("{byte:02x}").repeat(48), REGISTER_HEX_LEN)
            .expect("valid register")
    }

    fn full_set() -> MeasurementSet {
        MeasurementSet {
            mrtd: Some(register(0x11)),
            rtmr0: Some(register(0x22)),
            rtmr1: Some(register(0x33)),
            rtmr2: Some(register(0x44)),
            rtmr3: Some(register(0x55)),
            report_data: None,
            tcb_svn: None,
            collected_at: Utc::now(),
            unavailable_reason: None,
        }
    }

    fn service_with(outcome: ServiceOutcome) -> ServiceAttestation {
        let tls = (outcome != ServiceOutcome::Unverified).then(|| TlsChannelInfo {
            fingerprint_sha256: "ab".repeat(32),
            version: "TLSv1_3".to_string(),
            cipher_suite: "TLS13_AES_256_GCM_SHA384".to_string(),
            certificate: CertificateSummary {
                subject: "CN=inference.example.com".to_string(),
                issuer: "CN=inference.example.com".to_string(),
                not_before: DateTime::from_timestamp(1_700_000_000, 0).expect("ts"),
                not_after: DateTime::from_timestamp(1_800_000_000, 0).expect("ts"),
            },
        });
        ServiceAttestation {
            endpoint: "https://inference.example.com".to_string(),
            model: None,
            tls,
            attestation_payload: (outcome == ServiceOutcome::Verified)
                .then(|| "QUOTEDATA".to_string()),
            outcome,
            error: None,
            collected_at: Utc::now(),
        }
    }

    #[test_case(true, ServiceOutcome::Verified => Tier::High; "both verified")]
    #[test_case(true, ServiceOutcome::Partial => Tier::Medium; "enclave full, service channel only")]
    #[test_case(true, ServiceOutcome::Unverified => Tier::Low; "enclave only")]
    #[test_case(false, ServiceOutcome::Verified => Tier::Low; "service only")]
    #[test_case(false, ServiceOutcome::Partial => Tier::None; "channel alone proves nothing")]
    #[test_case(false, ServiceOutcome::Unverified => Tier::None; "nothing verified")]
    fn tier_table(enclave_full: bool, outcome: ServiceOutcome) -> Tier {
        let enclave = if enclave_full {
            full_set()
        } else {
            MeasurementSet::unavailable("outside the confidential VM")
        };
        classify(&enclave, &service_with(outcome)).tier
    }

    #[test]
    fn weak_service_leg_caps_the_tier() {
        // The tie-break rule: full enclave + partial service is medium,
        // never high.
        let result = classify(&full_set(), &service_with(ServiceOutcome::Partial));
        assert_eq!(result.tier, Tier::Medium);
        assert!(!result.fully_verified);
    }

    #[test]
    fn high_tier_sets_fully_verified() {
        let result = classify(&full_set(), &service_with(ServiceOutcome::Verified));
        assert_eq!(result.tier, Tier::High);
        assert!(result.fully_verified);
        assert_eq!(result.summary.agent_code, VerifiedFlag::Verified);
        assert_eq!(result.summary.llm_inference, VerifiedFlag::Verified);
        assert_eq!(result.summary.end_to_end_privacy, PrivacyLevel::Guaranteed);
        assert_eq!(result.explanation, EXPLANATION_FULL);
    }

    #[test]
    fn unavailable_enclave_with_channel_only_service_is_none() {
        let enclave = MeasurementSet::unavailable("outside the confidential VM");
        let result = classify(&enclave, &service_with(ServiceOutcome::Partial));
        assert_eq!(result.tier, Tier::None);
        assert_eq!(result.summary.agent_code, VerifiedFlag::Unverified);
        assert_eq!(result.summary.llm_inference, VerifiedFlag::Unverified);
        assert_eq!(result.explanation, EXPLANATION_NONE);
    }

    #[test]
    fn partial_enclave_counts_as_unverified() {
        let mut enclave = full_set();
        enclave.rtmr2 = None;
        let result = classify(&enclave, &service_with(ServiceOutcome::Verified));
        assert_eq!(result.tier, Tier::Low);
        assert_eq!(result.explanation, EXPLANATION_SERVICE_ONLY);
    }

    #[test]
    fn explanations_are_deterministic() {
        let a = classify(&full_set(), &service_with(ServiceOutcome::Partial));
        let b = classify(&full_set(), &service_with(ServiceOutcome::Partial));
        assert_eq!(a.explanation, b.explanation);
        assert_eq!(a.explanation, EXPLANATION_AGENT_ONLY);
    }

    #[test]
    fn tier_ordering_matches_trust_strength() {
        assert!(Tier::High > Tier::Medium);
        assert!(Tier::Medium > Tier::Low);
        assert!(Tier::Low > Tier::None);
    }
}

//! The birth certificate record.
//!
//! Created exactly once, at first credential issuance, and read-only
//! thereafter. The record never contains the credential itself, only its
//! one-way hash, and carries its own binding digest over an explicit,
//! ordered field list so any later modification of the stored record is
//! detectable.

use chrono::{DateTime, Utc};
use moltbook_attest::{AttestationView, Digest, Measurement, Tier};
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Current record schema version.
pub const BIRTH_SCHEMA_VERSION: u32 = 1;

const BIRTH_DOMAIN: &[u8] = b"moltbook_birth_certificate_v1";

/// Marker byte hashed for an absent field.
const ABSENT: [u8; 1] = [0x00];
/// Marker byte hashed before a present field's bytes.
const PRESENT: [u8; 1] = [0x01];

/// The raw credential, held only long enough to hash it.
///
/// Wiped from memory on drop; never serialized, never logged.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw credential.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// One-way SHA-256 hash of the credential, lowercase hex.
    ///
    /// This is the only form of the credential that ever leaves this type.
    #[must_use]
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&"[REDACTED]").finish()
    }
}

/// Human-readable identity of the agent being born.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Agent name; also the record key.
    pub name: String,
    /// Short description of the agent.
    pub description: String,
}

impl AgentIdentity {
    /// Create an identity.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Immutable proof that a credential was issued under a known trust state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthCertificate {
    /// Record schema version.
    pub schema_version: u32,
    /// When the credential was issued.
    pub created_at: DateTime<Utc>,
    /// Who was born.
    pub identity: AgentIdentity,
    /// One-way SHA-256 hash of the issued credential, lowercase hex.
    pub credential_sha256: String,
    /// The enclave workload measurement (RTMR3) at the instant of birth.
    /// `None` when the agent was not running inside the confidential VM.
    pub code_measurement_at_birth: Option<Measurement>,
    /// Full attestation view captured at birth, tier included.
    pub snapshot: AttestationView,
    /// Binding digest over the ordered field list
    /// {credential hash, code measurement, snapshot tier, creation time}.
    pub binding: Digest,
}

impl BirthCertificate {
    /// Issue a new certificate from a credential hash and a snapshot.
    ///
    /// The workload measurement is taken from the snapshot's enclave side;
    /// the binding digest is computed over the final field values.
    #[must_use]
    pub fn issue(
        identity: AgentIdentity,
        credential_sha256: String,
        snapshot: AttestationView,
        created_at: DateTime<Utc>,
    ) -> Self {
        let code_measurement_at_birth = snapshot.enclave.rtmr3.clone();
        let binding = Self::compute_binding(
            &credential_sha256,
            code_measurement_at_birth.as_ref(),
            snapshot.tier,
            created_at,
        );
        Self {
            schema_version: BIRTH_SCHEMA_VERSION,
            created_at,
            identity,
            credential_sha256,
            code_measurement_at_birth,
            snapshot,
            binding,
        }
    }

    /// The binding digest over the record's bound fields, in their fixed,
    /// documented order.
    #[must_use]
    pub fn compute_binding(
        credential_sha256: &str,
        code_measurement: Option<&Measurement>,
        tier: Tier,
        created_at: DateTime<Utc>,
    ) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(BIRTH_DOMAIN);
        hasher.update(&BIRTH_SCHEMA_VERSION.to_le_bytes());
        hasher.update(credential_sha256.as_bytes());
        match code_measurement {
            Some(m) => {
                hasher.update(&PRESENT);
                hasher.update(m.as_str().as_bytes());
            }
            None => {
                hasher.update(&ABSENT);
            }
        }
        hasher.update(tier.as_str().as_bytes());
        hasher.update(&created_at.timestamp_micros().to_le_bytes());
        Digest::from(*hasher.finalize().as_bytes())
    }

    /// Whether the stored binding digest matches a recomputation from the
    /// stored fields. A mismatch means the record was modified after it was
    /// written.
    #[must_use]
    pub fn verify_binding(&self) -> bool {
        Self::compute_binding(
            &self.credential_sha256,
            self.code_measurement_at_birth.as_ref(),
            self.snapshot.tier,
            self.created_at,
        ) == self.binding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moltbook_attest::{MeasurementSet, ServiceAttestation};

    const REGISTER_HEX_LEN: usize = 96;

    fn register(byte: u8) -> Measurement {
        Measurement::parse_exact(&format!("{byte:02x}").repeat(48), REGISTER_HEX_LEN)
            .expect("valid register")
    }

    fn snapshot_with_enclave() -> AttestationView {
        let enclave = MeasurementSet {
            mrtd: Some(register(0x11)),
            rtmr0: Some(register(0x22)),
            rtmr1: Some(register(0x33)),
            rtmr2: Some(register(0x44)),
            rtmr3: Some(register(0x55)),
            report_data: None,
            tcb_svn: None,
            collected_at: Utc::now(),
            unavailable_reason: None,
        };
        let service = ServiceAttestation::unverified(
            "https://inference.example.com",
            "attestation quote not available",
        );
        AttestationView::assemble(enclave, service, Utc::now())
    }

    fn snapshot_without_enclave() -> AttestationView {
        AttestationView::assemble(
            MeasurementSet::unavailable("outside the confidential VM"),
            ServiceAttestation::unverified("https://inference.example.com", "refused"),
            Utc::now(),
        )
    }

    fn issue_test_certificate(snapshot: AttestationView) -> BirthCertificate {
        let credential = Credential::new("moltbook-api-key-123");
        BirthCertificate::issue(
            AgentIdentity::new("PrivacyMolt", "privacy-focused agent"),
            credential.sha256_hex(),
            snapshot,
            Utc::now(),
        )
    }

    #[test]
    fn credential_hash_is_stable_and_one_way() {
        let a = Credential::new("secret-key");
        let b = Credential::new("secret-key");
        assert_eq!(a.sha256_hex(), b.sha256_hex());
        assert_eq!(a.sha256_hex().len(), 64);
        assert_ne!(a.sha256_hex(), "secret-key");
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("super-secret");
        let debug = format!("{credential:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn issued_certificate_verifies() {
        let cert = issue_test_certificate(snapshot_with_enclave());
        assert_eq!(cert.schema_version, BIRTH_SCHEMA_VERSION);
        assert!(cert.code_measurement_at_birth.is_some());
        assert!(cert.verify_binding());
    }

    #[test]
    fn certificate_without_enclave_verifies() {
        let cert = issue_test_certificate(snapshot_without_enclave());
        assert!(cert.code_measurement_at_birth.is_none());
        assert!(cert.verify_binding());
    }

    #[test]
    fn tampered_credential_hash_breaks_binding() {
        let mut cert = issue_test_certificate(snapshot_with_enclave());
        cert.credential_sha256 = "00".repeat(32);
        assert!(!cert.verify_binding());
    }

    #[test]
    fn tampered_code_measurement_breaks_binding() {
        let mut cert = issue_test_certificate(snapshot_with_enclave());
        // Flip one byte of the stored measurement.
        let mut hex = cert
            .code_measurement_at_birth
            .as_ref()
            .map(|m| m.as_str().to_string())
            .expect("measurement present");
        hex.replace_range(0..2, "ff");
        cert.code_measurement_at_birth =
            Some(Measurement::parse_exact(&hex, REGISTER_HEX_LEN).expect("hex"));
        assert!(!cert.verify_binding());
    }

    #[test]
    fn erased_code_measurement_breaks_binding() {
        let mut cert = issue_test_certificate(snapshot_with_enclave());
        cert.code_measurement_at_birth = None;
        assert!(!cert.verify_binding());
    }

    #[test]
    fn tampered_timestamp_breaks_binding() {
        let mut cert = issue_test_certificate(snapshot_with_enclave());
        cert.created_at += chrono::Duration::seconds(1);
        assert!(!cert.verify_binding());
    }

    #[test]
    fn serde_round_trip_preserves_binding() {
        let cert = issue_test_certificate(snapshot_with_enclave());
        let json = serde_json::to_vec(&cert).expect("serialize");
        let back: BirthCertificate = serde_json::from_slice(&json).expect("deserialize");
        assert_eq!(cert, back);
        assert!(back.verify_binding());
    }

    proptest::proptest! {
        #[test]
        fn distinct_credentials_bind_differently(a in ".{1,64}", b in ".{1,64}") {
            proptest::prop_assume!(a != b);
            let at = Utc::now();
            let left = BirthCertificate::compute_binding(
                &Credential::new(a).sha256_hex(),
                None,
                Tier::None,
                at,
            );
            let right = BirthCertificate::compute_binding(
                &Credential::new(b).sha256_hex(),
                None,
                Tier::None,
                at,
            );
            proptest::prop_assert_ne!(left, right);
        }
    }
}

//! Canonical digests and the attestation binding.
//!
//! Each side of the attestation is reduced to a 32-byte digest over a
//! canonical, field-ordered byte sequence, and the two digests are bound
//! together with a timestamp. Determinism is the correctness property here:
//! recomputing any digest from the same inputs must be byte-identical, and
//! absent fields must never collide with any present value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AttestError;
use crate::measurement::MeasurementSet;
use crate::service::ServiceAttestation;

const ENCLAVE_DOMAIN: &[u8] = b"moltbook_enclave_measurements_v1";
const SERVICE_DOMAIN: &[u8] = b"moltbook_service_attestation_v1";
const BINDING_DOMAIN: &[u8] = b"moltbook_attestation_binding_v1";

/// Marker byte hashed for an absent field.
const ABSENT: [u8; 1] = [0x00];
/// Marker byte hashed before a present field's length and bytes.
const PRESENT: [u8; 1] = [0x01];

/// A 32-byte canonical digest, displayed and serialized as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// The raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The digest as a lowercase hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a digest from its hex form.
    ///
    /// # Errors
    ///
    /// Returns `AttestError::InvalidMeasurement` if the input is not exactly
    /// 64 hex characters.
    pub fn from_hex(value: &str) -> Result<Self, AttestError> {
        let bytes = hex::decode(value)
            .map_err(|e| AttestError::InvalidMeasurement(format!("digest is not hex: {e}")))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            AttestError::InvalidMeasurement("digest must be 32 bytes".to_string())
        })?;
        Ok(Self(arr))
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

fn update_opt_str(hasher: &mut blake3::Hasher, value: Option<&str>) {
    match value {
        Some(v) => {
            hasher.update(&PRESENT);
            hasher.update(&(v.len() as u64).to_le_bytes());
            hasher.update(v.as_bytes());
        }
        None => {
            hasher.update(&ABSENT);
        }
    }
}

impl MeasurementSet {
    /// Canonical digest over the measurement content.
    ///
    /// Covers every measurement-bearing field in fixed order with explicit
    /// absent markers; collection metadata (timestamp, unavailability
    /// reason) is not part of the identity being digested.
    #[must_use]
    pub fn digest(&self) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ENCLAVE_DOMAIN);
        for (name, field) in self.fields() {
            hasher.update(name.as_bytes());
            update_opt_str(&mut hasher, field.map(|m| m.as_str()));
        }
        Digest(*hasher.finalize().as_bytes())
    }
}

impl ServiceAttestation {
    /// Canonical digest over the collected service evidence.
    #[must_use]
    pub fn digest(&self) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(SERVICE_DOMAIN);
        update_opt_str(&mut hasher, Some(&self.endpoint));
        update_opt_str(&mut hasher, self.model.as_deref());
        hasher.update(self.outcome.as_str().as_bytes());
        match &self.tls {
            Some(tls) => {
                hasher.update(&PRESENT);
                update_opt_str(&mut hasher, Some(&tls.fingerprint_sha256));
                update_opt_str(&mut hasher, Some(&tls.version));
                update_opt_str(&mut hasher, Some(&tls.cipher_suite));
                update_opt_str(&mut hasher, Some(&tls.certificate.subject));
                update_opt_str(&mut hasher, Some(&tls.certificate.issuer));
                hasher.update(&tls.certificate.not_before.timestamp().to_le_bytes());
                hasher.update(&tls.certificate.not_after.timestamp().to_le_bytes());
            }
            None => {
                hasher.update(&ABSENT);
            }
        }
        update_opt_str(&mut hasher, self.attestation_payload.as_deref());
        Digest(*hasher.finalize().as_bytes())
    }
}

/// Bind two per-side digests and a timestamp into one combined digest.
///
/// The inputs are hashed in a fixed, documented order: domain prefix,
/// enclave digest, service digest, timestamp in microseconds. The function
/// is pure and deterministic.
#[must_use]
pub fn bind(enclave: &Digest, service: &Digest, at: DateTime<Utc>) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(BINDING_DOMAIN);
    hasher.update(enclave.as_bytes());
    hasher.update(service.as_bytes());
    hasher.update(&at.timestamp_micros().to_le_bytes());
    Digest(*hasher.finalize().as_bytes())
}

/// The cryptographic binding between the two attestations.
///
/// Proves both sides were evaluated together at one instant, so neither
/// record can later be swapped out without detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationBinding {
    /// Binding format version.
    pub version: u32,
    /// Digest of the enclave-side record.
    pub enclave_digest: Digest,
    /// Digest of the service-side record.
    pub service_digest: Digest,
    /// Combined digest over both sides and the timestamp.
    pub combined: Digest,
    /// When the binding was computed.
    pub bound_at: DateTime<Utc>,
}

impl AttestationBinding {
    /// Current binding format version.
    pub const VERSION: u32 = 1;

    /// Compute the binding for two collected records at the given instant.
    #[must_use]
    pub fn compute(
        enclave: &MeasurementSet,
        service: &ServiceAttestation,
        at: DateTime<Utc>,
    ) -> Self {
        let enclave_digest = enclave.digest();
        let service_digest = service.digest();
        let combined = bind(&enclave_digest, &service_digest, at);
        Self {
            version: Self::VERSION,
            enclave_digest,
            service_digest,
            combined,
            bound_at: at,
        }
    }

    /// Whether the stored combined digest matches a recomputation from the
    /// stored per-side digests and timestamp.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        bind(&self.enclave_digest, &self.service_digest, self.bound_at) == self.combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{Measurement, REGISTER_HEX_LEN};
    use crate::service::{CertificateSummary, ServiceOutcome, TlsChannelInfo};
    use proptest::prelude::*;

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
            report_data: Some(Measurement::parse("deadbeef").expect("hex")),
            tcb_svn: None,
            collected_at: Utc::now(),
            unavailable_reason: None,
        }
    }

    fn service_record() -> ServiceAttestation {
        ServiceAttestation {
            endpoint: "https://inference.example.com".to_string(),
            model: Some("deepseek-r1-70b".to_string()),
            tls: Some(TlsChannelInfo {
                fingerprint_sha256: "ab".repeat(32),
                version: "TLSv1_3".to_string(),
                cipher_suite: "TLS13_AES_256_GCM_SHA384".to_string(),
                certificate: CertificateSummary {
                    subject: "CN=inference.example.com".to_string(),
                    issuer: "CN=inference.example.com".to_string(),
                    not_before: DateTime::from_timestamp(1_700_000_000, 0).expect("ts"),
                    not_after: DateTime::from_timestamp(1_800_000_000, 0).expect("ts"),
                },
            }),
            attestation_payload: Some("QUOTEDATA".to_string()),
            outcome: ServiceOutcome::Verified,
            error: None,
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn enclave_digest_is_deterministic() {
        let set = full_set();
        assert_eq!(set.digest(), set.digest());
    }

    #[test]
    fn enclave_digest_ignores_collection_metadata() {
        let mut a = full_set();
        let mut b = full_set();
        a.collected_at = DateTime::from_timestamp(1_700_000_000, 0).expect("ts");
        b.collected_at = DateTime::from_timestamp(1_700_009_999, 0).expect("ts");
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn changing_any_register_changes_the_digest() {
        let base = full_set();
        for i in 0..5u8 {
            let mut mutated = base.clone();
            let replacement = Some(register(0xee));
            match i {
                0 => mutated.mrtd = replacement,
                1 => mutated.rtmr0 = replacement,
                2 => mutated.rtmr1 = replacement,
                3 => mutated.rtmr2 = replacement,
                _ => mutated.rtmr3 = replacement,
            }
            assert_ne!(base.digest(), mutated.digest(), "register {i} mutation");
        }
    }

    #[test]
    fn absent_field_differs_from_any_value() {
        let base = full_set();
        let mut absent = base.clone();
        absent.rtmr3 = None;
        let mut zeroed = base;
        zeroed.rtmr3 = Some(register(0x00));
        assert_ne!(absent.digest(), zeroed.digest());
        assert_ne!(
            MeasurementSet::unavailable("a").digest(),
            zeroed.digest()
        );
    }

    #[test]
    fn unavailable_sets_share_a_digest() {
        // The reason string is metadata, not measurement content.
        assert_eq!(
            MeasurementSet::unavailable("no TEE").digest(),
            MeasurementSet::unavailable("different reason").digest()
        );
    }

    #[test]
    fn service_digest_tracks_fingerprint() {
        let base = service_record();
        let mut mutated = base.clone();
        if let Some(tls) = &mut mutated.tls {
            tls.fingerprint_sha256 = "cd".repeat(32);
        }
        assert_ne!(base.digest(), mutated.digest());
    }

    #[test]
    fn service_digest_tracks_outcome() {
        let base = service_record();
        let mut mutated = base.clone();
        mutated.outcome = ServiceOutcome::Partial;
        assert_ne!(base.digest(), mutated.digest());
    }

    #[test]
    fn bind_is_deterministic_and_sensitive() {
        let at = DateTime::from_timestamp(1_750_000_000, 0).expect("ts");
        let d1 = full_set().digest();
        let d2 = service_record().digest();

        assert_eq!(bind(&d1, &d2, at), bind(&d1, &d2, at));
        assert_ne!(bind(&d1, &d2, at), bind(&d2, &d1, at));
        assert_ne!(
            bind(&d1, &d2, at),
            bind(&d1, &d2, at + chrono::Duration::microseconds(1))
        );
    }

    #[test]
    fn binding_consistency_round_trip() {
        let binding =
            AttestationBinding::compute(&full_set(), &service_record(), Utc::now());
        assert!(binding.is_consistent());

        let mut tampered = binding;
        tampered.enclave_digest = MeasurementSet::unavailable("x").digest();
        assert!(!tampered.is_consistent());
    }

    #[test]
    fn digest_hex_round_trip() {
        let digest = full_set().digest();
        let parsed = Digest::from_hex(&digest.to_hex()).expect("parse");
        assert_eq!(digest, parsed);
    }

    #[test]
    fn digest_serde_round_trip() {
        let digest = full_set().digest();
        let json = serde_json::to_string(&digest).expect("serialize");
        let back: Digest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(digest, back);
    }

    proptest! {
        #[test]
        fn distinct_register_values_never_collide(a in "[0-9a-f]{96}", b in "[0-9a-f]{96}") {
            prop_assume!(a != b);
            let mut left = full_set();
            let mut right = full_set();
            left.rtmr3 = Some(Measurement::parse_exact(&a, REGISTER_HEX_LEN).expect("hex"));
            right.rtmr3 = Some(Measurement::parse_exact(&b, REGISTER_HEX_LEN).expect("hex"));
            prop_assert_ne!(left.digest(), right.digest());
        }

        #[test]
        fn binding_changes_with_timestamp(micros in 0i64..4_102_444_800_000_000) {
            let at = DateTime::from_timestamp_micros(micros).expect("ts");
            let other = DateTime::from_timestamp_micros(micros + 1).expect("ts");
            let d1 = full_set().digest();
            let d2 = service_record().digest();
            prop_assert_ne!(bind(&d1, &d2, at), bind(&d1, &d2, other));
        }
    }
}

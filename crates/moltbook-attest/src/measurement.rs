//! Enclave boot measurements.
//!
//! The confidential VM exposes Intel TDX layered measurements through its
//! local attestation server. Each register covers one layer of the boot
//! chain; RTMR3 covers the root filesystem and compose file, which is what
//! identifies the agent workload itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AttestError;

/// Hex length of a TDX measurement register (48 bytes).
pub const REGISTER_HEX_LEN: usize = 96;

/// Hex length of the TEE TCB security version field (16 bytes).
pub const TCB_SVN_HEX_LEN: usize = 32;

/// A single fixed-length boot measurement, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Measurement(String);

impl Measurement {
    /// Parse a hex measurement value of any non-zero even length.
    ///
    /// # Errors
    ///
    /// Returns `AttestError::InvalidMeasurement` if the value is empty, has
    /// odd length, or contains non-hex characters.
    pub fn parse(value: &str) -> Result<Self, AttestError> {
        if value.is_empty() {
            return Err(AttestError::InvalidMeasurement(
                "measurement is empty".to_string(),
            ));
        }
        if value.len() % 2 != 0 {
            return Err(AttestError::InvalidMeasurement(format!(
                "measurement has odd hex length {}",
                value.len()
            )));
        }
        if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AttestError::InvalidMeasurement(
                "measurement contains non-hex characters".to_string(),
            ));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Parse a hex measurement that must have exactly `hex_len` characters.
    ///
    /// # Errors
    ///
    /// Returns `AttestError::InvalidMeasurement` on hex or length violations.
    pub fn parse_exact(value: &str, hex_len: usize) -> Result<Self, AttestError> {
        let parsed = Self::parse(value)?;
        if parsed.0.len() != hex_len {
            return Err(AttestError::InvalidMeasurement(format!(
                "expected {hex_len} hex characters, got {}",
                parsed.0.len()
            )));
        }
        Ok(parsed)
    }

    /// The measurement as a lowercase hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verification status of the enclave side, derived from field presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnclaveStatus {
    /// All five measurement registers are present and structurally valid.
    Verified,
    /// Some registers are present but the set is incomplete.
    Partial,
    /// The environment produced no measurements at all.
    Unavailable,
}

impl EnclaveStatus {
    /// Status as a lowercase string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Partial => "partial",
            Self::Unavailable => "unavailable",
        }
    }
}

/// The normalized set of enclave boot measurements.
///
/// Every field is explicitly present or absent. Absence means the
/// environment could not produce the measurement; it never compares equal
/// to any value and never folds into zeros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementSet {
    /// Firmware / TD module hash.
    pub mrtd: Option<Measurement>,
    /// Virtual hardware configuration hash.
    pub rtmr0: Option<Measurement>,
    /// Linux kernel hash.
    pub rtmr1: Option<Measurement>,
    /// Application layer (kernel cmdline, initrd) hash.
    pub rtmr2: Option<Measurement>,
    /// Root filesystem + compose hash — the workload identity register.
    pub rtmr3: Option<Measurement>,
    /// TLS-certificate binding field carried inside the quote.
    pub report_data: Option<Measurement>,
    /// Security version number of the TEE TCB.
    pub tcb_svn: Option<Measurement>,
    /// When these measurements were collected.
    pub collected_at: DateTime<Utc>,
    /// Why the environment reported no measurements, if it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
}

impl MeasurementSet {
    /// An empty set for environments without a confidential VM.
    ///
    /// Every field is explicitly absent; `reason` records why.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            mrtd: None,
            rtmr0: None,
            rtmr1: None,
            rtmr2: None,
            rtmr3: None,
            report_data: None,
            tcb_svn: None,
            collected_at: Utc::now(),
            unavailable_reason: Some(reason.into()),
        }
    }

    /// The five boot-chain registers in their canonical order.
    #[must_use]
    pub fn registers(&self) -> [(&'static str, Option<&Measurement>); 5] {
        [
            ("mrtd", self.mrtd.as_ref()),
            ("rtmr0", self.rtmr0.as_ref()),
            ("rtmr1", self.rtmr1.as_ref()),
            ("rtmr2", self.rtmr2.as_ref()),
            ("rtmr3", self.rtmr3.as_ref()),
        ]
    }

    /// All measurement-bearing fields in their canonical order.
    #[must_use]
    pub fn fields(&self) -> [(&'static str, Option<&Measurement>); 7] {
        [
            ("mrtd", self.mrtd.as_ref()),
            ("rtmr0", self.rtmr0.as_ref()),
            ("rtmr1", self.rtmr1.as_ref()),
            ("rtmr2", self.rtmr2.as_ref()),
            ("rtmr3", self.rtmr3.as_ref()),
            ("report_data", self.report_data.as_ref()),
            ("tcb_svn", self.tcb_svn.as_ref()),
        ]
    }

    /// Whether the full boot chain was measured.
    #[must_use]
    pub fn is_fully_present(&self) -> bool {
        self.registers().iter().all(|(_, m)| m.is_some())
    }

    /// Derive the enclave-side verification status from field presence.
    #[must_use]
    pub fn status(&self) -> EnclaveStatus {
        let present = self.registers().iter().filter(|(_, m)| m.is_some()).count();
        match present {
            5 => EnclaveStatus::Verified,
            0 => EnclaveStatus::Unavailable,
            _ => EnclaveStatus::Partial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(byte: u8) -> Measurement {
        Measurement::parse_exact(&format!("{byte:02x}").repeat(48), REGISTER_HEX_LEN)
            .expect("valid register")
    }

    fn full_set() -> MeasurementSet {
        MeasurementSet {
            mrtd: Some(register(0xaa)),
            rtmr0: Some(register(0xb0)),
            rtmr1: Some(register(0xb1)),
            rtmr2: Some(register(0xb2)),
            rtmr3: Some(register(0xb3)),
            report_data: Some(Measurement::parse("deadbeef").expect("hex")),
            tcb_svn: Some(
                Measurement::parse_exact(&"04".repeat(16), TCB_SVN_HEX_LEN).expect("svn"),
            ),
            collected_at: Utc::now(),
            unavailable_reason: None,
        }
    }

    #[test]
    fn parse_normalizes_to_lowercase() {
        let m = Measurement::parse("DEADBEEF").expect("valid hex");
        assert_eq!(m.as_str(), "deadbeef");
    }

    #[test]
    fn parse_rejects_bad_values() {
        assert!(Measurement::parse("").is_err());
        assert!(Measurement::parse("abc").is_err());
        assert!(Measurement::parse("zzzz").is_err());
    }

    #[test]
    fn parse_exact_enforces_length() {
        let long = "ab".repeat(48);
        assert!(Measurement::parse_exact(&long, REGISTER_HEX_LEN).is_ok());
        assert!(Measurement::parse_exact("abcd", REGISTER_HEX_LEN).is_err());
    }

    #[test]
    fn full_set_is_verified() {
        let set = full_set();
        assert!(set.is_fully_present());
        assert_eq!(set.status(), EnclaveStatus::Verified);
    }

    #[test]
    fn unavailable_set_has_all_fields_absent() {
        let set = MeasurementSet::unavailable("not running inside the confidential VM");
        assert!(set.fields().iter().all(|(_, m)| m.is_none()));
        assert_eq!(set.status(), EnclaveStatus::Unavailable);
        assert!(set.unavailable_reason.is_some());
    }

    #[test]
    fn missing_register_downgrades_to_partial() {
        let mut set = full_set();
        set.rtmr3 = None;
        assert!(!set.is_fully_present());
        assert_eq!(set.status(), EnclaveStatus::Partial);
    }

    #[test]
    fn serde_round_trip() {
        let set = full_set();
        let json = serde_json::to_string(&set).expect("serialize");
        let back: MeasurementSet = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(set, back);
    }
}

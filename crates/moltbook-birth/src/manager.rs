//! Birth certificate lifecycle.
//!
//! The record's lifecycle is `absent -> created -> read-only`. Creation
//! happens exactly once, on the credential-issuance path; every later call
//! is a pure read that re-derives the drift status against a fresh
//! attestation view. There is no transition back: a second creation attempt
//! fails and leaves the existing record untouched.

use chrono::Utc;
use moltbook_attest::AttestationView;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::BirthError;
use crate::record::{AgentIdentity, BirthCertificate, Credential};
use crate::store::RecordStore;

/// What a deployment does when the running code no longer matches the code
/// present at birth.
///
/// Legitimate upgrades change the workload measurement too, so the default
/// is to report the fact and let the operator decide. Stricter deployments
/// can refuse instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Surface the drift as a fact; do not block.
    #[default]
    Report,
    /// Treat drift as fatal in [`BirthRegistry::enforce`].
    Refuse,
}

/// Comparison between the code measurement at birth and the one observed
/// now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CodeChanged {
    /// The running code is the code that was present at birth.
    Unchanged,
    /// The workload measurement differs from the one captured at birth.
    Changed {
        /// Measurement captured at birth.
        birth: String,
        /// Measurement observed now.
        current: String,
    },
    /// No comparison is possible: the agent was not born inside the
    /// confidential VM, or the current environment cannot measure.
    NotApplicable,
}

/// Result of verifying the stored record against a fresh attestation view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthStatus {
    /// The stored, integrity-checked certificate.
    pub certificate: BirthCertificate,
    /// Whether the running code still matches the code present at birth.
    pub code_changed: CodeChanged,
}

/// Owner of the on-disk birth certificate record.
///
/// All other components receive copies; nothing outside [`create`] can
/// alter trust state.
///
/// [`create`]: BirthRegistry::create
pub struct BirthRegistry<S: RecordStore> {
    store: S,
    policy: MismatchPolicy,
}

impl<S: RecordStore> BirthRegistry<S> {
    /// Create a registry with the default report-only mismatch policy.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: MismatchPolicy::default(),
        }
    }

    /// Create a registry with an explicit mismatch policy.
    #[must_use]
    pub fn with_policy(store: S, policy: MismatchPolicy) -> Self {
        Self { store, policy }
    }

    /// The configured mismatch policy.
    #[must_use]
    pub const fn policy(&self) -> MismatchPolicy {
        self.policy
    }

    /// Issue and durably persist the birth certificate for a credential.
    ///
    /// The credential is hashed and the snapshot embedded entirely in
    /// memory before the store is touched, so a cancelled or crashed call
    /// can never leave a partial record. The write is atomic write-if-absent:
    /// once this returns `Ok`, the record is durable. Callers must not hand
    /// the credential out for use before then.
    ///
    /// # Errors
    ///
    /// Returns `BirthError::AlreadyExists` if a certificate was already
    /// created for this identity; the existing record is untouched.
    pub fn create(
        &self,
        identity: AgentIdentity,
        credential: &Credential,
        view: &AttestationView,
    ) -> Result<BirthCertificate, BirthError> {
        let certificate = BirthCertificate::issue(
            identity,
            credential.sha256_hex(),
            view.clone(),
            Utc::now(),
        );

        let bytes = serde_json::to_vec_pretty(&certificate)?;
        self.store
            .put_if_absent(&certificate.identity.name, &bytes)?;

        info!(
            agent = %certificate.identity.name,
            tier = %certificate.snapshot.tier,
            in_enclave = certificate.code_measurement_at_birth.is_some(),
            "birth certificate created"
        );
        Ok(certificate)
    }

    /// Load the stored certificate, check its integrity, and compare the
    /// code measurement at birth against the current view.
    ///
    /// Code drift is reported as a fact, never auto-rejected here; apply
    /// the configured policy with [`enforce`](Self::enforce) when a
    /// deployment wants drift to be fatal.
    ///
    /// # Errors
    ///
    /// Returns `BirthError::NotFound` when no certificate exists (expected
    /// for freshly registered agents) and `BirthError::CorruptRecord` when
    /// the stored record fails parsing or its binding digest does not match
    /// a recomputation, meaning the record was modified after it was written.
    pub fn verify(
        &self,
        agent_name: &str,
        current: &AttestationView,
    ) -> Result<BirthStatus, BirthError> {
        let certificate = self
            .load(agent_name)?
            .ok_or_else(|| BirthError::NotFound(agent_name.to_string()))?;

        if !certificate.verify_binding() {
            warn!(agent = %agent_name, "birth certificate binding digest mismatch");
            return Err(BirthError::CorruptRecord(
                "binding digest does not match stored fields".to_string(),
            ));
        }

        let code_changed = match (
            &certificate.code_measurement_at_birth,
            &current.enclave.rtmr3,
        ) {
            (None, _) | (Some(_), None) => CodeChanged::NotApplicable,
            (Some(birth), Some(now)) if birth == now => CodeChanged::Unchanged,
            (Some(birth), Some(now)) => CodeChanged::Changed {
                birth: birth.as_str().to_string(),
                current: now.as_str().to_string(),
            },
        };

        Ok(BirthStatus {
            certificate,
            code_changed,
        })
    }

    /// Apply the configured mismatch policy to a verification result.
    ///
    /// # Errors
    ///
    /// Under [`MismatchPolicy::Refuse`], returns `BirthError::CodeMismatch`
    /// when the status reports changed code. Always `Ok` under
    /// [`MismatchPolicy::Report`].
    pub fn enforce(&self, status: &BirthStatus) -> Result<(), BirthError> {
        if self.policy == MismatchPolicy::Refuse {
            if let CodeChanged::Changed { birth, current } = &status.code_changed {
                return Err(BirthError::CodeMismatch {
                    birth: birth.clone(),
                    current: current.clone(),
                });
            }
        }
        Ok(())
    }

    /// Read-only record query for the monitoring surface. `None` when no
    /// certificate has been created yet.
    ///
    /// # Errors
    ///
    /// Returns `BirthError::CorruptRecord` if a stored record fails parsing
    /// and `BirthError::Storage` on I/O failure.
    pub fn certificate(&self, agent_name: &str) -> Result<Option<BirthCertificate>, BirthError> {
        self.load(agent_name)
    }

    fn load(&self, agent_name: &str) -> Result<Option<BirthCertificate>, BirthError> {
        match self.store.read(agent_name)? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| BirthError::CorruptRecord(format!("unparseable record: {e}"))),
        }
    }
}

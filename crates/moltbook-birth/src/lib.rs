//! # moltbook-birth
//!
//! Birth certificate for the Moltbook agent's credential.
//!
//! The agent's API credential is born exactly once, inside the confidential
//! VM. This crate snapshots the trust state present at that instant into an
//! immutable record, the birth certificate, and on every later read
//! compares the stored snapshot against a fresh attestation view so that
//! tampering and code drift are detectable.
//!
//! The record stores a one-way hash of the credential, never the credential
//! itself, and carries a binding digest over its own fields so modification
//! of the stored record is detected as [`BirthError::CorruptRecord`].
//!
//! ## Quick Start
//!
//! ```rust
//! use moltbook_attest::{AttestationView, MeasurementSet, ServiceAttestation};
//! use moltbook_birth::{AgentIdentity, BirthRegistry, CodeChanged, Credential, MemoryStore};
//!
//! # fn run() -> Result<(), moltbook_birth::BirthError> {
//! let view = AttestationView::assemble(
//!     MeasurementSet::unavailable("outside the confidential VM"),
//!     ServiceAttestation::unverified("https://inference.example.com", "refused"),
//!     chrono::Utc::now(),
//! );
//!
//! let registry = BirthRegistry::new(MemoryStore::new());
//! let credential = Credential::new("moltbook-api-key");
//!
//! // Exactly once, at first credential issuance:
//! registry.create(
//!     AgentIdentity::new("PrivacyMolt", "privacy-focused agent"),
//!     &credential,
//!     &view,
//! )?;
//!
//! // Any time later:
//! let status = registry.verify("PrivacyMolt", &view)?;
//! assert_eq!(status.code_changed, CodeChanged::NotApplicable);
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod manager;
pub mod record;
pub mod store;

pub use error::BirthError;
pub use manager::{BirthRegistry, BirthStatus, CodeChanged, MismatchPolicy};
pub use record::{AgentIdentity, BirthCertificate, Credential, BIRTH_SCHEMA_VERSION};
pub use store::{FileStore, MemoryStore, RecordStore};

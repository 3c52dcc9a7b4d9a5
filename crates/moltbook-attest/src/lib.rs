//! # moltbook-attest
//!
//! Live TEE attestation for the Moltbook agent.
//!
//! This crate provides:
//!
//! - Measurement collection — enclave boot measurements from the local
//!   attestation server, TLS/quote evidence from the remote inference
//!   service
//! - Digest & binding calculation — canonical per-side digests and the
//!   combined binding digest proving both sides were evaluated together
//! - Quality classification — a discrete trust tier with a fixed,
//!   deterministic explanation
//!
//! The whole engine is an on-demand computation: collect, digest, classify,
//! return. Nothing is cached and nothing is mutated, so a view is always a
//! faithful reading of the trust state at one instant.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use moltbook_attest::{collect_view, CollectorConfig};
//!
//! # async fn run() -> Result<(), moltbook_attest::AttestError> {
//! let config = CollectorConfig::new("https://inference.example.com");
//! let view = collect_view(&config).await?;
//!
//! println!("tier: {}", view.tier);
//! println!("{}", view.explanation);
//! # Ok(())
//! # }
//! ```
//!
//! Assembly from already-collected records is pure and synchronous:
//!
//! ```rust
//! use chrono::Utc;
//! use moltbook_attest::{AttestationView, MeasurementSet, ServiceAttestation, Tier};
//!
//! let enclave = MeasurementSet::unavailable("outside the confidential VM");
//! let service = ServiceAttestation::unverified(
//!     "https://inference.example.com",
//!     "connection refused",
//! );
//!
//! let view = AttestationView::assemble(enclave, service, Utc::now());
//! assert_eq!(view.tier, Tier::None);
//! assert!(view.binding.is_consistent());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod digest;
pub mod error;
pub mod measurement;
pub mod quality;
pub mod quote;
pub mod service;
pub mod view;

pub use config::CollectorConfig;
pub use digest::{bind, AttestationBinding, Digest};
pub use error::AttestError;
pub use measurement::{EnclaveStatus, Measurement, MeasurementSet};
pub use quality::{classify, Classification, PrivacyLevel, Summary, Tier, VerifiedFlag};
pub use quote::collect_enclave_measurements;
pub use service::{
    collect_service_attestation, CertificateSummary, ServiceAttestation, ServiceOutcome,
    TlsChannelInfo,
};
pub use view::{collect_view, AttestationView};

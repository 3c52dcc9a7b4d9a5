//! Remote inference service attestation.
//!
//! Two pieces of evidence are collected about the inference endpoint: the
//! TLS channel itself (certificate fingerprint, negotiated version, cipher
//! suite, certificate fields) and, when the service exposes one, a raw
//! hardware attestation quote on its well-known attestation port.
//!
//! The channel probe performs its own handshake with a capture-only
//! certificate verifier: attestation endpoints present self-signed
//! certificates, and the point of the probe is to record exactly what was
//! presented, not to chain it to a public CA.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};
use url::Url;
use x509_parser::prelude::*;

use crate::config::CollectorConfig;
use crate::error::AttestError;
use crate::quote::extract_quote_block;

/// Longest attestation payload excerpt retained for display.
const MAX_PAYLOAD_LEN: usize = 500;

/// Verification outcome for the service side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceOutcome {
    /// TLS channel authenticated and a hardware attestation payload obtained.
    Verified,
    /// TLS channel authenticated but no hardware-level proof was obtainable.
    Partial,
    /// Neither channel nor hardware evidence could be obtained.
    Unverified,
}

impl ServiceOutcome {
    /// Outcome as a lowercase string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Partial => "partial",
            Self::Unverified => "unverified",
        }
    }
}

/// Fields extracted from the service's X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSummary {
    /// Certificate subject.
    pub subject: String,
    /// Certificate issuer.
    pub issuer: String,
    /// Start of the validity window.
    pub not_before: DateTime<Utc>,
    /// End of the validity window.
    pub not_after: DateTime<Utc>,
}

/// What the TLS handshake with the service actually negotiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsChannelInfo {
    /// SHA-256 fingerprint of the presented certificate, lowercase hex.
    pub fingerprint_sha256: String,
    /// Negotiated TLS protocol version.
    pub version: String,
    /// Negotiated cipher suite.
    pub cipher_suite: String,
    /// Summary of the presented certificate.
    pub certificate: CertificateSummary,
}

/// Normalized attestation record for the remote inference service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAttestation {
    /// The endpoint this record describes.
    pub endpoint: String,
    /// Model identifier, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// TLS channel evidence, absent when the handshake failed.
    pub tls: Option<TlsChannelInfo>,
    /// Raw attestation payload excerpt, when the service exposed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_payload: Option<String>,
    /// Verification outcome for this side.
    pub outcome: ServiceOutcome,
    /// Why verification fell short, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When this evidence was collected.
    pub collected_at: DateTime<Utc>,
}

impl ServiceAttestation {
    /// A record for a service that could not be reached at all.
    #[must_use]
    pub fn unverified(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: None,
            tls: None,
            attestation_payload: None,
            outcome: ServiceOutcome::Unverified,
            error: Some(reason.into()),
            collected_at: Utc::now(),
        }
    }
}

/// Collect TLS and attestation evidence from the remote inference service.
///
/// The call performs one TLS handshake against the endpoint and one HTTP
/// fetch of the well-known quote page on the attestation port. Both are
/// bounded by the configured timeout; neither is retried. A reachable
/// channel without a quote yields a `Partial` outcome: the channel was
/// authenticated but no hardware-level proof of the remote enclave exists.
///
/// # Errors
///
/// Returns `AttestError::Network` or `AttestError::Timeout` when the TLS
/// handshake itself fails; callers fold these into a degraded view.
pub async fn collect_service_attestation(
    config: &CollectorConfig,
) -> Result<ServiceAttestation, AttestError> {
    let (host, port) = endpoint_host_port(&config.service_endpoint)?;

    let tls = probe_tls_channel(&host, port, config.timeout_secs).await?;
    debug!(fingerprint = %tls.fingerprint_sha256, version = %tls.version, "service TLS channel probed");

    let (attestation_payload, outcome, error) = match fetch_service_quote(config, &host).await {
        Ok(payload) => (Some(payload), ServiceOutcome::Verified, None),
        Err(e) => {
            warn!(error = %e, "service attestation quote not available, channel evidence only");
            (
                None,
                ServiceOutcome::Partial,
                Some(format!("attestation quote not available: {e}")),
            )
        }
    };

    Ok(ServiceAttestation {
        endpoint: config.service_endpoint.clone(),
        model: config.service_model.clone(),
        tls: Some(tls),
        attestation_payload,
        outcome,
        error,
        collected_at: Utc::now(),
    })
}

fn endpoint_host_port(endpoint: &str) -> Result<(String, u16), AttestError> {
    let url = Url::parse(endpoint)
        .map_err(|e| AttestError::Config(format!("invalid service endpoint '{endpoint}': {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| {
            AttestError::Config(format!("service endpoint '{endpoint}' has no host"))
        })?
        .to_string();
    let port = url.port().unwrap_or(443);
    Ok((host, port))
}

/// Handshake with the endpoint and capture what it presented.
async fn probe_tls_channel(
    host: &str,
    port: u16,
    timeout_secs: u64,
) -> Result<TlsChannelInfo, AttestError> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let tls_config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(CaptureVerifier))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));

    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|e| AttestError::Network(format!("invalid server name '{host}': {e}")))?;

    let timeout = std::time::Duration::from_secs(timeout_secs);
    let tcp = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| AttestError::Timeout(timeout_secs))?
        .map_err(|e| AttestError::Network(format!("cannot connect to {host}:{port}: {e}")))?;

    let stream = tokio::time::timeout(timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| AttestError::Timeout(timeout_secs))?
        .map_err(|e| AttestError::Network(format!("TLS handshake with {host}:{port} failed: {e}")))?;

    let (_, conn) = stream.get_ref();

    let cert_der = conn
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| {
            AttestError::Network(format!("{host}:{port} presented no certificate"))
        })?;

    let fingerprint_sha256 = hex::encode(Sha256::digest(cert_der.as_ref()));
    let certificate = summarize_certificate(cert_der.as_ref())?;

    let version = conn
        .protocol_version()
        .map_or_else(|| "unknown".to_string(), |v| format!("{v:?}"));
    let cipher_suite = conn
        .negotiated_cipher_suite()
        .map_or_else(|| "unknown".to_string(), |s| format!("{:?}", s.suite()));

    Ok(TlsChannelInfo {
        fingerprint_sha256,
        version,
        cipher_suite,
        certificate,
    })
}

fn summarize_certificate(der: &[u8]) -> Result<CertificateSummary, AttestError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| AttestError::MalformedQuote(format!("unparseable certificate: {e}")))?;

    let not_before = DateTime::<Utc>::from_timestamp(cert.validity().not_before.timestamp(), 0)
        .ok_or_else(|| {
            AttestError::MalformedQuote("certificate not_before out of range".to_string())
        })?;
    let not_after = DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| {
            AttestError::MalformedQuote("certificate not_after out of range".to_string())
        })?;

    Ok(CertificateSummary {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_before,
        not_after,
    })
}

/// Fetch the raw attestation quote from the service's attestation port.
async fn fetch_service_quote(config: &CollectorConfig, host: &str) -> Result<String, AttestError> {
    let url = format!(
        "https://{host}:{}{}",
        config.service_attestation_port, config.quote_path
    );

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(config.timeout())
        .build()
        .map_err(|e| AttestError::Network(format!("failed to build HTTP client: {e}")))?;

    let mut request = client.get(&url);
    if let Some(key) = &config.service_api_key {
        request = request
            .bearer_auth(key)
            .header("X-API-Key", key.as_str());
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            AttestError::Timeout(config.timeout_secs)
        } else {
            AttestError::Network(format!("attestation fetch from {url} failed: {e}"))
        }
    })?;

    if !response.status().is_success() {
        return Err(AttestError::Network(format!(
            "attestation endpoint returned HTTP {}",
            response.status()
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| AttestError::Network(format!("failed to read attestation page: {e}")))?;

    Ok(truncate_payload(
        &extract_quote_block(&body).unwrap_or(body),
    ))
}

fn truncate_payload(payload: &str) -> String {
    if payload.len() > MAX_PAYLOAD_LEN {
        let cut = payload
            .char_indices()
            .take_while(|(i, _)| *i < MAX_PAYLOAD_LEN)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}...", &payload[..cut])
    } else {
        payload.to_string()
    }
}

/// Accepts whatever certificate the peer presents so the handshake completes
/// and the certificate can be recorded. Trust decisions happen downstream on
/// the recorded evidence, not in the probe.
#[derive(Debug)]
struct CaptureVerifier;

impl rustls::client::danger::ServerCertVerifier for CaptureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

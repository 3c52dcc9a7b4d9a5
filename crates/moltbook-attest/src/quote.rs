//! Enclave quote collection.
//!
//! The confidential VM runs a local attestation server that renders the CPU
//! quote as an HTML page. The collector fetches that page, extracts the
//! measurement registers by anchored pattern, and normalizes them into a
//! [`MeasurementSet`].
//!
//! A missing attestation server is not an error: it means the agent is not
//! running inside the confidential VM, and the collector reports an
//! explicitly-absent measurement set so classification can still run.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::CollectorConfig;
use crate::error::AttestError;
use crate::measurement::{Measurement, MeasurementSet, REGISTER_HEX_LEN, TCB_SVN_HEX_LEN};

static MRTD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)MRTD[:\s]+([a-fA-F0-9]+)").unwrap_or_else(|_| unreachable!())
});
static RTMR0_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)RTMR0[:\s]+([a-fA-F0-9]+)").unwrap_or_else(|_| unreachable!())
});
static RTMR1_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)RTMR1[:\s]+([a-fA-F0-9]+)").unwrap_or_else(|_| unreachable!())
});
static RTMR2_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)RTMR2[:\s]+([a-fA-F0-9]+)").unwrap_or_else(|_| unreachable!())
});
static RTMR3_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)RTMR3[:\s]+([a-fA-F0-9]+)").unwrap_or_else(|_| unreachable!())
});
static REPORT_DATA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)reportdata[:\s]+([a-fA-F0-9]+)").unwrap_or_else(|_| unreachable!())
});
static TCB_SVN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)TCB[_\s]?SVN[:\s]+([a-fA-F0-9]+)").unwrap_or_else(|_| unreachable!())
});
static QUOTE_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<pre[^>]*id="quoteTextarea"[^>]*>(.*?)</pre>"#)
        .unwrap_or_else(|_| unreachable!())
});

/// Extract the raw quote block from an attestation server HTML page.
pub(crate) fn extract_quote_block(html: &str) -> Option<String> {
    QUOTE_BLOCK_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn capture_register(re: &Regex, html: &str) -> Option<String> {
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_register(
    name: &str,
    raw: Option<String>,
    hex_len: usize,
) -> Result<Option<Measurement>, AttestError> {
    match raw {
        None => Ok(None),
        Some(value) => Measurement::parse_exact(&value, hex_len)
            .map(Some)
            .map_err(|e| AttestError::MalformedQuote(format!("{name}: {e}"))),
    }
}

/// Parse the quote page into a measurement set.
///
/// A page with no recognizable registers is malformed: the server answered
/// but did not produce a quote. Individual absent fields are fine.
///
/// # Errors
///
/// Returns `AttestError::MalformedQuote` if no register can be found or a
/// found register fails hex/length validation.
pub fn parse_quote_page(html: &str) -> Result<MeasurementSet, AttestError> {
    let mrtd = capture_register(&MRTD_RE, html);
    let rtmr0 = capture_register(&RTMR0_RE, html);
    let rtmr1 = capture_register(&RTMR1_RE, html);
    let rtmr2 = capture_register(&RTMR2_RE, html);
    let rtmr3 = capture_register(&RTMR3_RE, html);
    let report_data = capture_register(&REPORT_DATA_RE, html);
    let tcb_svn = capture_register(&TCB_SVN_RE, html);

    if [&mrtd, &rtmr0, &rtmr1, &rtmr2, &rtmr3]
        .iter()
        .all(|r| r.is_none())
    {
        return Err(AttestError::MalformedQuote(
            "attestation page contains no measurement registers".to_string(),
        ));
    }

    Ok(MeasurementSet {
        mrtd: parse_register("mrtd", mrtd, REGISTER_HEX_LEN)?,
        rtmr0: parse_register("rtmr0", rtmr0, REGISTER_HEX_LEN)?,
        rtmr1: parse_register("rtmr1", rtmr1, REGISTER_HEX_LEN)?,
        rtmr2: parse_register("rtmr2", rtmr2, REGISTER_HEX_LEN)?,
        rtmr3: parse_register("rtmr3", rtmr3, REGISTER_HEX_LEN)?,
        report_data: match report_data {
            None => None,
            Some(value) => Some(
                Measurement::parse(&value)
                    .map_err(|e| AttestError::MalformedQuote(format!("report_data: {e}")))?,
            ),
        },
        tcb_svn: parse_register("tcb_svn", tcb_svn, TCB_SVN_HEX_LEN)?,
        collected_at: chrono::Utc::now(),
        unavailable_reason: None,
    })
}

/// Collect the enclave's boot measurements from the local attestation server.
///
/// The call is side-effect-free beyond the HTTP read, bounded by the
/// configured timeout, and never retries. When the attestation server is
/// unreachable (the expected state outside the confidential VM), an
/// explicitly-absent [`MeasurementSet`] is returned instead of an error.
///
/// # Errors
///
/// Returns `AttestError::MalformedQuote` if the server answered with data
/// that fails structural parsing, `AttestError::Timeout` if the bounded
/// timeout elapsed, or `AttestError::Network` for other transport failures.
pub async fn collect_enclave_measurements(
    config: &CollectorConfig,
) -> Result<MeasurementSet, AttestError> {
    let url = format!(
        "{}{}",
        config.enclave_attestation_url.trim_end_matches('/'),
        config.quote_path
    );

    match fetch_quote_page(&url, config).await {
        Ok(html) => {
            let set = parse_quote_page(&html)?;
            debug!(status = set.status().as_str(), "collected enclave measurements");
            Ok(set)
        }
        Err(AttestError::Unavailable(reason)) => {
            warn!(%reason, "enclave attestation server unavailable");
            Ok(MeasurementSet::unavailable(reason))
        }
        Err(e) => Err(e),
    }
}

async fn fetch_quote_page(url: &str, config: &CollectorConfig) -> Result<String, AttestError> {
    // The local attestation server uses a self-signed certificate; the quote
    // itself carries the integrity evidence.
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(config.timeout())
        .build()
        .map_err(|e| AttestError::Network(format!("failed to build HTTP client: {e}")))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AttestError::Timeout(config.timeout_secs)
        } else if e.is_connect() {
            AttestError::Unavailable(format!("cannot reach attestation server at {url}: {e}"))
        } else {
            AttestError::Network(format!("quote fetch failed: {e}"))
        }
    })?;

    if !response.status().is_success() {
        return Err(AttestError::Network(format!(
            "attestation server returned HTTP {}",
            response.status()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| AttestError::Network(format!("failed to read quote page: {e}")))
}

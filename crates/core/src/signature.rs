//! Request signature verification for inbound platform webhooks.
//!
//! The platform signs `v0:{timestamp}:{raw body}` with HMAC-SHA256 using the shared
//! signing secret and sends the hex digest as `v0={digest}`. Requests older (or newer)
//! than [`MAX_TIMESTAMP_SKEW_SECS`] are rejected to defeat replays.

use std::fmt;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_VERSION: &str = "v0";
pub const MAX_TIMESTAMP_SKEW_SECS: i64 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationResult {
    Ok,
    MissingHeaders,
    StaleTimestamp,
    SignatureMismatch,
}

impl VerificationResult {
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn reason_code(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::MissingHeaders => "missing_headers",
            Self::StaleTimestamp => "stale_timestamp",
            Self::SignatureMismatch => "signature_mismatch",
        }
    }

    pub fn into_result(self) -> Result<(), VerificationError> {
        match self {
            Self::Ok => Ok(()),
            Self::MissingHeaders => Err(VerificationError::MissingHeaders),
            Self::StaleTimestamp => Err(VerificationError::StaleTimestamp),
            Self::SignatureMismatch => Err(VerificationError::SignatureMismatch),
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason_code())
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("request timestamp or signature header is missing")]
    MissingHeaders,
    #[error("request timestamp is outside the accepted window")]
    StaleTimestamp,
    #[error("request signature does not match")]
    SignatureMismatch,
}

/// Source of "now" in unix seconds.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.0
    }
}

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier").field("secret", &"[REDACTED]").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self::with_clock(secret, Arc::new(SystemClock))
    }

    pub fn with_clock(secret: SecretString, clock: Arc<dyn Clock>) -> Self {
        Self { secret, clock }
    }

    pub fn now_unix(&self) -> i64 {
        self.clock.now_unix()
    }

    /// Checks headers, freshness and signature, in that order.
    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> VerificationResult {
        let timestamp = timestamp.map(str::trim).filter(|value| !value.is_empty());
        let signature = signature.map(str::trim).filter(|value| !value.is_empty());
        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            return VerificationResult::MissingHeaders;
        };

        let Ok(sent_at) = timestamp.parse::<i64>() else {
            return VerificationResult::StaleTimestamp;
        };
        if self.clock.now_unix().abs_diff(sent_at) > MAX_TIMESTAMP_SKEW_SECS.unsigned_abs() {
            return VerificationResult::StaleTimestamp;
        }

        let Some(provided) = signature
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
            .and_then(|digest| hex::decode(digest).ok())
        else {
            return VerificationResult::SignatureMismatch;
        };

        let Some(mac) = self.mac_for(timestamp, raw_body) else {
            return VerificationResult::SignatureMismatch;
        };
        match mac.verify_slice(&provided) {
            Ok(()) => VerificationResult::Ok,
            Err(_) => VerificationResult::SignatureMismatch,
        }
    }

    /// Produces the `v0=` signature the platform would send for this request.
    pub fn sign(&self, timestamp: &str, raw_body: &[u8]) -> String {
        let digest = self
            .mac_for(timestamp, raw_body)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default();
        format!("{SIGNATURE_VERSION}={digest}")
    }

    fn mac_for(&self, timestamp: &str, raw_body: &[u8]) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()).ok()?;
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(raw_body);
        Some(mac)
    }
}

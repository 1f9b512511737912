//! Webhook signature verification.
//!
//! HMAC-SHA256 over `"{timestamp}.{payload}"`, delivered in a header of the
//! form `t=<unix>,v1=<hex>[,v1=<hex>...]`. Timestamps are bounded to stop
//! replays.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::WebhookError;

/// Default maximum age for webhook events (5 minutes).
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Maximum allowed clock skew for future events (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components of the signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// Every `v1` entry; the gateway sends several while rotating secrets.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses `t=<timestamp>,v1=<signature>[,...]`, ignoring unknown keys.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::ParseError` if the header format is invalid.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        if header.trim().is_empty() {
            return Err(WebhookError::ParseError("missing signature header".to_string()));
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid header format".to_string()))?;

            match key.trim() {
                "t" => {
                    timestamp = Some(value.trim().parse().map_err(|_| {
                        WebhookError::ParseError("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    let signature = hex_decode(value.trim()).ok_or_else(|| {
                        WebhookError::ParseError("invalid v1 signature hex".to_string())
                    })?;
                    v1_signatures.push(signature);
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::ParseError("missing v1 signature".to_string()));
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

/// Verifies webhook signatures against the shared signing secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"[REDACTED]")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Checks the header against the payload at `now_unix`.
    ///
    /// # Errors
    ///
    /// - `ParseError` if the header is malformed
    /// - `TimestampOutOfRange` if older than the tolerance
    /// - `InvalidTimestamp` if too far in the future
    /// - `InvalidSignature` if no `v1` signature matches
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
        now_unix: i64,
    ) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;

        let age = now_unix - header.timestamp;
        if age > self.tolerance_secs {
            return Err(WebhookError::TimestampOutOfRange);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookError::InvalidTimestamp);
        }

        let expected = compute_signature(self.secret.expose_secret(), header.timestamp, payload)?;
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate));

        if matched {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }
}

fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Builds a valid signature header, for fixtures and local replay tools.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let signature = compute_signature(secret, timestamp, payload)
        .map(|bytes| hex_encode(&bytes))
        .unwrap_or_default();
    format!("t={},v1={}", timestamp, signature)
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "whsec_test_secret_12345";
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"invoice.payment_succeeded"}"#;
    const NOW: i64 = 1_760_000_000;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(SecretString::new(TEST_SECRET.to_string()))
    }

    // ══════════════════════════════════════════════════════════════
    // Header parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parse_header_with_single_v1() {
        let header = SignatureHeader::parse(&format!("t=1234567890,v1={}", "a".repeat(64))).unwrap();
        assert_eq!(header.timestamp, 1234567890);
        assert_eq!(header.v1_signatures.len(), 1);
        assert_eq!(header.v1_signatures[0].len(), 32);
    }

    #[test]
    fn parse_header_collects_every_v1_and_ignores_unknown_keys() {
        let raw = format!("t=1,v1={},v0={},v1={}", "a".repeat(64), "b".repeat(64), "c".repeat(64));
        let header = SignatureHeader::parse(&raw).unwrap();
        assert_eq!(header.v1_signatures.len(), 2);
    }

    #[test]
    fn parse_header_rejects_malformed_input() {
        for raw in ["", "t=1", "v1=aa", "t=x,v1=aa", "t=1,v1=zz", "t=1,v1=abc", "t1"] {
            assert!(
                matches!(SignatureHeader::parse(raw), Err(WebhookError::ParseError(_))),
                "{}",
                raw
            );
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Verification
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn valid_signature_verifies() {
        let header = sign_payload(TEST_SECRET, NOW, PAYLOAD);
        assert!(verifier().verify(PAYLOAD, &header, NOW).is_ok());
    }

    #[test]
    fn rotated_secret_second_signature_verifies() {
        let good = sign_payload(TEST_SECRET, NOW, PAYLOAD);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "a".repeat(64), good_sig);
        assert!(verifier().verify(PAYLOAD, &header, NOW).is_ok());
    }

    #[test]
    fn wrong_secret_fails() {
        let header = sign_payload("whsec_other", NOW, PAYLOAD);
        assert_eq!(
            verifier().verify(PAYLOAD, &header, NOW),
            Err(WebhookError::InvalidSignature)
        );
    }

    #[test]
    fn tampered_payload_fails() {
        let header = sign_payload(TEST_SECRET, NOW, PAYLOAD);
        assert_eq!(
            verifier().verify(br#"{"id":"evt_2"}"#, &header, NOW),
            Err(WebhookError::InvalidSignature)
        );
    }

    #[test]
    fn old_event_is_rejected() {
        let header = sign_payload(TEST_SECRET, NOW - 301, PAYLOAD);
        assert_eq!(
            verifier().verify(PAYLOAD, &header, NOW),
            Err(WebhookError::TimestampOutOfRange)
        );
    }

    #[test]
    fn event_at_tolerance_edge_is_accepted() {
        let header = sign_payload(TEST_SECRET, NOW - 300, PAYLOAD);
        assert!(verifier().verify(PAYLOAD, &header, NOW).is_ok());
    }

    #[test]
    fn custom_tolerance_applies() {
        let header = sign_payload(TEST_SECRET, NOW - 100, PAYLOAD);
        assert_eq!(
            verifier().with_tolerance(60).verify(PAYLOAD, &header, NOW),
            Err(WebhookError::TimestampOutOfRange)
        );
    }

    #[test]
    fn future_event_beyond_skew_is_rejected() {
        let header = sign_payload(TEST_SECRET, NOW + 61, PAYLOAD);
        assert_eq!(
            verifier().verify(PAYLOAD, &header, NOW),
            Err(WebhookError::InvalidTimestamp)
        );
    }

    #[test]
    fn debug_output_redacts_secret() {
        let rendered = format!("{:?}", verifier());
        assert!(!rendered.contains(TEST_SECRET));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn hex_helpers_roundtrip() {
        let bytes = vec![0x00, 0x7f, 0xff, 0x10];
        assert_eq!(hex_decode(&hex_encode(&bytes)), Some(bytes));
    }
}

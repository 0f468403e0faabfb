use crate::error::AppError;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Stripe allows five minutes of clock skew on webhook signatures.
const STRIPE_TOLERANCE_SECS: i64 = 5 * 60;
/// ElevenLabs replay window: requests older than 30 minutes are rejected.
const ELEVENLABS_TOLERANCE_SECS: i64 = 30 * 60;

fn signature_parts<'a>(header: &'a str, hash_key: &str) -> (Option<i64>, Option<&'a str>) {
    let mut timestamp = None;
    let mut hash = None;
    for part in header.split(',') {
        if let Some((k, v)) = part.trim().split_once('=') {
            if k == "t" {
                timestamp = v.parse().ok();
            } else if k == hash_key {
                hash = Some(v);
            }
        }
    }
    (timestamp, hash)
}

fn verify_hmac(secret: &str, message: &str, expected_hex: &str) -> Result<(), AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::BadSignature("invalid webhook secret"))?;
    mac.update(message.as_bytes());
    let expected = hex::decode(expected_hex)
        .map_err(|_| AppError::BadSignature("signature is not valid hex"))?;
    // verify_slice is constant-time
    mac.verify_slice(&expected)
        .map_err(|_| AppError::BadSignature("signature mismatch"))
}

/// Verify a `stripe-signature` header (`t=<unix>,v1=<hex>`): HMAC-SHA256 over
/// `"{t}.{body}"`, five-minute tolerance.
pub fn verify_stripe_signature(
    body: &str,
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), AppError> {
    let (timestamp, hash) = signature_parts(header, "v1");
    let timestamp = timestamp.ok_or(AppError::BadSignature("missing timestamp"))?;
    let hash = hash.ok_or(AppError::BadSignature("missing v1 component"))?;

    if (now_unix - timestamp).abs() > STRIPE_TOLERANCE_SECS {
        return Err(AppError::BadSignature("timestamp outside tolerance"));
    }

    verify_hmac(secret, &format!("{timestamp}.{body}"), hash)
}

/// Verify an `ElevenLabs-Signature` header (`t=<unix>,v0=<hex>`): HMAC-SHA256
/// over `"{t}.{body}"`, 30-minute replay window.  Auth failures here surface
/// as 401, matching the provider's retry semantics.
pub fn verify_elevenlabs_signature(
    body: &str,
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), AppError> {
    let (timestamp, hash) = signature_parts(header, "v0");
    let (timestamp, hash) = match (timestamp, hash) {
        (Some(t), Some(h)) => (t, h),
        _ => return Err(AppError::Unauthorized),
    };

    if now_unix - timestamp > ELEVENLABS_TOLERANCE_SECS {
        return Err(AppError::Unauthorized);
    }

    verify_hmac(secret, &format!("{timestamp}.{body}"), hash).map_err(|_| AppError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const BODY: &str = r#"{"type":"post_call_audio","data":{}}"#;

    fn sign(body: &str, timestamp: i64, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{body}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn stripe_accepts_valid_signature() {
        let now = 1_700_000_000;
        let header = format!("t={now},v1={}", sign(BODY, now, SECRET));
        assert!(verify_stripe_signature(BODY, &header, SECRET, now).is_ok());
    }

    #[test]
    fn stripe_rejects_tampered_body() {
        let now = 1_700_000_000;
        let header = format!("t={now},v1={}", sign(BODY, now, SECRET));
        let tampered = r#"{"type":"post_call_audio","data":{"x":1}}"#;
        assert!(verify_stripe_signature(tampered, &header, SECRET, now).is_err());
    }

    #[test]
    fn stripe_rejects_stale_timestamp() {
        let then = 1_700_000_000;
        let header = format!("t={then},v1={}", sign(BODY, then, SECRET));
        assert!(verify_stripe_signature(BODY, &header, SECRET, then + 301).is_err());
        assert!(verify_stripe_signature(BODY, &header, SECRET, then + 299).is_ok());
    }

    #[test]
    fn stripe_rejects_malformed_header() {
        let now = 1_700_000_000;
        assert!(verify_stripe_signature(BODY, "v1=deadbeef", SECRET, now).is_err());
        assert!(verify_stripe_signature(BODY, "t=123", SECRET, now).is_err());
        assert!(verify_stripe_signature(BODY, "", SECRET, now).is_err());
    }

    #[test]
    fn elevenlabs_accepts_valid_signature() {
        let now = 1_700_000_000;
        let header = format!("t={now},v0={}", sign(BODY, now, SECRET));
        assert!(verify_elevenlabs_signature(BODY, &header, SECRET, now).is_ok());
    }

    #[test]
    fn elevenlabs_enforces_replay_window() {
        let then = 1_700_000_000;
        let header = format!("t={then},v0={}", sign(BODY, then, SECRET));
        let thirty_one_min = then + 31 * 60;
        assert!(verify_elevenlabs_signature(BODY, &header, SECRET, thirty_one_min).is_err());
        let twenty_nine_min = then + 29 * 60;
        assert!(verify_elevenlabs_signature(BODY, &header, SECRET, twenty_nine_min).is_ok());
    }

    #[test]
    fn elevenlabs_requires_both_components() {
        let now = 1_700_000_000;
        let hash = sign(BODY, now, SECRET);
        assert!(verify_elevenlabs_signature(BODY, &format!("v0={hash}"), SECRET, now).is_err());
        assert!(verify_elevenlabs_signature(BODY, &format!("t={now}"), SECRET, now).is_err());
    }

    #[test]
    fn elevenlabs_rejects_wrong_secret() {
        let now = 1_700_000_000;
        let header = format!("t={now},v0={}", sign(BODY, now, "other_secret"));
        assert!(verify_elevenlabs_signature(BODY, &header, SECRET, now).is_err());
    }
}

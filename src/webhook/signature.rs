//! Webhook signature verification over the exact raw request bytes.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=...]`, where the MAC
//! is HMAC-SHA256 of `"{t}.{raw body}"` under the shared signing secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted skew between the header timestamp and now.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse().ok();
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| WebhookError::BadSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(WebhookError::BadSignature(
            "no v1 signature present".to_string(),
        ));
    }

    if (now_unix - timestamp).abs() > tolerance_secs {
        return Err(WebhookError::BadSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    for candidate in signatures {
        let Ok(decoded) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| WebhookError::BadSignature(e.to_string()))?;
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        // verify_slice is constant-time
        if mac.verify_slice(&decoded).is_ok() {
            return Ok(());
        }
    }

    Err(WebhookError::BadSignature("no matching signature".to_string()))
}

//! Slack request signing (`X-Slack-Signature`, version `v0`)

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::HandlerError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Requests older (or newer) than this are treated as replays
pub const MAX_SKEW_SECS: i64 = 5 * 60;

const VERSION: &str = "v0";

/// Check `signature` against HMAC-SHA256(secret, "v0:<timestamp>:<body>").
/// `now` is the current unix time in seconds.
pub fn verify(
    secret: &str,
    timestamp: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
    now: i64,
) -> Result<(), HandlerError> {
    let timestamp = timestamp.ok_or_else(|| unauthorized("missing request timestamp"))?;
    let signature = signature.ok_or_else(|| unauthorized("missing signature"))?;

    let sent_at: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| unauthorized("malformed request timestamp"))?;
    if (now - sent_at).abs() > MAX_SKEW_SECS {
        return Err(unauthorized("request timestamp outside the accepted window"));
    }

    let expected = signature
        .trim()
        .strip_prefix("v0=")
        .and_then(|hex_digest| hex::decode(hex_digest).ok())
        .ok_or_else(|| unauthorized("malformed signature"))?;

    keyed(secret, timestamp.trim(), body)?
        .verify_slice(&expected)
        .map_err(|_| unauthorized("signature mismatch"))
}

/// Hex signature header value for `body`, as Slack would send it
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, HandlerError> {
    let mac = keyed(secret, timestamp, body)?;
    Ok(format!(
        "{}={}",
        VERSION,
        hex::encode(mac.finalize().into_bytes())
    ))
}

fn keyed(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, HandlerError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| unauthorized("unusable signing secret"))?;
    mac.update(VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(mac)
}

fn unauthorized(reason: &str) -> HandlerError {
    HandlerError::Unauthorized(reason.to_string())
}

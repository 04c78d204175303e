//! Webhook signature verification.
//!
//! The gateway signs each webhook over the notification token plus the
//! receiver id using the shared secret. Verification is a pure function of
//! its inputs and never errors: any malformed header, unsupported API
//! version, or mismatch is simply `false`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// API version assumed when the gateway omits its version header.
pub const DEFAULT_API_VERSION: &str = "1.1";

/// Verify a webhook signature for the given notification token.
///
/// Version "1.0" signs the token alone; "1.1" signs `token:receiver_id`.
/// Signatures are lowercase hex HMAC-SHA256 and compared in constant time.
pub fn verify_signature(
    token: &str,
    api_version: Option<&str>,
    receiver_id: &str,
    secret: &str,
    signature: &str,
) -> bool {
    let version = api_version.unwrap_or(DEFAULT_API_VERSION);

    let signed_payload = match version {
        "1.0" => token.to_string(),
        "1.1" => format!("{}:{}", token, receiver_id),
        _ => return false,
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed_payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    // Length check is not constant-time, but signature length is not secret
    // (always 64 hex chars for SHA-256).
    let expected_bytes = expected.as_bytes();
    let provided_bytes = signature.as_bytes();
    if expected_bytes.len() != provided_bytes.len() {
        return false;
    }

    // Constant-time comparison so response times cannot be used to discover
    // the correct signature byte-by-byte.
    expected_bytes.ct_eq(provided_bytes).into()
}

/// Compute the signature the gateway would send for a token. Used by tests
/// and by the dev-mode payment simulator.
pub fn sign_token(token: &str, api_version: &str, receiver_id: &str, secret: &str) -> Option<String> {
    let signed_payload = match api_version {
        "1.0" => token.to_string(),
        "1.1" => format!("{}:{}", token, receiver_id),
        _ => return None,
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(signed_payload.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

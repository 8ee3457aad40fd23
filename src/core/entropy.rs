//! Correlation Token Entropy
//!
//! CSPRNG-backed generation of `state` and `nonce` values.

use base64::Engine;
use rand::RngCore;

/// Generate a URL-safe base64 token carrying `num_bytes` of entropy.
pub fn random_urlsafe(num_bytes: usize) -> String {
    let mut bytes = vec![0u8; num_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
}

/// Generate a CSRF correlation `state` value (256 bits).
pub fn generate_state() -> String {
    random_urlsafe(32)
}

/// Generate an ID-token replay `nonce` value (256 bits).
pub fn generate_nonce() -> String {
    random_urlsafe(32)
}

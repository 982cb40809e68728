//! Client identity derivation
//!
//! Derives a short stable identifier for the local user and machine, attached
//! to audit events and status output. The identifier is informational only:
//! it is not an authentication token and takes no part in rate limit keying.

use std::env;

use sha2::{Digest, Sha256};

/// Length of the derived identity in hex characters
const IDENTITY_HEX_LEN: usize = 16;

/// Derive the identity for the current user and machine
///
/// Reads the usual environment variables for the user and host names and
/// falls back to fixed placeholders when they are unset, so the result is
/// always a valid identity.
pub fn client_identity() -> String {
    let user = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = env::var("HOSTNAME")
        .or_else(|_| env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string());
    identity_for(&user, &host)
}

/// Derive the identity for explicit user and host attributes
pub fn identity_for(user: &str, host: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user.as_bytes());
    hasher.update(b"@");
    hasher.update(host.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(IDENTITY_HEX_LEN);
    for byte in digest.iter().take(IDENTITY_HEX_LEN / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

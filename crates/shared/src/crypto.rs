//! Hashing helpers for keeping secrets out of logs.

use sha2::{Digest, Sha256};

/// Number of hex characters kept in a fingerprint.
const FINGERPRINT_LEN: usize = 12;

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short, stable fingerprint of a secret value (session cookie, password).
///
/// Two log lines carrying the same fingerprint refer to the same secret,
/// without the secret itself ever reaching the log sink.
pub fn fingerprint(secret: &str) -> String {
    let mut digest = sha256_hex(secret);
    digest.truncate(FINGERPRINT_LEN);
    digest
}

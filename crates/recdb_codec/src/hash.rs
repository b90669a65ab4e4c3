//! Content hashing over canonical bytes.

use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Length of a lowercase-hex SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Computes the SHA-256 digest of the given bytes as lowercase hex.
///
/// The sync protocol compares these strings to decide whether two
/// record sets are identical, so the output must be stable: always
/// 64 lowercase hex characters.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(SHA256_HEX_LEN);
    for byte in digest {
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Returns true if `candidate` has the shape of a SHA-256 hex digest.
pub fn is_sha256_hex(candidate: &str) -> bool {
    candidate.len() == SHA256_HEX_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

//! Hashing helpers.

use crate::common::HashBytes;

/// Hashes a byte slice with SHA-1.
#[inline]
pub fn sha1_hash(buf: &[u8]) -> HashBytes {
    use sha1::Digest;
    HashBytes::from(sha1::Sha1::digest(buf))
}

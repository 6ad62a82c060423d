//! Stable article identifiers.
//!
//! An article's id is the SHA-256 fingerprint of its canonical link, hex
//! encoded. The same link always yields the same id, which makes the id the
//! store's dedup and update key.

use sha2::{Digest, Sha256};

/// Length in characters of every id returned by [`derive_id`].
pub const ID_LEN: usize = 64;

/// Derive the fingerprint id of an article from its canonical link.
pub fn derive_id(link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(link.as_bytes());
    hex::encode(hasher.finalize())
}

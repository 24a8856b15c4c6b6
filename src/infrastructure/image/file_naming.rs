//! Cache file naming.

use sha2::{Digest, Sha256};

use crate::domain::ports::FileNameGenerator;

/// Names files by the first 16 bytes of the SHA-256 of the URI, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256FileNameGenerator;

impl FileNameGenerator for Sha256FileNameGenerator {
    fn generate(&self, uri: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(uri.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}

/// Names files by a 32-bit polynomial hash of the URI. Short, but collisions are possible.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashCodeFileNameGenerator;

impl FileNameGenerator for HashCodeFileNameGenerator {
    fn generate(&self, uri: &str) -> String {
        let hash = uri
            .encode_utf16()
            .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)));
        hash.to_string()
    }
}

//! Random single-use secrets. Only the SHA-256 digest is ever persisted.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

pub const SECRET_BYTES: usize = 32;

/// 32 random bytes, hex encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

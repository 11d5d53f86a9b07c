use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::fmt;
use std::sync::Arc;

use super::error::AuthError;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Plaintext password. `Debug` never prints the value.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.0.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// PHC-format argon2 hash.
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Argon2id with a configurable cost. Hashing and verification block, so the
/// async wrappers move them onto the blocking pool.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    /// Verified against when the account does not exist, so a missing account
    /// costs the same as a wrong password.
    dummy_hash: Arc<str>,
}

impl PasswordHasher {
    /// `cost` is the argon2 time cost; memory grows with it (4 MiB per step).
    pub fn with_cost(cost: u32) -> Result<Self, AuthError> {
        let cost = cost.max(1);
        let params = Params::new(4096 * cost, cost, 1, None).map_err(|e| AuthError::Hashing(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon2
            .hash_password(b"dummy-password-for-timing", &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .to_string();

        Ok(Self {
            argon2,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub fn hash(&self, password: &Password) -> Result<PasswordHashString, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_str().as_bytes(), &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .to_string();
        Ok(PasswordHashString::new(hash))
    }

    /// `false` on mismatch or on an unparseable stored hash.
    pub fn verify(&self, password: &Password, hash: &PasswordHashString) -> bool {
        match PasswordHash::new(hash.as_str()) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_str().as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    pub async fn hash_blocking(&self, password: Password) -> Result<PasswordHashString, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
    }

    /// Verifies against `hash`, or against the dummy hash when there is none.
    /// Always returns `false` in the latter case.
    pub async fn verify_blocking(&self, password: Password, hash: Option<PasswordHashString>) -> Result<bool, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => hasher.verify(&password, &hash),
            None => {
                let dummy = PasswordHashString::new(hasher.dummy_hash.to_string());
                let _ = hasher.verify(&password, &dummy);
                false
            }
        })
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))
    }
}

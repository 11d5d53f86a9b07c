use thiserror::Error;

use crate::database::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Any failed session, reset or confirmation token. Callers never learn
    /// which check failed.
    #[error("Not authorized to access this route")]
    Unauthenticated,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Invalid(#[from] validator::ValidationErrors),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

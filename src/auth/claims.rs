use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session token payload. `iat` and `exp` are seconds since the epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

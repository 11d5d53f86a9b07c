pub mod claims;
pub mod error;
pub mod password;
pub mod secret;
pub mod service;

pub use claims::SessionClaims;
pub use error::AuthError;
pub use password::{Password, PasswordHasher};
pub use service::{NewUser, TokenService};

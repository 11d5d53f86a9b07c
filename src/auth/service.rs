use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::claims::SessionClaims;
use super::error::AuthError;
use super::password::{Password, PasswordHashString, PasswordHasher};
use super::secret::{generate_secret, hash_secret};
use crate::config::SecurityConfig;
use crate::database::models::user::normalize_email;
use crate::database::models::User;
use crate::database::{CredentialStore, StoreError};
use crate::policy::Role;

/// Registration input, shared by self-registration and admin account creation.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, message = "Please add a name"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

/// Issues and verifies every credential token, and owns password changes.
pub struct TokenService {
    credentials: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_ttl: Duration,
    reset_ttl: Duration,
    change_skew: Duration,
}

impl TokenService {
    pub fn new(credentials: Arc<dyn CredentialStore>, security: &SecurityConfig) -> Result<Self, AuthError> {
        if security.jwt_secret.is_empty() {
            return Err(AuthError::Signing("signing secret is empty".to_string()));
        }
        let session_ttl = i64::try_from(security.jwt_expiry_hours)
            .ok()
            .and_then(Duration::try_hours)
            .ok_or_else(|| AuthError::Signing("session lifetime out of range".to_string()))?;
        let reset_ttl = Duration::try_minutes(security.reset_token_ttl_minutes)
            .ok_or_else(|| AuthError::Signing("reset token lifetime out of range".to_string()))?;
        let change_skew = Duration::try_seconds(security.password_change_skew_secs)
            .ok_or_else(|| AuthError::Signing("password change skew out of range".to_string()))?;

        Ok(Self {
            credentials,
            hasher: PasswordHasher::with_cost(security.password_hash_cost)?,
            encoding_key: EncodingKey::from_secret(security.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(security.jwt_secret.as_bytes()),
            session_ttl,
            reset_ttl,
            change_skew,
        })
    }

    pub fn issue_session(&self, user: &User) -> Result<String, AuthError> {
        self.issue_session_at(user, Utc::now())
    }

    /// Session token with an explicit issue time.
    pub fn issue_session_at(&self, user: &User, issued_at: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = SessionClaims {
            sub: user.id,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.session_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Checks signature and expiry, loads the principal and rejects tokens
    /// issued before its last password change.
    pub async fn verify_session(&self, token: &str) -> Result<User, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::Unauthenticated)?;

        let user = self
            .credentials
            .find_user(data.claims.sub)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        if user.changed_password_after(data.claims.iat) {
            return Err(AuthError::Unauthenticated);
        }
        Ok(user)
    }

    pub async fn register(&self, new_user: NewUser) -> Result<User, AuthError> {
        if new_user.role == Role::Admin {
            return Err(AuthError::Validation("Cannot register as admin".to_string()));
        }
        self.create_user(new_user).await
    }

    /// Account creation without the self-registration role restriction.
    pub async fn create_user(&self, new_user: NewUser) -> Result<User, AuthError> {
        new_user.validate()?;
        let name = new_user.name.trim();
        if name.is_empty() {
            return Err(AuthError::Validation("Please add a name".to_string()));
        }
        let email = normalize_email(&new_user.email);
        let password = Password::new(new_user.password);

        let hash = self.hasher.hash_blocking(password).await?;
        let user = User::new(name, &email, new_user.role, hash.into_string());

        match self.credentials.insert_user(user).await {
            Ok(user) => {
                info!("Registered user {} with role {}", user.id, user.role);
                Ok(user)
            }
            Err(StoreError::Conflict(_)) => Err(AuthError::Conflict("Email already registered".to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Password login. The argon2 check runs whether or not the account
    /// exists.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self.credentials.find_user_by_email(&normalize_email(email)).await?;
        let stored = user.as_ref().map(|u| PasswordHashString::new(u.password_hash.clone()));

        let verified = self.hasher.verify_blocking(Password::new(password), stored).await?;
        match user {
            Some(user) if verified => Ok(user),
            _ => {
                warn!("Failed login attempt");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Re-hashes and stores a new password. Every session issued before the
    /// change stops verifying.
    pub async fn change_password(&self, id: Uuid, new_password: Password) -> Result<User, AuthError> {
        new_password.validate()?;
        let hash = self.hasher.hash_blocking(new_password).await?;
        let changed_at = Utc::now() - self.change_skew;
        self.credentials
            .set_password(id, hash.into_string(), changed_at)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("No user with id of {}", id)))
    }

    /// Change initiated by the account holder; requires the current password.
    pub async fn update_password(&self, id: Uuid, current: &str, new_password: Password) -> Result<User, AuthError> {
        let user = self
            .credentials
            .find_user(id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        let stored = PasswordHashString::new(user.password_hash);
        if !self.hasher.verify_blocking(Password::new(current), Some(stored)).await? {
            return Err(AuthError::InvalidCredentials);
        }
        self.change_password(id, new_password).await
    }

    pub async fn issue_reset_token(&self, id: Uuid) -> Result<String, AuthError> {
        self.issue_reset_token_at(id, Utc::now()).await
    }

    /// Reset token with an explicit issue time; it expires one TTL later.
    pub async fn issue_reset_token_at(&self, id: Uuid, issued_at: DateTime<Utc>) -> Result<String, AuthError> {
        let secret = generate_secret();
        let expires_at = issued_at + self.reset_ttl;
        if !self.credentials.set_reset_token(id, hash_secret(&secret), expires_at).await? {
            return Err(AuthError::NotFound(format!("No user with id of {}", id)));
        }
        Ok(secret)
    }

    /// Single use: the stored hash is cleared in the same store operation that
    /// writes the new password.
    pub async fn consume_reset_token(&self, secret: &str, new_password: Password) -> Result<User, AuthError> {
        new_password.validate()?;
        let hash = self.hasher.hash_blocking(new_password).await?;
        let now = Utc::now();
        self.credentials
            .consume_reset_token(&hash_secret(secret), now, hash.into_string(), now - self.change_skew)
            .await?
            .ok_or(AuthError::Unauthenticated)
    }

    pub async fn issue_confirmation_token(&self, id: Uuid) -> Result<String, AuthError> {
        let secret = generate_secret();
        if !self.credentials.set_confirmation_token(id, hash_secret(&secret)).await? {
            return Err(AuthError::NotFound(format!("No user with id of {}", id)));
        }
        Ok(secret)
    }

    pub async fn consume_confirmation_token(&self, secret: &str) -> Result<User, AuthError> {
        self.credentials
            .consume_confirmation_token(&hash_secret(secret))
            .await?
            .ok_or(AuthError::Unauthenticated)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::Validate;

use crate::filter::schema::format_timestamp;
use crate::policy::{Principal, PrincipalId, Role};

/// An authenticated identity together with its credential state.
///
/// Only hashes of reset and confirmation secrets are ever stored here; the
/// secrets themselves leave the process once, through the mailer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub reset_password_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_password_expire: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub confirm_email_token: Option<String>,
    pub is_email_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Role::parse(&value).ok_or_else(|| format!("unknown role: {}", value))
    }
}

impl User {
    pub fn new(name: impl Into<String>, email: &str, role: Role, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: normalize_email(email),
            role,
            password_hash,
            password_changed_at: None,
            reset_password_token: None,
            reset_password_expire: None,
            confirm_email_token: None,
            is_email_confirmed: false,
            created_at: Utc::now(),
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        PrincipalId(self.id)
    }

    pub fn principal(&self) -> Principal {
        Principal {
            id: self.principal_id(),
            role: self.role,
        }
    }

    /// True when the password changed after a token issued at `issued_at`
    /// (seconds since the epoch) was created.
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        match self.password_changed_at {
            Some(changed) => issued_at < changed.timestamp(),
            None => false,
        }
    }

    /// Public view used for filtering and API output; credential fields are
    /// not part of it.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("id".into(), Value::String(self.id.to_string()));
        doc.insert("name".into(), Value::String(self.name.clone()));
        doc.insert("email".into(), Value::String(self.email.clone()));
        doc.insert("role".into(), Value::String(self.role.as_str().to_string()));
        doc.insert("is_email_confirmed".into(), Value::Bool(self.is_email_confirmed));
        doc.insert("created_at".into(), Value::String(format_timestamp(&self.created_at)));
        doc
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Profile changes a user (or an admin) may apply. Credentials are changed
/// only through the token service.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UserPatch {
    #[validate(length(min = 1, message = "Please add a name"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    pub role: Option<Role>,
}

impl UserPatch {
    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(email) = &self.email {
            user.email = normalize_email(email);
        }
        if let Some(role) = self.role {
            user.role = role;
        }
    }
}

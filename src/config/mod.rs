use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set outside development")]
    MissingJwtSecret,

    #[error("SMTP_HOST must be set outside development")]
    MissingMailTransport,

    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),
}

/// Upper bounds for lifetimes read from the environment.
pub const MAX_JWT_EXPIRY_HOURS: u64 = 24 * 365;
pub const MAX_RESET_TOKEN_TTL_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub filter: FilterConfig,
    pub security: SecurityConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub public_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://…` or `memory://`
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub default_limit: u64,
    pub max_limit: u64,
    /// Drop predicates with an unrecognized operator suffix instead of
    /// comparing the raw value for equality.
    pub strict_operators: bool,
    pub debug_logging: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
            strict_operators: false,
            debug_logging: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub reset_token_ttl_minutes: i64,
    /// Argon2 time cost; memory cost scales with it.
    pub password_hash_cost: u32,
    pub password_change_skew_secs: i64,
    pub cors_origins: Vec<String>,
    pub enable_audit_logging: bool,
}

/// Outbound mail. Without an SMTP host, mail is written to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    #[serde(skip_serializing)]
    pub smtp_password: Option<String>,
    /// Plain-text SMTP without TLS, for local relays.
    pub smtp_insecure: bool,
    pub from_address: String,
    pub timeout_secs: u64,
}

impl MailConfig {
    pub fn has_transport(&self) -> bool {
        self.smtp_host.as_deref().is_some_and(|h| !h.trim().is_empty())
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_insecure: false,
            from_address: "DevCamper <noreply@devcamper.io>".to_string(),
            timeout_secs: 10,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    /// Development preset backed by the in-memory store. Used by tests.
    pub fn in_memory() -> Self {
        let mut config = Self::development();
        config.database.url = "memory://".to_string();
        config.security.jwt_secret = "test-signing-secret".to_string();
        config.security.password_hash_cost = 1;
        config
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.is_empty() && !self.is_development() {
            return Err(ConfigError::MissingJwtSecret);
        }
        if self.filter.default_limit == 0 || self.filter.max_limit == 0 {
            return Err(ConfigError::InvalidValue("FILTER_MAX_LIMIT"));
        }
        if self.security.password_hash_cost == 0 {
            return Err(ConfigError::InvalidValue("SECURITY_PASSWORD_HASH_COST"));
        }
        if !(1..=MAX_JWT_EXPIRY_HOURS).contains(&self.security.jwt_expiry_hours) {
            return Err(ConfigError::InvalidValue("SECURITY_JWT_EXPIRY_HOURS"));
        }
        if !(1..=MAX_RESET_TOKEN_TTL_MINUTES).contains(&self.security.reset_token_ttl_minutes) {
            return Err(ConfigError::InvalidValue("SECURITY_RESET_TOKEN_TTL_MINUTES"));
        }
        if !self.mail.has_transport() && !self.is_development() {
            return Err(ConfigError::MissingMailTransport);
        }
        if self.mail.smtp_port == 0 {
            return Err(ConfigError::InvalidValue("SMTP_PORT"));
        }
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(port) = env::var("PORT").ok().and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Ok(v) = env::var("PUBLIC_URL") {
            self.server.public_url = v;
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Filter overrides
        if let Ok(v) = env::var("FILTER_DEFAULT_LIMIT") {
            self.filter.default_limit = v.parse().unwrap_or(self.filter.default_limit);
        }
        if let Ok(v) = env::var("FILTER_MAX_LIMIT") {
            self.filter.max_limit = v.parse().unwrap_or(self.filter.max_limit);
        }
        if let Ok(v) = env::var("FILTER_STRICT_OPERATORS") {
            self.filter.strict_operators = v.parse().unwrap_or(self.filter.strict_operators);
        }
        if let Ok(v) = env::var("FILTER_DEBUG_LOGGING") {
            self.filter.debug_logging = v.parse().unwrap_or(self.filter.debug_logging);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_RESET_TOKEN_TTL_MINUTES") {
            self.security.reset_token_ttl_minutes = v.parse().unwrap_or(self.security.reset_token_ttl_minutes);
        }
        if let Ok(v) = env::var("SECURITY_PASSWORD_HASH_COST") {
            self.security.password_hash_cost = v.parse().unwrap_or(self.security.password_hash_cost);
        }
        if let Ok(v) = env::var("SECURITY_PASSWORD_CHANGE_SKEW_SECS") {
            self.security.password_change_skew_secs = v.parse().unwrap_or(self.security.password_change_skew_secs);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_AUDIT_LOGGING") {
            self.security.enable_audit_logging = v.parse().unwrap_or(self.security.enable_audit_logging);
        }

        // Mail overrides
        if let Ok(v) = env::var("SMTP_HOST") {
            self.mail.smtp_host = Some(v);
        }
        if let Ok(v) = env::var("SMTP_PORT") {
            self.mail.smtp_port = v.parse().unwrap_or(self.mail.smtp_port);
        }
        if let Ok(v) = env::var("SMTP_USERNAME") {
            self.mail.smtp_username = Some(v);
        }
        if let Ok(v) = env::var("SMTP_PASSWORD") {
            self.mail.smtp_password = Some(v);
        }
        if let Ok(v) = env::var("SMTP_INSECURE") {
            self.mail.smtp_insecure = v.parse().unwrap_or(self.mail.smtp_insecure);
        }
        if let Ok(v) = env::var("MAIL_FROM") {
            self.mail.from_address = v;
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 5000,
                public_url: "http://localhost:5000".to_string(),
            },
            database: DatabaseConfig {
                url: "memory://".to_string(),
                max_connections: 10,
                connection_timeout: 30,
            },
            filter: FilterConfig {
                default_limit: 100,
                max_limit: 1000,
                strict_operators: false,
                debug_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: "development-only-secret".to_string(),
                jwt_expiry_hours: 24 * 30, // 30 days
                reset_token_ttl_minutes: 10,
                password_hash_cost: 2,
                password_change_skew_secs: 1,
                cors_origins: vec!["http://localhost:3000".to_string()],
                enable_audit_logging: false,
            },
            mail: MailConfig::default(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 5000,
                public_url: "https://staging.example.com".to_string(),
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 20,
                connection_timeout: 10,
            },
            filter: FilterConfig {
                default_limit: 100,
                max_limit: 500,
                strict_operators: false,
                debug_logging: false,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24 * 7,
                reset_token_ttl_minutes: 10,
                password_hash_cost: 3,
                password_change_skew_secs: 1,
                cors_origins: vec!["https://staging.example.com".to_string()],
                enable_audit_logging: true,
            },
            mail: MailConfig::default(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 5000,
                public_url: "https://app.example.com".to_string(),
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 50,
                connection_timeout: 5,
            },
            filter: FilterConfig {
                default_limit: 100,
                max_limit: 100,
                strict_operators: true,
                debug_logging: false,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                reset_token_ttl_minutes: 10,
                password_hash_cost: 3,
                password_change_skew_secs: 1,
                cors_origins: vec!["https://app.example.com".to_string()],
                enable_audit_logging: true,
            },
            mail: MailConfig::default(),
        }
    }
}

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use devcamper_api::{
    app,
    auth::{Password, PasswordHasher},
    config::AppConfig,
    database::{models::User, DatabaseManager, Stores},
    policy::Role,
    services::{MailKind, MemoryOutbox},
    state::AppState,
};
use reqwest::StatusCode;
use serde_json::{json, Value};

/// In-process server over the in-memory store. Each `#[tokio::test]` owns its
/// runtime, so every test starts its own instance.
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub outbox: Arc<MemoryOutbox>,
    pub stores: Stores,
    pub client: reqwest::Client,
}

impl TestServer {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(AppConfig::in_memory()).await
    }

    pub async fn spawn_with(mut config: AppConfig) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);
        config.server.port = port;
        config.server.public_url = base_url.clone();

        let stores = DatabaseManager::connect(&config.database).await?;
        let outbox = Arc::new(MemoryOutbox::new());
        let state = AppState::new(config, stores.clone(), outbox.clone())?;
        let router = app::router(state);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test listener")?;
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        let server = Self {
            port,
            base_url,
            outbox,
            stores,
            client: reqwest::Client::new(),
        };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Registers an account and returns its session token.
    pub async fn register(&self, name: &str, email: &str, role: &str) -> Result<String> {
        let res = self
            .client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({"name": name, "email": email, "password": "123456789", "role": role}))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "register failed: {}", res.status());
        let body: Value = res.json().await?;
        body["data"]["token"]
            .as_str()
            .map(str::to_string)
            .context("register response without token")
    }

    /// Admins cannot self-register; this writes one straight into the store
    /// and logs in over HTTP.
    pub async fn admin(&self, email: &str) -> Result<String> {
        let hasher = PasswordHasher::with_cost(1)?;
        let hash = hasher.hash_blocking(Password::new("123456789")).await?;
        self.stores
            .credentials
            .insert_user(User::new("Admin", email, Role::Admin, hash.into_string()))
            .await?;

        let body: Value = self.login(email, "123456789").await?.json().await?;
        body["data"]["token"]
            .as_str()
            .map(str::to_string)
            .context("login response without token")
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({"email": email, "password": password}))
            .send()
            .await?)
    }

    pub async fn last_secret(&self, email: &str, kind: MailKind) -> Option<String> {
        self.outbox.last_secret(email, kind).await
    }

    /// Creates a bootcamp as `token` and returns its id.
    pub async fn create_bootcamp(&self, token: &str, name: &str) -> Result<String> {
        let res = self
            .client
            .post(self.url("/api/v1/bootcamps"))
            .bearer_auth(token)
            .json(&json!({
                "name": name,
                "description": "Full stack web development",
                "careers": ["Web Development"],
                "housing": false
            }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "create bootcamp failed: {}", res.status());
        let body: Value = res.json().await?;
        body["data"]["id"]
            .as_str()
            .map(str::to_string)
            .context("bootcamp response without id")
    }

    pub async fn add_course(&self, token: &str, bootcamp: &str, title: &str, tuition: i64, weeks: i64) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url(&format!("/api/v1/bootcamps/{}/courses", bootcamp)))
            .bearer_auth(token)
            .json(&json!({
                "title": title,
                "description": "Course description",
                "weeks": weeks,
                "tuition": tuition,
                "minimum_skill": "beginner"
            }))
            .send()
            .await?)
    }
}

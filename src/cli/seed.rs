use anyhow::{bail, Context};
use clap::Subcommand;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::auth::{Password, PasswordHasher};
use crate::config::AppConfig;
use crate::database::models::document::{CREATED_AT, ID, VERSION};
use crate::database::models::{Document, User};
use crate::database::{DatabaseManager, Stores};
use crate::filter::schema::format_timestamp;
use crate::observer::{ObserverPipeline, Operation, ResourceEvent};
use crate::policy::Role;
use crate::services::{ResourceKind, BOOTCAMPS, COURSES, REVIEWS};

#[derive(Subcommand)]
pub enum SeedCommands {
    #[command(about = "Import users, bootcamps, courses and reviews from a directory of JSON files")]
    Import {
        #[arg(help = "Directory holding users.json, bootcamps.json, courses.json, reviews.json")]
        dir: PathBuf,
    },

    #[command(about = "Delete every catalog document and account")]
    Destroy,
}

/// One entry of users.json. Passwords are plaintext and hashed on import.
#[derive(Debug, Deserialize)]
struct SeedUser {
    id: Option<Uuid>,
    name: String,
    email: String,
    password: String,
    #[serde(default)]
    role: Role,
}

pub async fn handle(cmd: SeedCommands, config: &AppConfig) -> anyhow::Result<()> {
    let stores = DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect to the data store")?;

    match cmd {
        SeedCommands::Import { dir } => {
            let counts = import(&stores, config, &dir).await?;
            tracing::info!(
                "Data imported: {} users, {} bootcamps, {} courses, {} reviews",
                counts[0],
                counts[1],
                counts[2],
                counts[3]
            );
        }
        SeedCommands::Destroy => {
            let removed = destroy(&stores).await?;
            tracing::info!("Data destroyed: {} records removed", removed);
        }
    }
    Ok(())
}

/// Imports in dependency order. Missing files are skipped.
pub async fn import(stores: &Stores, config: &AppConfig, dir: &Path) -> anyhow::Result<[usize; 4]> {
    let hasher = PasswordHasher::with_cost(config.security.password_hash_cost)?;
    let observers = ObserverPipeline::with_defaults();

    let mut users = 0;
    for seed in read_array::<SeedUser>(&dir.join("users.json"))? {
        let password = Password::new(seed.password);
        password.validate()?;
        let hash = hasher.hash_blocking(password).await?;
        let mut user = User::new(seed.name, &seed.email, seed.role, hash.into_string());
        if let Some(id) = seed.id {
            user.id = id;
        }
        stores
            .credentials
            .insert_user(user)
            .await
            .with_context(|| format!("failed to import user {}", seed.email))?;
        users += 1;
    }

    let mut counts = [users, 0, 0, 0];
    for (slot, kind) in [(1, &BOOTCAMPS), (2, &COURSES), (3, &REVIEWS)] {
        for raw in read_array::<Map<String, Value>>(&dir.join(format!("{}.json", kind.collection())))? {
            let doc = seed_document(kind, raw)?;
            let created = stores
                .documents
                .insert(kind.collection(), doc, &[kind.unique_on])
                .await
                .with_context(|| format!("failed to import {}", kind.label))?;
            let event = ResourceEvent::new(kind.collection(), Operation::Create, created);
            observers.notify(&event, stores.documents.as_ref()).await;
            counts[slot] += 1;
        }
    }
    Ok(counts)
}

/// Removes all catalog documents, then all accounts.
pub async fn destroy(stores: &Stores) -> anyhow::Result<u64> {
    let mut removed = 0;
    for kind in [&REVIEWS, &COURSES, &BOOTCAMPS] {
        removed += stores.documents.clear(kind.collection()).await?;
    }
    removed += stores.credentials.clear_users().await?;
    Ok(removed)
}

fn read_array<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.exists() {
        tracing::warn!("Seed file {} not found, skipping", path.display());
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Seed documents keep their ids and owners; the rest of the bookkeeping is
/// filled in.
fn seed_document(kind: &ResourceKind, mut raw: Map<String, Value>) -> anyhow::Result<Document> {
    let id = match raw.get(ID).and_then(Value::as_str) {
        Some(id) => Uuid::parse_str(id).with_context(|| format!("{} has a malformed id: {}", kind.label, id))?,
        None => Uuid::new_v4(),
    };
    if kind.parent.is_some() && !raw.contains_key("bootcamp") {
        bail!("{} {} has no bootcamp", kind.label, id);
    }
    if kind.computed.contains(&"slug") {
        if let Some(name) = raw.get("name").and_then(Value::as_str) {
            let slug = crate::services::resources::slugify(name);
            raw.insert("slug".to_string(), Value::String(slug));
        }
    }
    raw.insert(ID.to_string(), Value::String(id.to_string()));
    raw.entry(CREATED_AT.to_string())
        .or_insert_with(|| Value::String(format_timestamp(&chrono::Utc::now())));
    raw.insert(VERSION.to_string(), Value::from(1));
    Ok(Document::from_map(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::filter::types::QueryDescriptor;
    use serde_json::json;
    use std::sync::Arc;

    fn write(dir: &Path, name: &str, value: Value) {
        std::fs::write(dir.join(name), value.to_string()).unwrap();
    }

    #[tokio::test]
    async fn import_then_destroy() {
        let dir = std::env::temp_dir().join(format!("devcamper-seed-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let owner = Uuid::new_v4();
        let camp = Uuid::new_v4();
        write(
            &dir,
            "users.json",
            json!([{"id": owner, "name": "Pub", "email": "pub@example.com", "password": "123456789", "role": "publisher"}]),
        );
        write(
            &dir,
            "bootcamps.json",
            json!([{"id": camp, "user": owner, "name": "Devworks Bootcamp", "description": "d"}]),
        );
        write(
            &dir,
            "courses.json",
            json!([
                {"user": owner, "bootcamp": camp, "title": "a", "tuition": 8000},
                {"user": owner, "bootcamp": camp, "title": "b", "tuition": 12000}
            ]),
        );

        let stores = Stores::from_backend(Arc::new(MemoryStore::new()));
        let config = AppConfig::in_memory();
        let counts = import(&stores, &config, &dir).await.unwrap();
        assert_eq!(counts, [1, 1, 2, 0]);

        let doc = stores.documents.get("bootcamps", camp).await.unwrap().unwrap();
        assert_eq!(doc.get("slug"), Some(&json!("devworks-bootcamp")));
        assert_eq!(doc.get("average_cost"), Some(&json!(10000.0)));

        assert_eq!(destroy(&stores).await.unwrap(), 4);
        let left = stores.documents.find("courses", &QueryDescriptor::all(10)).await.unwrap();
        assert!(left.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}

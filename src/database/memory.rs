use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::models::{Document, User, UserPatch};
use crate::database::store::{CredentialStore, DocumentStore, StoreError};
use crate::filter::eval::{apply_projection, matches_all, sort_documents};
use crate::filter::types::QueryDescriptor;

/// Process-local backend selected by `DATABASE_URL=memory://`.
///
/// Each collection keeps insertion order; every check-and-set runs under a
/// single write lock.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    users: RwLock<Vec<User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn token_matches(stored: Option<&str>, candidate: &str) -> bool {
    match stored {
        Some(stored) => stored.as_bytes().ct_eq(candidate.as_bytes()).into(),
        None => false,
    }
}

fn page<T>(items: Vec<T>, query: &QueryDescriptor) -> impl Iterator<Item = T> {
    let offset = usize::try_from(query.pagination.offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(query.pagination.limit).unwrap_or(usize::MAX);
    items.into_iter().skip(offset).take(limit)
}

fn run_query(maps: Vec<Map<String, Value>>, query: &QueryDescriptor) -> Vec<Map<String, Value>> {
    let mut matched: Vec<Map<String, Value>> = maps
        .into_iter()
        .filter(|m| matches_all(m, &query.predicates))
        .collect();
    sort_documents(&mut matched, &query.sort);
    page(matched, query)
        .map(|m| apply_projection(m, &query.projection))
        .collect()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, query: &QueryDescriptor) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let maps = collections
            .get(collection)
            .map(|docs| docs.iter().map(|d| d.as_map().clone()).collect())
            .unwrap_or_default();
        Ok(run_query(maps, query).into_iter().map(Document::from_map).collect())
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id() == Some(id)))
            .cloned())
    }

    async fn insert(&self, collection: &str, doc: Document, unique: &[&[&str]]) -> Result<Document, StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        for key in unique.iter().filter(|key| !key.is_empty()) {
            let duplicate = docs
                .iter()
                .any(|existing| key.iter().all(|field| existing.get(field) == doc.get(field)));
            if duplicate {
                return Err(StoreError::Conflict(key.join(",")));
            }
        }
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn update(&self, collection: &str, id: Uuid, patch: Map<String, Value>) -> Result<Option<Document>, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id() == Some(id)))
        else {
            return Ok(None);
        };
        let (cleared, set): (Vec<_>, Vec<_>) = patch.into_iter().partition(|(_, v)| v.is_null());
        doc.apply_patch(set.into_iter().collect());
        for (key, _) in cleared {
            doc.remove(&key);
        }
        Ok(Some(doc.clone()))
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|d| d.id() != Some(id));
        Ok(docs.len() != before)
    }

    async fn delete_where(&self, collection: &str, field: &str, value: &Value) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| d.get(field) != Some(value));
        Ok((before - docs.len()) as u64)
    }

    async fn clear(&self, collection: &str) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        Ok(collections.remove(collection).map(|docs| docs.len() as u64).unwrap_or(0))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }
        users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.iter().find(|u| u.email == email).cloned())
    }

    async fn find_users(&self, query: &QueryDescriptor) -> Result<Vec<Map<String, Value>>, StoreError> {
        let maps = self.users.read().await.iter().map(User::to_document).collect();
        Ok(run_query(maps, query))
    }

    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        if let Some(email) = &patch.email {
            let email = crate::database::models::user::normalize_email(email);
            if users.iter().any(|u| u.email == email && u.id != id) {
                return Err(StoreError::Conflict("email already registered".to_string()));
            }
        }
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        patch.apply(user);
        Ok(Some(user.clone()))
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: String,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        user.password_hash = password_hash;
        user.password_changed_at = Some(changed_at);
        Ok(Some(user.clone()))
    }

    async fn set_reset_token(&self, id: Uuid, token_hash: String, expires_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(false);
        };
        user.reset_password_token = Some(token_hash);
        user.reset_password_expire = Some(expires_at);
        Ok(true)
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        password_hash: String,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        let holder = users.iter_mut().find(|u| {
            token_matches(u.reset_password_token.as_deref(), token_hash)
                && u.reset_password_expire.map(|exp| exp > now).unwrap_or(false)
        });
        let Some(user) = holder else {
            return Ok(None);
        };
        user.reset_password_token = None;
        user.reset_password_expire = None;
        user.password_hash = password_hash;
        user.password_changed_at = Some(changed_at);
        Ok(Some(user.clone()))
    }

    async fn set_confirmation_token(&self, id: Uuid, token_hash: String) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(false);
        };
        user.confirm_email_token = Some(token_hash);
        Ok(true)
    }

    async fn consume_confirmation_token(&self, token_hash: &str) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        let Some(user) = users
            .iter_mut()
            .find(|u| token_matches(u.confirm_email_token.as_deref(), token_hash))
        else {
            return Ok(None);
        };
        user.confirm_email_token = None;
        user.is_email_confirmed = true;
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() != before)
    }

    async fn clear_users(&self) -> Result<u64, StoreError> {
        let mut users = self.users.write().await;
        let count = users.len() as u64;
        users.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compiler::compile;
    use crate::filter::schema::COURSE_SCHEMA;
    use crate::policy::{PrincipalId, Role};
    use chrono::Duration;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn raw(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    async fn seed_courses(store: &MemoryStore) {
        let owner = PrincipalId(Uuid::new_v4());
        for (i, tuition) in [3000, 8000, 12000, 5000].into_iter().enumerate() {
            let created = Utc::now() + Duration::seconds(i as i64);
            let doc = Document::create(fields(json!({"title": format!("c{}", i), "tuition": tuition})), owner, created);
            store.insert("courses", doc, &[]).await.unwrap();
        }
    }

    #[tokio::test]
    async fn find_applies_compiled_query() {
        let store = MemoryStore::new();
        seed_courses(&store).await;

        let q = compile(&COURSE_SCHEMA, &raw(&[("tuition[gte]", "5000"), ("sort", "tuition"), ("select", "title")]));
        let found = store.find("courses", &q).await.unwrap();
        let titles: Vec<_> = found.iter().map(|d| d.get("title").unwrap().clone()).collect();
        assert_eq!(titles, vec![json!("c3"), json!("c1"), json!("c2")]);
        assert!(found[0].get("tuition").is_none());
        assert!(found[0].id().is_some());
    }

    #[tokio::test]
    async fn find_paginates_by_default_sort() {
        let store = MemoryStore::new();
        seed_courses(&store).await;

        let q = compile(&COURSE_SCHEMA, &raw(&[("page", "2"), ("limit", "3")]));
        let found = store.find("courses", &q).await.unwrap();
        // newest first, so the oldest lands alone on page two
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("title"), Some(&json!("c0")));
        assert!(found[0].get("version").is_none());
    }

    #[tokio::test]
    async fn unique_insert_conflicts() {
        let store = MemoryStore::new();
        let owner = PrincipalId(Uuid::new_v4());
        let review = || Document::create(fields(json!({"bootcamp": "b1", "rating": 5})), owner, Utc::now());
        store.insert("reviews", review(), &[&["bootcamp", "user"]]).await.unwrap();
        let err = store.insert("reviews", review(), &[&["bootcamp", "user"]]).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(key) if key == "bootcamp,user"));
    }

    #[tokio::test]
    async fn any_unique_key_conflicts() {
        let store = MemoryStore::new();
        let owner = PrincipalId(Uuid::new_v4());
        let camp = |name: &str| Document::create(fields(json!({"name": name})), owner, Utc::now());
        let keys: &[&[&str]] = &[&["name"], &["user"]];
        store.insert("bootcamps", camp("One"), keys).await.unwrap();
        let err = store.insert("bootcamps", camp("Two"), keys).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(key) if key == "user"));
        assert!(store.insert("bootcamps", camp("Two"), &[&["name"]]).await.is_ok());
    }

    #[tokio::test]
    async fn update_with_null_clears_field() {
        let store = MemoryStore::new();
        let owner = PrincipalId(Uuid::new_v4());
        let doc = store
            .insert("bootcamps", Document::create(fields(json!({"average_rating": 7.5})), owner, Utc::now()), &[])
            .await
            .unwrap();
        let updated = store
            .update("bootcamps", doc.id().unwrap(), fields(json!({"average_rating": null})))
            .await
            .unwrap()
            .unwrap();
        assert!(updated.get("average_rating").is_none());
        assert_eq!(updated.version(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryStore::new();
        store.insert_user(User::new("A", "a@example.com", Role::User, "h".into())).await.unwrap();
        let err = store
            .insert_user(User::new("B", "A@Example.com", Role::User, "h".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn reset_token_consumed_once() {
        let store = MemoryStore::new();
        let user = store.insert_user(User::new("A", "a@example.com", Role::User, "old".into())).await.unwrap();
        let now = Utc::now();
        store.set_reset_token(user.id, "hash".into(), now + Duration::minutes(10)).await.unwrap();

        let first = store.consume_reset_token("hash", now, "new".into(), now).await.unwrap();
        assert_eq!(first.map(|u| u.password_hash), Some("new".to_string()));
        let second = store.consume_reset_token("hash", now, "newer".into(), now).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn expired_reset_token_is_not_consumed() {
        let store = MemoryStore::new();
        let user = store.insert_user(User::new("A", "a@example.com", Role::User, "old".into())).await.unwrap();
        let now = Utc::now();
        store.set_reset_token(user.id, "hash".into(), now - Duration::seconds(1)).await.unwrap();
        assert!(store.consume_reset_token("hash", now, "new".into(), now).await.unwrap().is_none());
        let unchanged = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(unchanged.password_hash, "old");
    }
}

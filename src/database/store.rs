use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::{Document, User, UserPatch};
use crate::filter::error::FilterError;
use crate::filter::eval::apply_projection;
use crate::filter::types::{FilterOp, Populate, Projection, QueryDescriptor, Relation};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Query(#[from] FilterError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Storage for catalog documents, one collection per resource kind.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Runs a compiled query. Populate hints are ignored here; see
    /// [`populate`].
    async fn find(&self, collection: &str, query: &QueryDescriptor) -> Result<Vec<Document>, StoreError>;

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// Inserts `doc`. Each entry of `unique` is a composite key; an existing
    /// document matching `doc` on every field of any one key yields
    /// `Conflict` carrying that key, comma-joined. The check and the insert
    /// are one atomic step.
    async fn insert(&self, collection: &str, doc: Document, unique: &[&[&str]]) -> Result<Document, StoreError>;

    /// Merges `patch` into the stored document and bumps its revision.
    /// A `null` value in the patch clears the key.
    async fn update(&self, collection: &str, id: Uuid, patch: Map<String, Value>) -> Result<Option<Document>, StoreError>;

    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool, StoreError>;

    /// Deletes every document whose `field` equals `value`. Returns the count.
    async fn delete_where(&self, collection: &str, field: &str, value: &Value) -> Result<u64, StoreError>;

    async fn clear(&self, collection: &str) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Storage for principals and their credential state.
///
/// The `consume_*` operations are single atomic check-and-clear steps: two
/// concurrent consumers of the same token hash see exactly one success.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Conflict` when the email is already registered.
    async fn insert_user(&self, user: User) -> Result<User, StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Public profiles matching `query`, projected.
    async fn find_users(&self, query: &QueryDescriptor) -> Result<Vec<Map<String, Value>>, StoreError>;

    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>, StoreError>;

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: String,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    /// Replaces any previous reset token for the user.
    async fn set_reset_token(&self, id: Uuid, token_hash: String, expires_at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Finds the user holding `token_hash` with an expiry after `now`, clears
    /// both reset fields and stores the new password in one step.
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        password_hash: String,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    async fn set_confirmation_token(&self, id: Uuid, token_hash: String) -> Result<bool, StoreError>;

    /// Marks the holder's email confirmed and clears the hash.
    async fn consume_confirmation_token(&self, token_hash: &str) -> Result<Option<User>, StoreError>;

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn clear_users(&self) -> Result<u64, StoreError>;
}

/// Both halves of one backend.
#[derive(Clone)]
pub struct Stores {
    pub documents: Arc<dyn DocumentStore>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: DocumentStore + CredentialStore + 'static,
    {
        Self {
            documents: backend.clone(),
            credentials: backend,
        }
    }
}

/// Resolves populate hints against `store`, attaching related documents to
/// each result under the hint's path.
pub async fn populate(
    store: &dyn DocumentStore,
    mut docs: Vec<Document>,
    hints: &[Populate],
) -> Result<Vec<Document>, StoreError> {
    for hint in hints {
        for doc in docs.iter_mut() {
            let related = match &hint.relation {
                Relation::BelongsTo => {
                    let Some(id) = doc.uuid_field(&hint.path) else { continue };
                    match store.get(&hint.collection, id).await? {
                        Some(found) => select_fields(found, &hint.select),
                        None => Value::Null,
                    }
                }
                Relation::HasMany { foreign_field } => {
                    let Some(id) = doc.id() else { continue };
                    let query = QueryDescriptor::all(u64::MAX).with_predicate(
                        foreign_field,
                        FilterOp::Eq,
                        Value::String(id.to_string()),
                    );
                    let children = store.find(&hint.collection, &query).await?;
                    Value::Array(children.into_iter().map(|c| select_fields(c, &hint.select)).collect())
                }
            };
            doc.set(hint.path.clone(), related);
        }
    }
    Ok(docs)
}

fn select_fields(doc: Document, select: &[String]) -> Value {
    let map = if select.is_empty() {
        doc.into_inner()
    } else {
        let mut fields = vec!["id".to_string()];
        fields.extend(select.iter().cloned());
        apply_projection(doc.into_inner(), &Projection::Include(fields))
    };
    Value::Object(map)
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::database::models::{Document, User, UserPatch};
use crate::database::store::{CredentialStore, DocumentStore, StoreError};
use crate::filter::eval::apply_projection;
use crate::filter::filter_where::validate_field_name;
use crate::filter::types::QueryDescriptor;
use crate::filter::Filter;

pub const COLLECTIONS: [&str; 3] = ["bootcamps", "courses", "reviews"];

/// Public profile view; filtering users goes through the same JSONB path as
/// documents and never sees credential columns.
const USER_PROFILE_VIEW: &str = r#"
CREATE OR REPLACE VIEW "user_profiles" AS
SELECT jsonb_build_object(
    'id', id::text,
    'name', name,
    'email', email,
    'role', role,
    'is_email_confirmed', is_email_confirmed,
    'created_at', to_char(created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS.US"Z"')
) AS "doc"
FROM "users"
"#;

const USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "users" (
    id uuid PRIMARY KEY,
    name text NOT NULL,
    email text NOT NULL UNIQUE,
    role text NOT NULL,
    password_hash text NOT NULL,
    password_changed_at timestamptz,
    reset_password_token text,
    reset_password_expire timestamptz,
    confirm_email_token text,
    is_email_confirmed boolean NOT NULL DEFAULT false,
    created_at timestamptz NOT NULL
)
"#;

const UNIQUE_INDEXES: [&str; 2] = [
    "CREATE UNIQUE INDEX IF NOT EXISTS reviews_bootcamp_user ON \"reviews\" ((doc ->> 'bootcamp'), (doc ->> 'user'))",
    "CREATE UNIQUE INDEX IF NOT EXISTS bootcamps_name ON \"bootcamps\" ((doc ->> 'name'))",
];

/// Postgres backend. Catalog documents live as JSONB in one table per
/// collection; users get a typed table.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates tables, indexes and the profile view when missing.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(USERS_TABLE).execute(&self.pool).await?;
        sqlx::query(USER_PROFILE_VIEW).execute(&self.pool).await?;
        for collection in COLLECTIONS {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (id uuid PRIMARY KEY, doc jsonb NOT NULL)",
                collection
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        for ddl in UNIQUE_INDEXES {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        info!("Database schema ready");
        Ok(())
    }

    fn table(collection: &str) -> Result<&'static str, StoreError> {
        COLLECTIONS
            .iter()
            .find(|c| **c == collection)
            .copied()
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))
    }
}

fn map_unique_violation(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            StoreError::Conflict(format!("duplicate {}", what))
        }
        _ => StoreError::Sqlx(err),
    }
}

fn document_from_row(doc: Json<Map<String, Value>>) -> Document {
    Document::from_map(doc.0)
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find(&self, collection: &str, query: &QueryDescriptor) -> Result<Vec<Document>, StoreError> {
        let table = Self::table(collection)?;
        let sql = Filter::new(table, "\"doc\"", query)?.to_sql("\"doc\"")?;

        let mut q = sqlx::query_scalar::<_, Json<Map<String, Value>>>(&sql.query);
        for param in sql.params {
            q = q.bind(Json(param));
        }
        let rows = q.fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|row| Document::from_map(apply_projection(row.0, &query.projection)))
            .collect())
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let table = Self::table(collection)?;
        let sql = format!("SELECT doc FROM \"{}\" WHERE id = $1", table);
        let row = sqlx::query_scalar::<_, Json<Map<String, Value>>>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(document_from_row))
    }

    async fn insert(&self, collection: &str, doc: Document, unique: &[&[&str]]) -> Result<Document, StoreError> {
        let table = Self::table(collection)?;
        let id = doc.id().ok_or_else(|| StoreError::Corrupt("document without id".to_string()))?;

        let mut tx = self.pool.begin().await?;
        if !unique.is_empty() {
            // serializes keyed inserts per collection until commit
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(table)
                .execute(&mut *tx)
                .await?;
        }
        for key in unique.iter().filter(|key| !key.is_empty()) {
            let mut conditions = Vec::with_capacity(key.len());
            for field in key.iter() {
                validate_field_name(field)?;
                conditions.push(format!("doc -> '{}' = $1 -> '{}'", field, field));
            }
            let sql = format!(
                "SELECT EXISTS (SELECT 1 FROM \"{}\" WHERE {})",
                table,
                conditions.join(" AND ")
            );
            let taken: bool = sqlx::query_scalar(&sql)
                .bind(Json(doc.as_map()))
                .fetch_one(&mut *tx)
                .await?;
            if taken {
                return Err(StoreError::Conflict(key.join(",")));
            }
        }

        let sql = format!("INSERT INTO \"{}\" (id, doc) VALUES ($1, $2)", table);
        sqlx::query(&sql)
            .bind(id)
            .bind(Json(doc.as_map()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_unique_violation(e, collection))?;
        tx.commit().await?;
        Ok(doc)
    }

    async fn update(&self, collection: &str, id: Uuid, patch: Map<String, Value>) -> Result<Option<Document>, StoreError> {
        let table = Self::table(collection)?;
        let (cleared, set): (Vec<_>, Vec<_>) = patch.into_iter().partition(|(_, v)| v.is_null());
        let set = crate::database::models::document::strip_reserved(set.into_iter().collect());
        let cleared: Vec<String> = cleared.into_iter().map(|(k, _)| k).collect();

        let sql = format!(
            "UPDATE \"{}\" SET doc = jsonb_set((doc || $2) - $3::text[], '{{version}}', \
             to_jsonb(COALESCE((doc ->> 'version')::bigint, 0) + 1)) WHERE id = $1 RETURNING doc",
            table
        );
        let row = sqlx::query_scalar::<_, Json<Map<String, Value>>>(&sql)
            .bind(id)
            .bind(Json(set))
            .bind(cleared)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, collection))?;
        Ok(row.map(document_from_row))
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        let table = Self::table(collection)?;
        let sql = format!("DELETE FROM \"{}\" WHERE id = $1", table);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_where(&self, collection: &str, field: &str, value: &Value) -> Result<u64, StoreError> {
        let table = Self::table(collection)?;
        validate_field_name(field)?;
        let sql = format!("DELETE FROM \"{}\" WHERE doc -> '{}' = $1::jsonb", table, field);
        let result = sqlx::query(&sql).bind(Json(value)).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn clear(&self, collection: &str) -> Result<u64, StoreError> {
        let table = Self::table(collection)?;
        let result = sqlx::query(&format!("DELETE FROM \"{}\"", table)).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, name, email, role, password_hash, password_changed_at, reset_password_token, \
             reset_password_expire, confirm_email_token, is_email_confirmed, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(user.password_changed_at)
        .bind(&user.reset_password_token)
        .bind(user.reset_password_expire)
        .bind(&user.confirm_email_token)
        .bind(user.is_email_confirmed)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "email"))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_users(&self, query: &QueryDescriptor) -> Result<Vec<Map<String, Value>>, StoreError> {
        let sql = Filter::new("user_profiles", "\"doc\"", query)?.to_sql("\"doc\"")?;
        let mut q = sqlx::query_scalar::<_, Json<Map<String, Value>>>(&sql.query);
        for param in sql.params {
            q = q.bind(Json(param));
        }
        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| apply_projection(row.0, &query.projection))
            .collect())
    }

    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>, StoreError> {
        let email = patch.email.as_deref().map(crate::database::models::user::normalize_email);
        sqlx::query_as::<_, User>(
            "UPDATE users SET name = COALESCE($2, name), email = COALESCE($3, email), role = COALESCE($4, role) \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&patch.name)
        .bind(email)
        .bind(patch.role.map(|r| r.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "email"))
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: String,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, User>(
            "UPDATE users SET password_hash = $2, password_changed_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(password_hash)
        .bind(changed_at)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_reset_token(&self, id: Uuid, token_hash: String, expires_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET reset_password_token = $2, reset_password_expire = $3 WHERE id = $1")
            .bind(id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        password_hash: String,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, User>(
            "UPDATE users SET reset_password_token = NULL, reset_password_expire = NULL, \
             password_hash = $3, password_changed_at = $4 \
             WHERE reset_password_token = $1 AND reset_password_expire > $2 RETURNING *",
        )
        .bind(token_hash)
        .bind(now)
        .bind(password_hash)
        .bind(changed_at)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_confirmation_token(&self, id: Uuid, token_hash: String) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET confirm_email_token = $2 WHERE id = $1")
            .bind(id)
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn consume_confirmation_token(&self, token_hash: &str) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, User>(
            "UPDATE users SET confirm_email_token = NULL, is_email_confirmed = true \
             WHERE confirm_email_token = $1 RETURNING *",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_users(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

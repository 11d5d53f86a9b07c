use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use serde_json::{json, Map, Value};
use uuid::Uuid;
use validator::Validate;

use crate::auth::NewUser;
use crate::database::models::{User, UserPatch};
use crate::error::ApiError;
use crate::filter::schema::USER_SCHEMA;
use crate::handlers::utils::parse_id;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::policy::{authorize, Action, Decision, PrincipalId, USER_POLICY};
use crate::state::AppState;

/// Every account route is admin-only; the account itself counts as the
/// owner of its record.
fn require(auth: &AuthUser, action: Action, target: Option<Uuid>) -> Result<(), ApiError> {
    match authorize(&auth.principal(), action, &USER_POLICY, target.map(PrincipalId)) {
        Decision::Allowed => Ok(()),
        Decision::Denied(reason) => {
            tracing::warn!("User {} denied {:?} on users: {}", auth.user.id, action, reason);
            Err(reason.into())
        }
    }
}

async fn load(state: &AppState, id: Uuid) -> Result<User, ApiError> {
    state
        .stores
        .credentials
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No user with the id of {}", id)))
}

/// GET /api/v1/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(raw): Query<Vec<(String, String)>>,
) -> ApiResult<Vec<Map<String, Value>>> {
    require(&auth, Action::Read, None)?;
    let query = state.compiler.compile(&USER_SCHEMA, &raw);
    let users = state.stores.credentials.find_users(&query).await?;
    Ok(ApiResponse::list(users))
}

/// GET /api/v1/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<User> {
    let id = parse_id(&id, "user")?;
    require(&auth, Action::Read, Some(id))?;
    Ok(ApiResponse::status(load(&state, id).await?))
}

/// POST /api/v1/users
pub async fn create_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<User> {
    require(&auth, Action::Create, None)?;
    let Json(new_user) = payload?;
    new_user.validate()?;
    let user = state.tokens.create_user(new_user).await?;
    tracing::info!("Admin {} created user {}", auth.user.id, user.id);
    Ok(ApiResponse::created(user))
}

/// PUT /api/v1/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> ApiResult<User> {
    let id = parse_id(&id, "user")?;
    require(&auth, Action::Update, Some(id))?;
    let Json(patch) = payload?;
    patch.validate()?;

    let user = state
        .stores
        .credentials
        .update_user(id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No user with the id of {}", id)))?;
    Ok(ApiResponse::status(user))
}

/// DELETE /api/v1/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let id = parse_id(&id, "user")?;
    require(&auth, Action::Delete, Some(id))?;
    if !state.stores.credentials.delete_user(id).await? {
        return Err(ApiError::not_found(format!("No user with the id of {}", id)));
    }
    tracing::info!("Admin {} deleted user {}", auth.user.id, id);
    Ok(ApiResponse::status(json!({})))
}

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::database::models::Document;
use crate::handlers::public::catalog::envelope_for;
use crate::handlers::utils::{object_body, parse_id};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::{ResourceKind, BOOTCAMPS, COURSES, REVIEWS};
use crate::state::AppState;

type Body = Result<Json<Value>, JsonRejection>;

async fn create_child(
    state: &AppState,
    auth: &AuthUser,
    kind: &ResourceKind,
    parent: &str,
    payload: Body,
) -> ApiResult<Document> {
    let parent_label = kind.parent.as_ref().map(|p| p.kind.label).unwrap_or(kind.label);
    let parent_id = parse_id(parent, parent_label)?;
    let body = object_body(payload)?;
    let doc = state
        .resources
        .create_child(kind, &auth.principal(), parent_id, body)
        .await?;
    Ok(ApiResponse::created(doc))
}

async fn update(state: &AppState, auth: &AuthUser, kind: &ResourceKind, id: &str, payload: Body) -> ApiResult<Document> {
    let id = parse_id(id, kind.label)?;
    let body = object_body(payload)?;
    let doc = state.resources.update(kind, &auth.principal(), id, body).await?;
    Ok(ApiResponse::success(doc).with_envelope(envelope_for(kind)))
}

async fn delete(state: &AppState, auth: &AuthUser, kind: &ResourceKind, id: &str) -> ApiResult<Value> {
    let id = parse_id(id, kind.label)?;
    state.resources.delete(kind, &auth.principal(), id).await?;
    Ok(ApiResponse::success(json!({})).with_envelope(envelope_for(kind)))
}

/// POST /api/v1/bootcamps
pub async fn create_bootcamp(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    payload: Body,
) -> ApiResult<Document> {
    let body = object_body(payload)?;
    let doc = state.resources.create(&BOOTCAMPS, &auth.principal(), body).await?;
    Ok(ApiResponse::created(doc))
}

/// PUT /api/v1/bootcamps/:id
pub async fn update_bootcamp(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Body,
) -> ApiResult<Document> {
    update(&state, &auth, &BOOTCAMPS, &id, payload).await
}

/// DELETE /api/v1/bootcamps/:id
pub async fn delete_bootcamp(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    delete(&state, &auth, &BOOTCAMPS, &id).await
}

/// POST /api/v1/bootcamps/:id/courses
pub async fn add_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Body,
) -> ApiResult<Document> {
    create_child(&state, &auth, &COURSES, &id, payload).await
}

/// PUT /api/v1/courses/:id
pub async fn update_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Body,
) -> ApiResult<Document> {
    update(&state, &auth, &COURSES, &id, payload).await
}

/// DELETE /api/v1/courses/:id
pub async fn delete_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    delete(&state, &auth, &COURSES, &id).await
}

/// POST /api/v1/bootcamps/:id/reviews
pub async fn add_review(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Body,
) -> ApiResult<Document> {
    create_child(&state, &auth, &REVIEWS, &id, payload).await
}

/// PUT /api/v1/reviews/:id
pub async fn update_review(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Body,
) -> ApiResult<Document> {
    update(&state, &auth, &REVIEWS, &id, payload).await
}

/// DELETE /api/v1/reviews/:id
pub async fn delete_review(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    delete(&state, &auth, &REVIEWS, &id).await
}

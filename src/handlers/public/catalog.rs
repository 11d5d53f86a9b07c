use axum::extract::{Path, Query, State};

use crate::database::models::Document;
use crate::handlers::utils::parse_id;
use crate::middleware::{ApiResponse, ApiResult, Envelope};
use crate::services::{ResourceKind, BOOTCAMPS, COURSES, REVIEWS};
use crate::state::AppState;

/// Raw query pairs, in order, handed to the query compiler untouched.
pub type RawQuery = Query<Vec<(String, String)>>;

/// Single-resource envelope per catalog kind.
pub(crate) fn envelope_for(kind: &ResourceKind) -> Envelope {
    if std::ptr::eq(kind, &REVIEWS) {
        Envelope::Success
    } else {
        Envelope::Status
    }
}

async fn list(state: &AppState, kind: &ResourceKind, raw: &[(String, String)]) -> ApiResult<Vec<Document>> {
    let docs = state.resources.list(kind, &state.compiler, raw).await?;
    Ok(ApiResponse::list(docs))
}

async fn list_children(
    state: &AppState,
    kind: &ResourceKind,
    parent: &str,
    raw: &[(String, String)],
) -> ApiResult<Vec<Document>> {
    let parent_label = kind.parent.as_ref().map(|p| p.kind.label).unwrap_or(kind.label);
    let parent_id = parse_id(parent, parent_label)?;
    let docs = state
        .resources
        .list_children(kind, parent_id, &state.compiler, raw)
        .await?;
    Ok(ApiResponse::list(docs))
}

async fn get(state: &AppState, kind: &ResourceKind, id: &str) -> ApiResult<Document> {
    let id = parse_id(id, kind.label)?;
    let doc = state.resources.get(kind, id).await?;
    Ok(ApiResponse::success(doc).with_envelope(envelope_for(kind)))
}

/// GET /api/v1/bootcamps
pub async fn list_bootcamps(State(state): State<AppState>, Query(raw): RawQuery) -> ApiResult<Vec<Document>> {
    list(&state, &BOOTCAMPS, &raw).await
}

/// GET /api/v1/bootcamps/:id
pub async fn get_bootcamp(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Document> {
    get(&state, &BOOTCAMPS, &id).await
}

/// GET /api/v1/courses
pub async fn list_courses(State(state): State<AppState>, Query(raw): RawQuery) -> ApiResult<Vec<Document>> {
    list(&state, &COURSES, &raw).await
}

/// GET /api/v1/bootcamps/:id/courses
pub async fn list_bootcamp_courses(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(raw): RawQuery,
) -> ApiResult<Vec<Document>> {
    list_children(&state, &COURSES, &id, &raw).await
}

/// GET /api/v1/courses/:id
pub async fn get_course(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Document> {
    get(&state, &COURSES, &id).await
}

/// GET /api/v1/reviews
pub async fn list_reviews(State(state): State<AppState>, Query(raw): RawQuery) -> ApiResult<Vec<Document>> {
    list(&state, &REVIEWS, &raw).await
}

/// GET /api/v1/bootcamps/:id/reviews
pub async fn list_bootcamp_reviews(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(raw): RawQuery,
) -> ApiResult<Vec<Document>> {
    list_children(&state, &REVIEWS, &id, &raw).await
}

/// GET /api/v1/reviews/:id
pub async fn get_review(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Document> {
    get(&state, &REVIEWS, &id).await
}

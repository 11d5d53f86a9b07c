use axum::{extract::rejection::JsonRejection, Json};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::database::models::User;
use crate::error::ApiError;
use crate::state::AppState;

/// Malformed ids are reported like missing ones.
pub fn parse_id(raw: &str, label: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found(format!("No {} with the id of {}", label, raw)))
}

/// JSON object body; anything else is a 400.
pub fn object_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Map<String, Value>, ApiError> {
    match payload? {
        Json(Value::Object(map)) => Ok(map),
        Json(_) => Err(ApiError::invalid_json("Request body must be a JSON object")),
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: User,
}

/// Fresh session for `user`, as returned by every login-like endpoint.
pub fn token_response(state: &AppState, user: User) -> Result<TokenResponse, ApiError> {
    let token = state.tokens.issue_session(&user)?;
    Ok(TokenResponse { token, user })
}

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::Password;
use crate::database::models::{User, UserPatch};
use crate::error::ApiError;
use crate::handlers::utils::{object_body, token_response, TokenResponse};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDetailsRequest {
    #[validate(length(min = 1, message = "Please add a name"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    #[serde(rename = "currentPassword", alias = "current_password")]
    pub current_password: String,
    #[serde(rename = "newPassword", alias = "new_password")]
    pub new_password: String,
}

/// GET /api/v1/auth/me
pub async fn me(Extension(auth): Extension<AuthUser>) -> ApiResult<User> {
    Ok(ApiResponse::status(auth.user))
}

/// PUT /api/v1/auth/update-details
///
/// Name and email only; role and credentials cannot be changed here.
pub async fn update_details(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let body = object_body(payload)?;
    if body.contains_key("password") || body.contains_key("passwordConfirm") {
        return Err(ApiError::bad_request(
            "This route is not for password updates. Please use /update-password",
        ));
    }
    let request: UpdateDetailsRequest =
        serde_json::from_value(Value::Object(body)).map_err(|e| ApiError::invalid_json(e.to_string()))?;
    request.validate()?;
    if request.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::validation_error("Please add a name", None));
    }

    let patch = UserPatch {
        name: request.name.map(|n| n.trim().to_string()),
        email: request.email,
        role: None,
    };
    let user = state
        .stores
        .credentials
        .update_user(auth.user.id, &patch)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Not authorized to access this route"))?;

    Ok(ApiResponse::status(json!({ "user": user })))
}

/// PUT /api/v1/auth/update-password
///
/// Earlier sessions stop verifying; the response carries a fresh one.
pub async fn update_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<UpdatePasswordRequest>, JsonRejection>,
) -> ApiResult<TokenResponse> {
    let Json(request) = payload?;
    let user = state
        .tokens
        .update_password(
            auth.user.id,
            &request.current_password,
            Password::new(request.new_password),
        )
        .await?;

    tracing::info!("User {} changed password", user.id);
    Ok(ApiResponse::success(token_response(&state, user)?))
}

/// DELETE /api/v1/auth/me
pub async fn delete_me(State(state): State<AppState>, Extension(auth): Extension<AuthUser>) -> ApiResult<Value> {
    if !state.stores.credentials.delete_user(auth.user.id).await? {
        return Err(ApiError::not_found(format!("No user with id of {}", auth.user.id)));
    }
    tracing::info!("User {} deleted their account", auth.user.id);
    Ok(ApiResponse::status(json!({})))
}

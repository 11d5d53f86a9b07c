use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::{AuthError, NewUser, Password};
use crate::database::models::user::normalize_email;
use crate::database::models::User;
use crate::error::ApiError;
use crate::handlers::utils::{token_response, TokenResponse};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::{MailKind, OutboundMail};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailQuery {
    pub token: Option<String>,
}

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<TokenResponse> {
    let Json(new_user) = payload?;
    new_user.validate()?;
    let user = state.tokens.register(new_user).await?;

    // the account stands even if the confirmation mail fails
    if let Err(e) = send_confirmation(&state, &user).await {
        tracing::warn!("Confirmation mail for {} not sent: {}", user.id, e);
    }

    Ok(ApiResponse::created(token_response(&state, user)?))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<TokenResponse> {
    let Json(request) = payload?;
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("Please provide an email and password"));
    }

    let user = state.tokens.authenticate(&request.email, &request.password).await?;
    tracing::info!("User {} logged in", user.id);
    Ok(ApiResponse::success(token_response(&state, user)?))
}

/// POST /api/v1/auth/forgot-password
///
/// Answers the same way whether or not the address is registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = payload?;
    let email = normalize_email(&request.email);
    if email.is_empty() {
        return Err(ApiError::bad_request("Please provide an email"));
    }

    if let Some(user) = state.stores.credentials.find_user_by_email(&email).await? {
        let secret = state.tokens.issue_reset_token(user.id).await?;
        let mail = OutboundMail {
            to: user.email.clone(),
            kind: MailKind::PasswordReset,
            link: format!("{}/api/v1/auth/reset-password/{}", state.config.server.public_url, secret),
            secret,
        };
        if let Err(e) = state.mailer.send(mail).await {
            tracing::error!("Reset mail for {} not sent: {}", user.id, e);
            return Err(ApiError::internal_server_error("Email could not be sent"));
        }
        tracing::info!("Issued password reset for {}", user.id);
    }

    Ok(ApiResponse::success(json!("If the address is registered, a reset link has been sent")))
}

/// PUT /api/v1/auth/reset-password/:token
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> ApiResult<TokenResponse> {
    let Json(request) = payload?;
    let user = state
        .tokens
        .consume_reset_token(&token, Password::new(request.password))
        .await
        .map_err(invalid_token)?;

    tracing::info!("Password reset completed for {}", user.id);
    Ok(ApiResponse::success(token_response(&state, user)?))
}

/// GET /api/v1/auth/confirm-email?token=
pub async fn confirm_email(
    State(state): State<AppState>,
    Query(query): Query<ConfirmEmailQuery>,
) -> ApiResult<TokenResponse> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("Invalid token"))?;

    let user = state
        .tokens
        .consume_confirmation_token(&token)
        .await
        .map_err(invalid_token)?;

    tracing::info!("Email confirmed for {}", user.id);
    Ok(ApiResponse::success(token_response(&state, user)?))
}

/// Unknown, used and expired secrets all read as one 400.
fn invalid_token(err: AuthError) -> ApiError {
    match err {
        AuthError::Unauthenticated => ApiError::bad_request("Invalid token"),
        other => other.into(),
    }
}

async fn send_confirmation(state: &AppState, user: &User) -> Result<(), ApiError> {
    let secret = state.tokens.issue_confirmation_token(user.id).await?;
    let mail = OutboundMail {
        to: user.email.clone(),
        kind: MailKind::EmailConfirmation,
        link: format!("{}/api/v1/auth/confirm-email?token={}", state.config.server.public_url, secret),
        secret,
    };
    state
        .mailer
        .send(mail)
        .await
        .map_err(|e| ApiError::internal_server_error(e.to_string()))
}

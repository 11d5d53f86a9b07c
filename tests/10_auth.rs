mod common;

use anyhow::Result;
use common::TestServer;
use devcamper_api::{auth::TokenService, config::AppConfig, services::MailKind};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = TestServer::spawn().await?;

    let res = server.client.get(server.url("/health")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["database"], json!("ok"));
    Ok(())
}

#[tokio::test]
async fn register_login_and_me() -> Result<()> {
    let server = TestServer::spawn().await?;
    server.register("Jane", "jane@example.com", "user").await?;

    let res = server.login("JANE@example.com", "123456789").await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let token = body["data"]["token"].as_str().unwrap_or_default().to_string();
    assert!(body["data"]["user"].get("password_hash").is_none());

    let me: Value = server
        .client
        .get(server.url("/api/v1/auth/me"))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(me["status"], json!("success"));
    assert_eq!(me["data"]["email"], json!("jane@example.com"));
    assert_eq!(me["data"]["role"], json!("user"));
    Ok(())
}

#[tokio::test]
async fn bad_credentials_and_tokens_are_401() -> Result<()> {
    let server = TestServer::spawn().await?;
    server.register("Jane", "jane@example.com", "user").await?;

    let wrong = server.login("jane@example.com", "not-the-password").await?;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let unknown = server.login("nobody@example.com", "123456789").await?;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);

    let missing = server.client.get(server.url("/api/v1/auth/me")).send().await?;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let garbage = server
        .client
        .get(server.url("/api/v1/auth/me"))
        .bearer_auth("definitely.not.ajwt")
        .send()
        .await?;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
    let body: Value = garbage.json().await?;
    assert_eq!(body["code"], json!("UNAUTHORIZED"));
    Ok(())
}

#[tokio::test]
async fn registration_rejects_admin_and_duplicates() -> Result<()> {
    let server = TestServer::spawn().await?;

    let admin = server
        .client
        .post(server.url("/api/v1/auth/register"))
        .json(&json!({"name": "Root", "email": "root@example.com", "password": "123456789", "role": "admin"}))
        .send()
        .await?;
    assert_eq!(admin.status(), StatusCode::BAD_REQUEST);

    server.register("Jane", "jane@example.com", "user").await?;
    let dup = server
        .client
        .post(server.url("/api/v1/auth/register"))
        .json(&json!({"name": "Jane", "email": "Jane@Example.com", "password": "123456789"}))
        .send()
        .await?;
    assert_eq!(dup.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn password_update_invalidates_old_sessions() -> Result<()> {
    let server = TestServer::spawn().await?;
    let old_token = server.register("Jane", "jane@example.com", "user").await?;

    // sessions carry second precision; step past the change skew
    tokio::time::sleep(std::time::Duration::from_millis(2100)).await;

    let res = server
        .client
        .put(server.url("/api/v1/auth/update-password"))
        .bearer_auth(&old_token)
        .json(&json!({"currentPassword": "123456789", "newPassword": "a-better-password"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let new_token = body["data"]["token"].as_str().unwrap_or_default().to_string();

    let stale = server
        .client
        .get(server.url("/api/v1/auth/me"))
        .bearer_auth(&old_token)
        .send()
        .await?;
    assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);

    let fresh = server
        .client
        .get(server.url("/api/v1/auth/me"))
        .bearer_auth(&new_token)
        .send()
        .await?;
    assert_eq!(fresh.status(), StatusCode::OK);

    assert_eq!(server.login("jane@example.com", "123456789").await?.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(server.login("jane@example.com", "a-better-password").await?.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn update_details_refuses_password_and_role() -> Result<()> {
    let server = TestServer::spawn().await?;
    let token = server.register("Jane", "jane@example.com", "user").await?;

    let with_password = server
        .client
        .put(server.url("/api/v1/auth/update-details"))
        .bearer_auth(&token)
        .json(&json!({"password": "sneaky-password"}))
        .send()
        .await?;
    assert_eq!(with_password.status(), StatusCode::BAD_REQUEST);

    let res = server
        .client
        .put(server.url("/api/v1/auth/update-details"))
        .bearer_auth(&token)
        .json(&json!({"name": "Jane Doe", "role": "admin"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["user"]["name"], json!("Jane Doe"));
    assert_eq!(body["data"]["user"]["role"], json!("user"));
    Ok(())
}

#[tokio::test]
async fn malformed_emails_are_rejected_everywhere() -> Result<()> {
    let server = TestServer::spawn().await?;

    let register = server
        .client
        .post(server.url("/api/v1/auth/register"))
        .json(&json!({"name": "Jane", "email": "not an email", "password": "123456789"}))
        .send()
        .await?;
    assert_eq!(register.status(), StatusCode::BAD_REQUEST);
    let body: Value = register.json().await?;
    assert_eq!(body["code"], json!("VALIDATION_ERROR"));
    assert_eq!(body["field_errors"]["email"], json!("Please provide a valid email"));

    let short = server
        .client
        .post(server.url("/api/v1/auth/register"))
        .json(&json!({"name": "Jane", "email": "jane@example.com", "password": "short"}))
        .send()
        .await?;
    assert_eq!(short.status(), StatusCode::BAD_REQUEST);
    let body: Value = short.json().await?;
    assert!(body["field_errors"].get("password").is_some());

    let token = server.register("Jane", "jane@example.com", "user").await?;
    for email in ["@", "jane@", "jane at example.com"] {
        let res = server
            .client
            .put(server.url("/api/v1/auth/update-details"))
            .bearer_auth(&token)
            .json(&json!({ "email": email }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{}", email);
    }

    let me: Value = server
        .client
        .get(server.url("/api/v1/auth/me"))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(me["data"]["email"], json!("jane@example.com"));
    Ok(())
}

#[tokio::test]
async fn forgot_and_reset_password_is_single_use() -> Result<()> {
    let server = TestServer::spawn().await?;
    server.register("Jane", "jane@example.com", "user").await?;

    // unknown addresses get the same answer and no mail
    let before = server.outbox.len().await;
    let unknown = server
        .client
        .post(server.url("/api/v1/auth/forgot-password"))
        .json(&json!({"email": "nobody@example.com"}))
        .send()
        .await?;
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(server.outbox.len().await, before);

    let res = server
        .client
        .post(server.url("/api/v1/auth/forgot-password"))
        .json(&json!({"email": "jane@example.com"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let secret = server
        .last_secret("jane@example.com", MailKind::PasswordReset)
        .await
        .expect("reset mail sent");

    let reset_url = server.url(&format!("/api/v1/auth/reset-password/{}", secret));
    let first = server
        .client
        .put(&reset_url)
        .json(&json!({"password": "reset-password-1"}))
        .send()
        .await?;
    assert_eq!(first.status(), StatusCode::OK);

    let second = server
        .client
        .put(&reset_url)
        .json(&json!({"password": "reset-password-2"}))
        .send()
        .await?;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);

    assert_eq!(server.login("jane@example.com", "reset-password-1").await?.status(), StatusCode::OK);
    assert_eq!(server.login("jane@example.com", "reset-password-2").await?.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn expired_and_unknown_reset_tokens_look_the_same() -> Result<()> {
    let server = TestServer::spawn().await?;
    server.register("Jane", "jane@example.com", "user").await?;
    let user = server
        .stores
        .credentials
        .find_user_by_email("jane@example.com")
        .await?
        .expect("registered user");

    // a token issued an hour ago is past its ten minute lifetime
    let tokens = TokenService::new(server.stores.credentials.clone(), &AppConfig::in_memory().security)?;
    let expired = tokens
        .issue_reset_token_at(user.id, chrono::Utc::now() - chrono::Duration::hours(1))
        .await?;

    let mut answers = Vec::new();
    for secret in [expired.as_str(), "0123456789abcdef0123456789abcdef"] {
        let res = server
            .client
            .put(server.url(&format!("/api/v1/auth/reset-password/{}", secret)))
            .json(&json!({"password": "reset-password-1"}))
            .send()
            .await?;
        answers.push((res.status(), res.json::<Value>().await?));
    }
    assert_eq!(answers[0].0, StatusCode::BAD_REQUEST);
    assert_eq!(answers[0], answers[1]);
    assert_eq!(answers[0].1["message"], json!("Invalid token"));

    assert_eq!(server.login("jane@example.com", "123456789").await?.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn email_confirmation() -> Result<()> {
    let server = TestServer::spawn().await?;
    let token = server.register("Jane", "jane@example.com", "user").await?;
    let secret = server
        .last_secret("jane@example.com", MailKind::EmailConfirmation)
        .await
        .expect("confirmation mail sent");

    let bogus = server
        .client
        .get(server.url("/api/v1/auth/confirm-email?token=deadbeef"))
        .send()
        .await?;
    assert_eq!(bogus.status(), StatusCode::BAD_REQUEST);

    let res = server
        .client
        .get(server.url(&format!("/api/v1/auth/confirm-email?token={}", secret)))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let me: Value = server
        .client
        .get(server.url("/api/v1/auth/me"))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(me["data"]["is_email_confirmed"], json!(true));
    Ok(())
}

#[tokio::test]
async fn delete_me_removes_account() -> Result<()> {
    let server = TestServer::spawn().await?;
    let token = server.register("Jane", "jane@example.com", "user").await?;

    let res = server
        .client
        .delete(server.url("/api/v1/auth/me"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let after = server
        .client
        .get(server.url("/api/v1/auth/me"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

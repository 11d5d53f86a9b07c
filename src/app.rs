use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{elevated, protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.security.cors_origins);

    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth_public_routes())
        .merge(catalog_public_routes())
        // Bearer session required
        .merge(protected_routes(state.clone()))
        // Admin only
        .merge(elevated_routes(state.clone()))
        // Global middleware
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    use public::auth;

    Router::new()
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/forgot-password", post(auth::forgot_password))
        .route("/api/v1/auth/reset-password/:token", put(auth::reset_password))
        .route("/api/v1/auth/confirm-email", get(auth::confirm_email))
}

fn catalog_public_routes() -> Router<AppState> {
    use public::catalog;

    Router::new()
        .route("/api/v1/bootcamps", get(catalog::list_bootcamps))
        .route("/api/v1/bootcamps/:id", get(catalog::get_bootcamp))
        .route("/api/v1/bootcamps/:id/courses", get(catalog::list_bootcamp_courses))
        .route("/api/v1/bootcamps/:id/reviews", get(catalog::list_bootcamp_reviews))
        .route("/api/v1/courses", get(catalog::list_courses))
        .route("/api/v1/courses/:id", get(catalog::get_course))
        .route("/api/v1/reviews", get(catalog::list_reviews))
        .route("/api/v1/reviews/:id", get(catalog::get_review))
}

/// Same paths as the public catalog, other methods. `route_layer` keeps the
/// session check off the public GETs after the merge.
fn protected_routes(state: AppState) -> Router<AppState> {
    use protected::{account, catalog};

    Router::new()
        .route("/api/v1/auth/me", get(account::me).delete(account::delete_me))
        .route("/api/v1/auth/update-details", put(account::update_details))
        .route("/api/v1/auth/update-password", put(account::update_password))
        .route("/api/v1/bootcamps", post(catalog::create_bootcamp))
        .route(
            "/api/v1/bootcamps/:id",
            put(catalog::update_bootcamp).delete(catalog::delete_bootcamp),
        )
        .route("/api/v1/bootcamps/:id/courses", post(catalog::add_course))
        .route("/api/v1/bootcamps/:id/reviews", post(catalog::add_review))
        .route(
            "/api/v1/courses/:id",
            put(catalog::update_course).delete(catalog::delete_course),
        )
        .route(
            "/api/v1/reviews/:id",
            put(catalog::update_review).delete(catalog::delete_review),
        )
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn elevated_routes(state: AppState) -> Router<AppState> {
    use elevated::users;

    Router::new()
        .route("/api/v1/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/v1/users/:id",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "DevCamper API",
            "version": version,
            "description": "Bootcamp directory backend built with Rust (Axum)",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "auth": "/api/v1/auth/* (register, login, password reset and confirmation public; account routes need a bearer token)",
                "bootcamps": "/api/v1/bootcamps[/:id[/courses|/reviews]] (reads public, writes need a bearer token)",
                "courses": "/api/v1/courses[/:id] (reads public, writes need a bearer token)",
                "reviews": "/api/v1/reviews[/:id] (reads public, writes need a bearer token)",
                "users": "/api/v1/users[/:id] (admin)",
            },
            "query": {
                "filter": "field[gt|gte|lt|lte|in]=value",
                "select": "select=a,b",
                "sort": "sort=-field,other",
                "pagination": "page=N&limit=M",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.stores.documents.ping().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}

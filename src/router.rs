use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};
use http::{Method, header};
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{handlers, middleware_layer, state::AppState};

/// Assembles the application router.
///
/// Route layers are added innermost-first, so on every protected route the
/// rate limiter (added last) runs before the guard: rate limit ->
/// authenticate -> handler.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse().unwrap(),
            "http://127.0.0.1:3000".parse().unwrap(),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::COOKIE,
            "x-session-id".parse().unwrap(),
        ])
        .allow_credentials(true)
        .expose_headers([
            "x-ratelimit-limit".parse().unwrap(),
            "x-ratelimit-remaining".parse().unwrap(),
            "x-ratelimit-reset".parse().unwrap(),
        ])
        .max_age(Duration::from_secs(86400));

    // Session exchange sits in the stricter auth rate-limit class.
    let exchange_routes = Router::new()
        .route("/api/sessions", post(handlers::sessions::exchange_session))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_auth,
        ))
        .with_state(state.clone());

    let management_routes = Router::new()
        .route("/api/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/api/sessions/{session_id}",
            delete(handlers::sessions::revoke_session),
        )
        .route("/api/auth/logout-all", post(handlers::sessions::logout_all))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_general,
        ))
        .with_state(state.clone());

    // Logout and current-session writes must always be revocable, so they
    // take the session-only guard.
    let session_only_routes = Router::new()
        .route("/api/auth/logout", post(handlers::sessions::logout))
        .route(
            "/api/sessions/current/metadata",
            patch(handlers::sessions::patch_session_metadata),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_session,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_general,
        ))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .with_state(state);

    Router::new()
        .merge(exchange_routes)
        .merge(management_routes)
        .merge(session_only_routes)
        .merge(health_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(cors)
}

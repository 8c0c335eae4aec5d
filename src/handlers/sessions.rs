use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tower_cookies::{Cookie, Cookies, cookie::time::Duration};

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::SESSION_COOKIE,
    middleware_layer::rate_limit::extract_client_addr,
    models::identity::AuthContext,
    services::sessions::NewSession,
    state::AppState,
};

/// The response payload for simple session-management requests.
#[derive(Serialize)]
pub struct SessionActionResponse {
    pub success: bool,
    pub message: String,
}

/// The response payload for a freshly minted session.
#[derive(Serialize)]
pub struct CreatedSessionResponse {
    pub session_id: String,
    pub expires_in: i64,
}

/// One entry in the caller's device/session listing.
#[derive(Serialize)]
pub struct SessionDetails {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub current: bool,
}

/// The response payload for logout-everywhere.
#[derive(Serialize)]
pub struct LogoutAllResponse {
    pub success: bool,
    pub destroyed: u64,
}

/// Creates a secure cookie with the given name, value, and max age.
fn create_secure_cookie(name: String, value: String, max_age_seconds: i64) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);

    let is_production =
        std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()) == "production";

    cookie.set_http_only(true);
    if is_production {
        cookie.set_secure(true);
    }

    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::seconds(max_age_seconds));
    cookie.set_path("/");

    cookie
}

/// Mints a server-side session for the authenticated caller.
///
/// This is the adoption path for bearer-token clients (and the entry point
/// the credential-verifying auth service calls over HTTP): exchange a
/// stateless identity for a revocable session. Device details observed on
/// this request are recorded on the session.
#[axum::debug_handler]
pub async fn exchange_session(
    State(state): State<AppState>,
    cookies: Cookies,
    Extension(ctx): Extension<AuthContext>,
    request: Request<Body>,
) -> Result<Response> {
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let ip_address = Some(extract_client_addr(&request));

    let session = state
        .sessions
        .create_session(NewSession {
            user_id: ctx.user_id,
            email: ctx.email,
            role: ctx.role,
            tenant_id: ctx.tenant_id,
            user_agent,
            ip_address,
            metadata: HashMap::new(),
        })
        .await?;

    cookies.add(create_secure_cookie(
        SESSION_COOKIE.to_string(),
        session.session_id.clone(),
        state.config.session_ttl_seconds,
    ));

    let response = CreatedSessionResponse {
        session_id: session.session_id,
        expires_in: state.config.session_ttl_seconds,
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Lists the caller's live sessions, most recently used first.
#[axum::debug_handler]
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Response> {
    let sessions = state
        .sessions
        .get_user_sessions_with_details(ctx.user_id)
        .await?;

    let details: Vec<SessionDetails> = sessions
        .into_iter()
        .map(|session| SessionDetails {
            current: ctx.session_id.as_deref() == Some(session.session_id.as_str()),
            session_id: session.session_id,
            created_at: session.created_at,
            last_accessed_at: session.last_accessed_at,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
        })
        .collect();

    Ok(Json(details).into_response())
}

/// Revokes one of the caller's sessions ("sign out that device").
#[axum::debug_handler]
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(session_id): Path<String>,
) -> Result<Response> {
    if !state
        .sessions
        .destroy_owned_session(ctx.user_id, &session_id)
        .await?
    {
        return Err(AppError::NotFound);
    }

    let response = SessionActionResponse {
        success: true,
        message: "Session revoked".to_string(),
    };

    Ok(Json(response).into_response())
}

/// Maximum number of entries accepted in one metadata patch.
const MAX_METADATA_ENTRIES: usize = 16;
/// Maximum length of a metadata key or value.
const MAX_METADATA_FIELD_LEN: usize = 256;

/// Merges metadata into the caller's current session.
#[axum::debug_handler]
pub async fn patch_session_metadata(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(patch): Json<HashMap<String, String>>,
) -> Result<Response> {
    if patch.is_empty() {
        return Err(AppError::Validation("Metadata patch is empty".to_string()));
    }
    if patch.len() > MAX_METADATA_ENTRIES {
        return Err(AppError::Validation(format!(
            "Metadata patch exceeds {} entries",
            MAX_METADATA_ENTRIES
        )));
    }
    if patch
        .iter()
        .any(|(k, v)| k.len() > MAX_METADATA_FIELD_LEN || v.len() > MAX_METADATA_FIELD_LEN)
    {
        return Err(AppError::Validation(format!(
            "Metadata keys and values are limited to {} bytes",
            MAX_METADATA_FIELD_LEN
        )));
    }

    // The session-only guard always sets this.
    let session_id = ctx.session_id.ok_or(AppError::Unauthorized)?;

    if !state
        .sessions
        .update_session_metadata(&session_id, patch)
        .await?
    {
        return Err(AppError::NotFound);
    }

    let response = SessionActionResponse {
        success: true,
        message: "Session metadata updated".to_string(),
    };

    Ok(Json(response).into_response())
}

/// Handles user logout: destroys the current session and clears cookies.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    cookies: Cookies,
) -> Result<Response> {
    let session_id = ctx.session_id.ok_or(AppError::Unauthorized)?;
    tracing::info!("👋 Logout for user {}", ctx.user_id);

    state.sessions.destroy_session(&session_id).await?;

    let mut session_cookie = Cookie::new(SESSION_COOKIE, "");
    session_cookie.set_max_age(Duration::seconds(0));
    session_cookie.set_path("/");
    cookies.remove(session_cookie);

    let response = SessionActionResponse {
        success: true,
        message: "Logout successful".to_string(),
    };

    Ok(Json(response).into_response())
}

/// Handles logout-everywhere: destroys every session of the caller.
#[axum::debug_handler]
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    cookies: Cookies,
) -> Result<Response> {
    tracing::info!("👋 Logout-everywhere for user {}", ctx.user_id);

    let destroyed = state.sessions.destroy_all_user_sessions(ctx.user_id).await?;

    let mut session_cookie = Cookie::new(SESSION_COOKIE, "");
    session_cookie.set_max_age(Duration::seconds(0));
    session_cookie.set_path("/");
    cookies.remove(session_cookie);

    Ok(Json(LogoutAllResponse {
        success: true,
        destroyed,
    })
    .into_response())
}

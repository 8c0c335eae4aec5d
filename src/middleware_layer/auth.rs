use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;

use crate::{
    error::{AppError, Result},
    models::identity::AuthContext,
    state::AppState,
};

/// Header carrying the session identifier.
pub const SESSION_HEADER: &str = "x-session-id";
/// Cookie carrying the session identifier.
pub const SESSION_COOKIE: &str = "session_id";

/// Extracts the candidate session id from the dedicated header, falling
/// back to the session cookie.
fn extract_session_id(request: &Request<Body>, cookies: &Cookies) -> Option<String> {
    if let Some(value) = request
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }

    cookies
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Extracts the bearer token from the Authorization header. The `Bearer `
/// prefix is required.
fn extract_bearer_token(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// A guard that accepts only a valid session.
///
/// The strict variant: identity on this path is always server-revocable,
/// so routes that must honor logout (logout itself, metadata writes on the
/// current session) hang off it.
pub async fn require_session(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let session_id = extract_session_id(&request, &cookies)
        .ok_or_else(|| AppError::Authentication("no session credentials provided".to_string()))?;

    let session = state.sessions.validate_session(&session_id).await?;

    tracing::debug!("✅ Session path authenticated user {}", session.user_id);
    request.extensions_mut().insert(AuthContext::from(&session));

    Ok(next.run(request).await)
}

/// The hybrid guard: session-first, stateless-token fallback.
///
/// The session path is tried first because it carries richer,
/// server-revocable identity; a failed session attempt falls through to
/// bearer verification rather than rejecting, preserving compatibility
/// with clients that have not adopted sessions. Only when both paths are
/// exhausted is the request rejected.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    if let Some(session_id) = extract_session_id(&request, &cookies) {
        match state.sessions.validate_session(&session_id).await {
            Ok(session) => {
                tracing::debug!("✅ Session path authenticated user {}", session.user_id);
                request.extensions_mut().insert(AuthContext::from(&session));
                return Ok(next.run(request).await);
            }
            Err(e) => {
                tracing::debug!("Session path failed ({}), trying bearer fallback", e);
            }
        }
    }

    let token = extract_bearer_token(&request)
        .ok_or_else(|| AppError::Authentication("no credentials provided".to_string()))?;

    let claims = state.tokens.verify(&token)?;

    tracing::debug!("✅ Token path authenticated user {}", claims.user_id);
    request.extensions_mut().insert(AuthContext::from(claims));

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_auth(value: &str) -> Request<Body> {
        Request::builder()
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(
            extract_bearer_token(&request_with_auth("Bearer abc.def.ghi")),
            Some("abc.def.ghi".to_string())
        );
        assert_eq!(extract_bearer_token(&request_with_auth("abc.def.ghi")), None);
        assert_eq!(extract_bearer_token(&request_with_auth("Basic dXNlcg==")), None);
        assert_eq!(extract_bearer_token(&request_with_auth("Bearer ")), None);
    }

    #[test]
    fn missing_authorization_header_yields_none() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_bearer_token(&request), None);
    }
}

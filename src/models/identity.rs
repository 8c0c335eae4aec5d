use uuid::Uuid;

use crate::models::session::Session;
use crate::services::tokens::AccessClaims;

/// The request-scoped identity populated by the authentication guards.
///
/// `session_id` is present only when the session path authenticated the
/// request; the stateless token path is session-less and cannot be revoked
/// server-side.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The authenticated user's ID.
    pub user_id: Uuid,
    /// The authenticated user's email address.
    pub email: String,
    /// The authenticated user's role.
    pub role: String,
    /// The tenant scope, if any.
    pub tenant_id: Option<String>,
    /// The session that authenticated this request, if any.
    pub session_id: Option<String>,
}

impl From<&Session> for AuthContext {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            email: session.email.clone(),
            role: session.role.clone(),
            tenant_id: session.tenant_id.clone(),
            session_id: Some(session.session_id.clone()),
        }
    }
}

impl From<AccessClaims> for AuthContext {
    fn from(claims: AccessClaims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
            role: claims.role,
            tenant_id: claims.tenant_id,
            session_id: None,
        }
    }
}

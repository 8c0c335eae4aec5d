use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Represents one authenticated client context.
///
/// The record is owned exclusively by the session store: it is persisted
/// under `session:{session_id}` and mutated only through store operations.
/// `last_accessed_at` is advisory (used for LRU eviction and "your devices"
/// listings), never a security decision input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque high-entropy identifier; storage key and bearer credential.
    pub session_id: String,
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The user's email address.
    pub email: String,
    /// The user's role (brand, creator, admin).
    pub role: String,
    /// The tenant (agency/organization) scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp of the last successful lookup. Never precedes
    /// `created_at`.
    pub last_accessed_at: DateTime<Utc>,
    /// The User-Agent observed when the session was minted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// The client address observed when the session was minted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Free-form metadata attached by collaborators.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

use uuid::Uuid;

use crate::cache::CacheClient;
use crate::crypto::token::{generate_oauth_state, hash_state};
use crate::error::Result;

const OAUTH_STATE_KEY_PREFIX: &str = "oauth_state:";

/// How long an issued state token stays redeemable.
const OAUTH_STATE_TTL_SECONDS: i64 = 600;

/// Store for CSRF state tokens used in OAuth redirect flows.
///
/// Entries live in the shared KV store with a TTL, so they survive process
/// restarts and are visible to every instance. Only the SHA-256 digest of
/// a state token is stored; the raw value exists solely in the redirect
/// round trip.
#[derive(Clone)]
pub struct OAuthStateStore {
    cache: CacheClient,
}

impl OAuthStateStore {
    /// Creates a new `OAuthStateStore`.
    pub fn new(cache: CacheClient) -> Self {
        Self { cache }
    }

    /// Issues a state token bound to `user_id` and records its digest.
    pub async fn issue(&self, user_id: Uuid) -> Result<String> {
        let state = generate_oauth_state();
        let key = format!("{}{}", OAUTH_STATE_KEY_PREFIX, hash_state(&state));

        self.cache
            .set(&key, &user_id.to_string(), Some(OAUTH_STATE_TTL_SECONDS))
            .await?;

        tracing::debug!("✅ OAuth state issued for user {}", user_id);
        Ok(state)
    }

    /// Redeems a state token, returning the bound user exactly once.
    ///
    /// Unknown, expired, and already-consumed states all return `None`.
    pub async fn consume(&self, state: &str) -> Result<Option<Uuid>> {
        let key = format!("{}{}", OAUTH_STATE_KEY_PREFIX, hash_state(state));

        let Some(raw) = self.cache.get_delete(&key).await? else {
            return Ok(None);
        };

        match Uuid::parse_str(&raw) {
            Ok(user_id) => Ok(Some(user_id)),
            Err(_) => {
                tracing::warn!("⚠️  Discarding OAuth state with malformed binding");
                Ok(None)
            }
        }
    }
}

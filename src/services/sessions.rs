use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::HashMap;
use uuid::Uuid;

use crate::cache::CacheClient;
use crate::error::{AppError, Result, log_safe_id};
use crate::models::session::Session;

const SESSION_KEY_PREFIX: &str = "session:";
const USER_SESSIONS_KEY_PREFIX: &str = "user_sessions:";

/// Entropy of the random session-id suffix, in bytes.
const SESSION_ID_ENTROPY: usize = 32;

fn session_key(session_id: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, session_id)
}

fn user_sessions_key(user_id: Uuid) -> String {
    format!("{}{}", USER_SESSIONS_KEY_PREFIX, user_id)
}

/// Generates a session identifier: a fixed-width millisecond timestamp
/// prefix (rough chronological sortability) followed by 256 bits of
/// randomness (uniqueness and unguessability).
pub fn generate_session_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut suffix = [0u8; SESSION_ID_ENTROPY];
    OsRng.fill_bytes(&mut suffix);
    format!(
        "{:013x}.{}",
        millis,
        general_purpose::URL_SAFE_NO_PAD.encode(suffix)
    )
}

/// The attributes of a session about to be minted.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub tenant_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// The session store: exclusive owner of session records and the per-user
/// session index.
///
/// Record reads and writes are the critical path and propagate store
/// failures (authentication must fail closed). Index maintenance and
/// capacity eviction are housekeeping: failures there log and continue,
/// and detailed reads self-heal the resulting index/record skew.
#[derive(Clone)]
pub struct SessionStore {
    cache: CacheClient,
    ttl_seconds: i64,
    max_sessions_per_user: usize,
}

impl SessionStore {
    /// Creates a new `SessionStore`.
    pub fn new(cache: CacheClient, ttl_seconds: i64, max_sessions_per_user: usize) -> Self {
        Self {
            cache,
            ttl_seconds,
            max_sessions_per_user,
        }
    }

    /// Mints and persists a session, indexes it under its user, then
    /// enforces the per-user capacity cap by evicting the least recently
    /// accessed surplus sessions.
    pub async fn create_session(&self, new: NewSession) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            session_id: generate_session_id(),
            user_id: new.user_id,
            email: new.email,
            role: new.role,
            tenant_id: new.tenant_id,
            created_at: now,
            last_accessed_at: now,
            user_agent: new.user_agent,
            ip_address: new.ip_address,
            metadata: new.metadata,
        };

        self.cache
            .set_json(
                &session_key(&session.session_id),
                &session,
                Some(self.ttl_seconds),
            )
            .await?;

        if let Err(e) = self.index_session(&session).await {
            tracing::warn!(
                "⚠️  Failed to index session {} for user {}: {} - continuing",
                log_safe_id(&session.session_id),
                session.user_id,
                e
            );
        }

        if let Err(e) = self.enforce_session_cap(session.user_id).await {
            tracing::warn!(
                "⚠️  Session cap enforcement failed for user {}: {} - continuing",
                session.user_id,
                e
            );
        }

        tracing::info!(
            "✅ Session {} created for user {}",
            log_safe_id(&session.session_id),
            session.user_id
        );

        Ok(session)
    }

    /// Fetches a session and slides its expiry: `last_accessed_at` is
    /// bumped and the record re-persisted with a full TTL window.
    ///
    /// Returns `Ok(None)` on miss; store failures propagate.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let key = session_key(session_id);
        let Some(mut session) = self.cache.get_json::<Session>(&key).await? else {
            return Ok(None);
        };

        session.last_accessed_at = Utc::now();
        self.cache
            .set_json(&key, &session, Some(self.ttl_seconds))
            .await?;

        // Keep the index alive as long as its freshest member.
        if let Err(e) = self
            .cache
            .expire(&user_sessions_key(session.user_id), self.ttl_seconds)
            .await
        {
            tracing::warn!(
                "⚠️  Failed to slide index TTL for user {}: {} - continuing",
                session.user_id,
                e
            );
        }

        Ok(Some(session))
    }

    /// Like `get_session`, but a miss is an authentication failure, and a
    /// store outage fails closed as one too (never silently authenticate).
    pub async fn validate_session(&self, session_id: &str) -> Result<Session> {
        match self.get_session(session_id).await {
            Ok(Some(session)) => Ok(session),
            Ok(None) => Err(AppError::Authentication(format!(
                "invalid or expired session {}",
                log_safe_id(session_id)
            ))),
            Err(AppError::Redis(e)) => Err(AppError::Authentication(format!(
                "session store unavailable: {}",
                e
            ))),
            Err(e) => Err(e),
        }
    }

    /// Destroys one session. Idempotent: destroying a session that does
    /// not exist returns `false`, not an error.
    pub async fn destroy_session(&self, session_id: &str) -> Result<bool> {
        let owner = self
            .peek_session(session_id)
            .await?
            .map(|session| session.user_id);

        let deleted = self.cache.delete(&session_key(session_id)).await?;

        if let Some(user_id) = owner {
            if let Err(e) = self
                .cache
                .set_remove(&user_sessions_key(user_id), session_id)
                .await
            {
                tracing::warn!(
                    "⚠️  Failed to unindex session {} for user {}: {} - continuing",
                    log_safe_id(session_id),
                    user_id,
                    e
                );
            }
        }

        if deleted {
            tracing::info!("✅ Session {} destroyed", log_safe_id(session_id));
        }

        Ok(deleted)
    }

    /// Destroys one of `user_id`'s sessions. Returns `false` both when the
    /// session does not exist and when it belongs to someone else, so
    /// callers cannot probe foreign session ids.
    pub async fn destroy_owned_session(&self, user_id: Uuid, session_id: &str) -> Result<bool> {
        match self.peek_session(session_id).await? {
            Some(session) if session.user_id == user_id => self.destroy_session(session_id).await,
            Some(_) => {
                tracing::warn!(
                    "❌ User {} attempted to revoke session {} they do not own",
                    user_id,
                    log_safe_id(session_id)
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Destroys every session of a user and the index itself. Returns the
    /// number of sessions destroyed (logout-everywhere).
    pub async fn destroy_all_user_sessions(&self, user_id: Uuid) -> Result<u64> {
        let index_key = user_sessions_key(user_id);
        let ids = self.cache.set_members(&index_key).await?;

        let mut destroyed = 0u64;
        for id in &ids {
            if self.cache.delete(&session_key(id)).await? {
                destroyed += 1;
            }
        }

        self.cache.delete(&index_key).await?;

        tracing::info!("✅ Destroyed {} sessions for user {}", destroyed, user_id);
        Ok(destroyed)
    }

    /// Returns the ids of a user's indexed sessions.
    pub async fn get_user_sessions(&self, user_id: Uuid) -> Result<Vec<String>> {
        self.cache.set_members(&user_sessions_key(user_id)).await
    }

    /// Returns a user's live sessions, most recently accessed first.
    ///
    /// Index entries whose record has already expired are dropped from the
    /// index on the way through (self-healing against index/record skew).
    /// Reads here do not slide expiry - enumeration is not user activity.
    pub async fn get_user_sessions_with_details(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let index_key = user_sessions_key(user_id);
        let ids = self.cache.set_members(&index_key).await?;

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            match self.peek_session(&id).await? {
                Some(session) => sessions.push(session),
                None => {
                    if let Err(e) = self.cache.set_remove(&index_key, &id).await {
                        tracing::warn!(
                            "⚠️  Failed to prune stale index entry {}: {} - continuing",
                            log_safe_id(&id),
                            e
                        );
                    }
                }
            }
        }

        sessions.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        Ok(sessions)
    }

    /// Resets a session's TTL without a fetch/rewrite round trip. Returns
    /// `false` if the session no longer exists.
    pub async fn extend_session(&self, session_id: &str, ttl_seconds: Option<i64>) -> Result<bool> {
        self.cache
            .expire(
                &session_key(session_id),
                ttl_seconds.unwrap_or(self.ttl_seconds),
            )
            .await
    }

    /// Merges `patch` into a session's metadata, preserving the remaining
    /// TTL (a metadata write is not user activity). Returns `false` if the
    /// session is gone.
    pub async fn update_session_metadata(
        &self,
        session_id: &str,
        patch: HashMap<String, String>,
    ) -> Result<bool> {
        let key = session_key(session_id);
        let Some(mut session) = self.peek_session(session_id).await? else {
            return Ok(false);
        };

        session.metadata.extend(patch);

        let remaining = self.cache.ttl(&key).await?;
        let ttl = if remaining > 0 {
            remaining
        } else {
            self.ttl_seconds
        };
        self.cache.set_json(&key, &session, Some(ttl)).await?;

        Ok(true)
    }

    /// Reads a session record without sliding its expiry.
    async fn peek_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.cache.get_json(&session_key(session_id)).await
    }

    /// Adds a session to its user's index and aligns the index TTL with
    /// the freshest member.
    async fn index_session(&self, session: &Session) -> Result<()> {
        let index_key = user_sessions_key(session.user_id);
        self.cache
            .set_add(&index_key, &session.session_id)
            .await?;
        self.cache.expire(&index_key, self.ttl_seconds).await?;
        Ok(())
    }

    /// Evicts the least-recently-accessed surplus sessions of a user.
    ///
    /// Read-then-decide: concurrent creations for one user can race past
    /// the cap momentarily; the next creation converges. The cap is a UX
    /// limit, not a security boundary.
    async fn enforce_session_cap(&self, user_id: Uuid) -> Result<()> {
        let index_key = user_sessions_key(user_id);
        let ids = self.cache.set_members(&index_key).await?;
        if ids.len() <= self.max_sessions_per_user {
            return Ok(());
        }

        let mut live = Vec::with_capacity(ids.len());
        for id in ids {
            match self.peek_session(&id).await? {
                Some(session) => live.push(session),
                None => {
                    let _ = self.cache.set_remove(&index_key, &id).await;
                }
            }
        }

        if live.len() <= self.max_sessions_per_user {
            return Ok(());
        }

        live.sort_by(|a, b| a.last_accessed_at.cmp(&b.last_accessed_at));
        let surplus = live.len() - self.max_sessions_per_user;

        for session in live.iter().take(surplus) {
            tracing::info!(
                "🧹 Evicting session {} for user {} (cap {})",
                log_safe_id(&session.session_id),
                user_id,
                self.max_sessions_per_user
            );
            self.destroy_session(&session.session_id).await?;
        }

        Ok(())
    }
}

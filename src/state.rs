use std::sync::Arc;

use crate::cache::CacheClient;
use crate::config::Config;
use crate::crypto::token::TokenCrypto;
use crate::error::Result;
use crate::services::oauth_state::OAuthStateStore;
use crate::services::sessions::SessionStore;
use crate::services::tokens::TokenVerifier;

/// The application's state: the manually assembled dependency graph.
#[derive(Clone)]
pub struct AppState {
    /// The shared KV store client.
    pub cache: CacheClient,
    /// The session store.
    pub sessions: SessionStore,
    /// The OAuth CSRF state store.
    pub oauth_states: OAuthStateStore,
    /// The stateless bearer-token verifier.
    pub tokens: TokenVerifier,
    /// Authenticated encryption for OAuth credentials at rest.
    pub token_crypto: Arc<TokenCrypto>,
    /// The application's configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let cache = CacheClient::connect(config).await?;
        cache.ping().await?;
        tracing::info!("✅ Session store reachable at startup");

        let sessions = SessionStore::new(
            cache.clone(),
            config.session_ttl_seconds,
            config.max_sessions_per_user,
        );
        tracing::info!(
            "✅ SessionStore initialized (ttl {}s, cap {} per user)",
            config.session_ttl_seconds,
            config.max_sessions_per_user
        );

        let oauth_states = OAuthStateStore::new(cache.clone());

        let tokens = TokenVerifier::new(&config.jwt_secret);

        let token_crypto = Arc::new(TokenCrypto::from_config(
            config.token_encryption_secret.as_ref().map(|s| s.as_str()),
        )?);

        Ok(AppState {
            cache,
            sessions,
            oauth_states,
            tokens,
            token_crypto,
            config: config.clone(),
        })
    }
}

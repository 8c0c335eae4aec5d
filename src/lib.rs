//! Session and authentication infrastructure for the CreatorHub
//! influencer marketplace.
//!
//! The crate owns the security-sensitive plumbing the rest of the backend
//! leans on: a Redis-backed session store with multi-device tracking and
//! capacity eviction, a hybrid session-or-bearer authenticator, AES-GCM
//! encryption for OAuth credentials at rest, KV-backed OAuth CSRF state,
//! and a fixed-window rate limiter sharing the same store.

pub mod cache;
pub mod config;
pub mod error;
pub mod router;
pub mod state;

pub mod crypto {
    pub mod aes;
    pub mod token;
}

pub mod models {
    pub mod identity;
    pub mod session;
}

pub mod services {
    pub mod oauth_state;
    pub mod sessions;
    pub mod tokens;
}

pub mod handlers {
    pub mod health;
    pub mod sessions;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

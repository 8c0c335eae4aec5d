//! Session store, OAuth state, and cache behavior against a live Redis.
//!
//! These tests need a reachable Redis (REDIS_URL, default
//! redis://127.0.0.1:6379) and are ignored by default:
//!
//! ```sh
//! cargo test -- --ignored
//! ```

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use creatorhub_gateway::cache::CacheClient;
use creatorhub_gateway::error::AppError;
use creatorhub_gateway::services::oauth_state::OAuthStateStore;
use creatorhub_gateway::services::sessions::{NewSession, SessionStore};

static REDIS_CLIENT: Lazy<redis::Client> = Lazy::new(|| {
    let url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    redis::Client::open(url).unwrap()
});

async fn cache() -> CacheClient {
    let conn = redis::aio::ConnectionManager::new(REDIS_CLIENT.clone())
        .await
        .expect("Redis must be reachable for ignored integration tests");
    CacheClient::from_manager(conn)
}

async fn store(ttl_seconds: i64, cap: usize) -> SessionStore {
    SessionStore::new(cache().await, ttl_seconds, cap)
}

fn new_session(user_id: Uuid) -> NewSession {
    NewSession {
        user_id,
        email: "creator@example.com".to_string(),
        role: "creator".to_string(),
        tenant_id: None,
        user_agent: Some("lifecycle-test".to_string()),
        ip_address: Some("203.0.113.9".to_string()),
        metadata: HashMap::new(),
    }
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn created_session_is_immediately_retrievable() {
    let store = store(3600, 5).await;
    let user_id = Uuid::new_v4();

    let created = store.create_session(new_session(user_id)).await.unwrap();
    assert!(created.last_accessed_at >= created.created_at);

    let fetched = store
        .get_session(&created.session_id)
        .await
        .unwrap()
        .expect("session must exist right after creation");
    assert_eq!(fetched.user_id, user_id);
    assert_eq!(fetched.email, "creator@example.com");
    assert!(fetched.last_accessed_at >= fetched.created_at);
    // The lookup slid the access timestamp forward.
    assert!(fetched.last_accessed_at >= created.last_accessed_at);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn sixth_session_evicts_exactly_the_oldest() {
    let store = store(3600, 5).await;
    let user_id = Uuid::new_v4();

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(store.create_session(new_session(user_id)).await.unwrap().session_id);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let sixth = store.create_session(new_session(user_id)).await.unwrap();

    let live = store.get_user_sessions_with_details(user_id).await.unwrap();
    assert_eq!(live.len(), 5);

    let live_ids: Vec<&str> = live.iter().map(|s| s.session_id.as_str()).collect();
    assert!(!live_ids.contains(&ids[0].as_str()), "oldest must be evicted");
    for id in &ids[1..] {
        assert!(live_ids.contains(&id.as_str()));
    }
    assert!(live_ids.contains(&sixth.session_id.as_str()));
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn eviction_follows_last_access_not_creation_order() {
    let store = store(3600, 2).await;
    let user_id = Uuid::new_v4();

    let first = store.create_session(new_session(user_id)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = store.create_session(new_session(user_id)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Touch the first session so the second becomes least recently used.
    store.get_session(&first.session_id).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let third = store.create_session(new_session(user_id)).await.unwrap();

    let live = store.get_user_sessions_with_details(user_id).await.unwrap();
    let live_ids: Vec<&str> = live.iter().map(|s| s.session_id.as_str()).collect();

    assert_eq!(live.len(), 2);
    assert!(live_ids.contains(&first.session_id.as_str()));
    assert!(live_ids.contains(&third.session_id.as_str()));
    assert!(!live_ids.contains(&second.session_id.as_str()));
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn cap_two_scenario_keeps_exactly_two_live() {
    let store = store(3600, 2).await;
    let user_id = Uuid::new_v4();

    let first = store.create_session(new_session(user_id)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    store.create_session(new_session(user_id)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    store.create_session(new_session(user_id)).await.unwrap();

    let live = store.get_user_sessions_with_details(user_id).await.unwrap();
    assert_eq!(live.len(), 2);
    assert!(
        !live.iter().any(|s| s.session_id == first.session_id),
        "the first-created session must be the one evicted"
    );
    assert!(
        store.get_session(&first.session_id).await.unwrap().is_none()
    );
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn destroy_all_leaves_nothing_behind() {
    let store = store(3600, 5).await;
    let user_id = Uuid::new_v4();

    for _ in 0..3 {
        store.create_session(new_session(user_id)).await.unwrap();
    }

    let destroyed = store.destroy_all_user_sessions(user_id).await.unwrap();
    assert_eq!(destroyed, 3);

    assert!(store.get_user_sessions(user_id).await.unwrap().is_empty());
    assert!(
        store
            .get_user_sessions_with_details(user_id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn validate_fails_for_destroyed_and_unknown_sessions() {
    let store = store(3600, 5).await;
    let user_id = Uuid::new_v4();

    let session = store.create_session(new_session(user_id)).await.unwrap();
    assert!(store.destroy_session(&session.session_id).await.unwrap());

    let err = store.validate_session(&session.session_id).await.unwrap_err();
    assert!(matches!(err, AppError::Authentication(_)));

    let err = store.validate_session("never-existed").await.unwrap_err();
    assert!(matches!(err, AppError::Authentication(_)));

    // Destroying again is an idempotent no-op.
    assert!(!store.destroy_session(&session.session_id).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn details_are_most_recent_first_and_self_heal_the_index() {
    let cache = cache().await;
    let store = SessionStore::new(cache.clone(), 3600, 10);
    let user_id = Uuid::new_v4();

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(store.create_session(new_session(user_id)).await.unwrap().session_id);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Expire one record out from under the index.
    cache
        .delete(&format!("session:{}", ids[1]))
        .await
        .unwrap();

    let details = store.get_user_sessions_with_details(user_id).await.unwrap();
    assert_eq!(details.len(), 2);
    assert!(details[0].last_accessed_at >= details[1].last_accessed_at);

    // The dangling index entry was pruned on the way through.
    let indexed = store.get_user_sessions(user_id).await.unwrap();
    assert_eq!(indexed.len(), 2);
    assert!(!indexed.contains(&ids[1]));
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn get_session_slides_the_expiry() {
    let cache = cache().await;
    let store = SessionStore::new(cache.clone(), 3600, 5);
    let user_id = Uuid::new_v4();

    let session = store.create_session(new_session(user_id)).await.unwrap();
    let key = format!("session:{}", session.session_id);

    // Shrink the TTL, then confirm a lookup restores the full window.
    assert!(cache.expire(&key, 10).await.unwrap());
    assert!(cache.ttl(&key).await.unwrap() <= 10);

    store.get_session(&session.session_id).await.unwrap().unwrap();
    assert!(cache.ttl(&key).await.unwrap() > 3000);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn extend_session_resets_ttl_without_rewrite() {
    let cache = cache().await;
    let store = SessionStore::new(cache.clone(), 100, 5);
    let user_id = Uuid::new_v4();

    let session = store.create_session(new_session(user_id)).await.unwrap();
    let key = format!("session:{}", session.session_id);

    assert!(store.extend_session(&session.session_id, Some(5000)).await.unwrap());
    assert!(cache.ttl(&key).await.unwrap() > 4900);

    assert!(!store.extend_session("never-existed", None).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn metadata_merges_and_reports_missing_sessions() {
    let store = store(3600, 5).await;
    let user_id = Uuid::new_v4();
    let session = store.create_session(new_session(user_id)).await.unwrap();

    let patch_one: HashMap<String, String> = [
        ("device".to_string(), "ios".to_string()),
        ("push".to_string(), "enabled".to_string()),
    ]
    .into();
    assert!(store.update_session_metadata(&session.session_id, patch_one).await.unwrap());

    let patch_two: HashMap<String, String> =
        [("push".to_string(), "disabled".to_string())].into();
    assert!(store.update_session_metadata(&session.session_id, patch_two).await.unwrap());

    let fetched = store.get_session(&session.session_id).await.unwrap().unwrap();
    assert_eq!(fetched.metadata.get("device").map(String::as_str), Some("ios"));
    assert_eq!(fetched.metadata.get("push").map(String::as_str), Some("disabled"));

    store.destroy_session(&session.session_id).await.unwrap();
    let gone: HashMap<String, String> = [("k".to_string(), "v".to_string())].into();
    assert!(!store.update_session_metadata(&session.session_id, gone).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn foreign_sessions_cannot_be_revoked() {
    let store = store(3600, 5).await;
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();

    let session = store.create_session(new_session(owner)).await.unwrap();

    assert!(!store.destroy_owned_session(intruder, &session.session_id).await.unwrap());
    assert!(store.get_session(&session.session_id).await.unwrap().is_some());

    assert!(store.destroy_owned_session(owner, &session.session_id).await.unwrap());
    assert!(store.get_session(&session.session_id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn malformed_record_reads_as_a_miss() {
    let cache = cache().await;
    let store = SessionStore::new(cache.clone(), 3600, 5);

    let session_id = format!("corrupt-{}", Uuid::new_v4());
    cache
        .set(&format!("session:{}", session_id), "{definitely not json", Some(60))
        .await
        .unwrap();

    assert!(store.get_session(&session_id).await.unwrap().is_none());
    assert!(matches!(
        store.validate_session(&session_id).await.unwrap_err(),
        AppError::Authentication(_)
    ));
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn kv_client_primitives_round_trip() {
    let cache = cache().await;
    let ns = Uuid::new_v4();

    let key = format!("kv-test:{}:value", ns);
    cache.set(&key, "hello", Some(60)).await.unwrap();
    assert!(cache.exists(&key).await.unwrap());
    assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("hello"));
    let ttl = cache.ttl(&key).await.unwrap();
    assert!(ttl > 0 && ttl <= 60);
    assert!(cache.delete(&key).await.unwrap());
    assert!(!cache.delete(&key).await.unwrap());
    assert!(!cache.exists(&key).await.unwrap());

    let set_key = format!("kv-test:{}:set", ns);
    cache.set_add(&set_key, "a").await.unwrap();
    cache.set_add(&set_key, "b").await.unwrap();
    assert!(cache.set_contains(&set_key, "a").await.unwrap());
    assert!(!cache.set_contains(&set_key, "c").await.unwrap());
    cache.set_remove(&set_key, "a").await.unwrap();
    assert_eq!(cache.set_members(&set_key).await.unwrap(), vec!["b".to_string()]);

    let hash_key = format!("kv-test:{}:hash", ns);
    cache.hash_set(&hash_key, "field", "value").await.unwrap();
    assert_eq!(
        cache.hash_get(&hash_key, "field").await.unwrap().as_deref(),
        Some("value")
    );
    assert!(cache.hash_delete(&hash_key, "field").await.unwrap());
    assert_eq!(cache.hash_get(&hash_key, "field").await.unwrap(), None);

    let counter_key = format!("kv-test:{}:counter", ns);
    assert_eq!(cache.increment(&counter_key).await.unwrap(), 1);
    assert_eq!(cache.increment(&counter_key).await.unwrap(), 2);

    let deleted = cache
        .delete_pattern(&format!("kv-test:{}:*", ns))
        .await
        .unwrap();
    assert!(deleted >= 2);
    assert!(!cache.exists(&set_key).await.unwrap());
    assert!(!cache.exists(&counter_key).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn oauth_state_is_single_use() {
    let states = OAuthStateStore::new(cache().await);
    let user_id = Uuid::new_v4();

    let state = states.issue(user_id).await.unwrap();

    assert_eq!(states.consume(&state).await.unwrap(), Some(user_id));
    assert_eq!(states.consume(&state).await.unwrap(), None);
    assert_eq!(states.consume("forged-state").await.unwrap(), None);
}

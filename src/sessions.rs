use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Server-side mapping from opaque session tokens to user ids.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, user_id: &str) -> String;
    async fn resolve(&self, token: &str) -> Option<String>;
    async fn destroy(&self, token: &str);
    /// Drops expired sessions, returning how many were removed.
    async fn prune(&self) -> usize;
}

struct SessionEntry {
    user_id: String,
    expires_at: Instant,
}

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, user_id: &str) -> String {
        let token = Uuid::new_v4().to_string();
        let entry = SessionEntry {
            user_id: user_id.to_string(),
            expires_at: Instant::now() + self.ttl,
        };
        self.sessions.write().await.insert(token.clone(), entry);
        token
    }

    async fn resolve(&self, token: &str) -> Option<String> {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.user_id.clone())
    }

    async fn destroy(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }

    async fn prune(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.expires_at > now);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_resolve_destroy() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        let token = store.create("u1").await;

        assert_eq!(store.resolve(&token).await.as_deref(), Some("u1"));
        store.destroy(&token).await;
        assert_eq!(store.resolve(&token).await, None);

        // destroying twice is harmless
        store.destroy(&token).await;
    }

    #[tokio::test]
    async fn tokens_are_distinct_per_login() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        let a = store.create("u1").await;
        let b = store.create("u1").await;
        assert_ne!(a, b);

        store.destroy(&a).await;
        assert_eq!(store.resolve(&b).await.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn expired_sessions_do_not_resolve_and_get_pruned() {
        let store = InMemorySessionStore::new(Duration::ZERO);
        let token = store.create("u1").await;

        assert_eq!(store.resolve(&token).await, None);
        assert_eq!(store.prune().await, 1);
        assert_eq!(store.prune().await, 0);
    }

    #[tokio::test]
    async fn unknown_token_is_absent() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        assert_eq!(store.resolve("not-a-token").await, None);
    }
}

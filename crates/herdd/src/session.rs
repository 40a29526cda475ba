//! Per-user conversation state.
//!
//! The session table is owned by the dispatcher alone; the registry never
//! sees it. State is ephemeral and not persisted across restarts. Entries
//! idle past the configured TTL are evicted by a periodic sweep, which is
//! equivalent to resetting the conversation to Idle.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use herd_shared::model::UserId;
use tokio::sync::Mutex;

/// What the next photo or text from a user means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    AwaitingName,
    AwaitingPhoto { pending_name: String },
}

struct SessionEntry {
    state: ConversationState,
    last_seen: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionTable {
    inner: Arc<Mutex<HashMap<UserId, SessionEntry>>>,
    idle_ttl: Duration,
}

impl SessionTable {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            idle_ttl,
        }
    }

    /// Current state for the user; Idle if the user has no entry.
    /// Touches the entry's activity timestamp.
    pub async fn state(&self, user: &UserId) -> ConversationState {
        let mut table = self.inner.lock().await;
        match table.get_mut(user) {
            Some(entry) => {
                entry.last_seen = Utc::now();
                entry.state.clone()
            }
            None => ConversationState::Idle,
        }
    }

    pub async fn set(&self, user: &UserId, state: ConversationState) {
        let mut table = self.inner.lock().await;
        table.insert(
            user.clone(),
            SessionEntry {
                state,
                last_seen: Utc::now(),
            },
        );
    }

    /// Drop the entry; the user is back to Idle.
    pub async fn reset(&self, user: &UserId) {
        self.inner.lock().await.remove(user);
    }

    /// Remove entries idle longer than the TTL. Returns how many were evicted.
    pub async fn evict_idle(&self) -> usize {
        let cutoff = Utc::now() - self.idle_ttl;
        let mut table = self.inner.lock().await;
        let before = table.len();
        table.retain(|_, entry| entry.last_seen >= cutoff);
        before - table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        id.to_string()
    }

    #[tokio::test]
    async fn test_unknown_user_is_idle() {
        let table = SessionTable::new(Duration::hours(1));
        assert_eq!(table.state(&user("41")).await, ConversationState::Idle);
    }

    #[tokio::test]
    async fn test_set_then_read_back() {
        let table = SessionTable::new(Duration::hours(1));
        table.set(&user("41"), ConversationState::AwaitingName).await;
        assert_eq!(
            table.state(&user("41")).await,
            ConversationState::AwaitingName
        );
        table
            .set(
                &user("41"),
                ConversationState::AwaitingPhoto {
                    pending_name: "Bessie".to_string(),
                },
            )
            .await;
        assert_eq!(
            table.state(&user("41")).await,
            ConversationState::AwaitingPhoto {
                pending_name: "Bessie".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle() {
        let table = SessionTable::new(Duration::hours(1));
        table.set(&user("41"), ConversationState::AwaitingName).await;
        table.reset(&user("41")).await;
        assert_eq!(table.state(&user("41")).await, ConversationState::Idle);
    }

    #[tokio::test]
    async fn test_eviction_only_touches_idle_sessions() {
        // Millisecond TTL: everything set before the pause is idle.
        let table = SessionTable::new(Duration::milliseconds(1));
        table.set(&user("41"), ConversationState::AwaitingName).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let evicted = table.evict_idle().await;
        assert_eq!(evicted, 1);
        assert_eq!(table.state(&user("41")).await, ConversationState::Idle);

        let table = SessionTable::new(Duration::hours(1));
        table.set(&user("41"), ConversationState::AwaitingName).await;
        assert_eq!(table.evict_idle().await, 0);
        assert_eq!(
            table.state(&user("41")).await,
            ConversationState::AwaitingName
        );
    }
}

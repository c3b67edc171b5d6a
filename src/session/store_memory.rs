use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::{SessionId, TTL_SECONDS};

type Result<T> = std::result::Result<T, ()>;

/// In-process token to user-id map with per-entry expiry.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Entry>>,
}

struct Entry {
    user_id: i64,
    expires: Instant,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, token: SessionId) -> Result<Option<i64>> {
        let sessions = self.sessions.read().await;

        Ok(match sessions.get(&token) {
            Some(entry) if entry.expires > Instant::now() => Some(entry.user_id),
            _ => None,
        })
    }

    /// TTL-bound write; rebinding an existing token replaces its user.
    pub async fn bind(&self, token: SessionId, user_id: i64) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        // expired entries are swept on write
        sessions.retain(|_, entry| entry.expires > Instant::now());

        sessions.insert(
            token,
            Entry {
                user_id,
                expires: Instant::now() + Duration::from_secs(TTL_SECONDS),
            },
        );

        Ok(())
    }
}

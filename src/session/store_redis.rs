use log::error;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{SessionId, TTL_SECONDS};

type Result<T> = std::result::Result<T, ()>;

/// Token to user-id map held in redis; entries expire server-side.
pub struct SessionStore {
    conn: ConnectionManager,
}

impl SessionStore {
    pub async fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            error!("invalid redis url: {e:?}");
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            error!("couldn't connect to redis: {e:?}");
        })?;

        Ok(Self { conn })
    }

    pub async fn get(&self, token: SessionId) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();

        conn.get(key(token)).await.map_err(|e: redis::RedisError| {
            error!("couldn't read session {token}: {e:?}");
        })
    }

    pub async fn bind(&self, token: SessionId, user_id: i64) -> Result<()> {
        let mut conn = self.conn.clone();

        conn.set_ex(key(token), user_id, TTL_SECONDS)
            .await
            .map_err(|e: redis::RedisError| {
                error!("couldn't bind session {token}: {e:?}");
            })
    }
}

fn key(token: SessionId) -> String {
    format!("sess:{token}")
}

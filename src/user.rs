use crate::stamp::Timestamp;

#[derive(Debug, Clone)]
#[derive(sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Argon2id PHC string. Never plaintext, never exposed over the API.
    pub password_hash: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

use crate::stamp::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

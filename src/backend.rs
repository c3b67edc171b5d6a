use std::path::{Path, PathBuf};

use log::{error, info};
use sqlx::{migrate::MigrateDatabase, Pool, Sqlite, SqlitePool};

use crate::post::Post;
use crate::stamp::Timestamp;
use crate::user::User;

type Result<T> = std::result::Result<T, ()>;

#[derive(Debug)]
pub enum FindError {
    NotFound,
    Internal,
}

#[derive(Debug)]
pub enum CreateError {
    /// Unique-constraint conflict, e.g. a taken username.
    Duplicate,
    Internal,
}

pub struct Backend(pub Pool<Sqlite>);

fn into_sql(path: &Path) -> PathBuf {
    path.join("board.sql")
}

pub async fn init(data_dir: &Path) {
    let final_path = format!(
        "sqlite://{}",
        into_sql(data_dir).to_str().expect("non utf-8 data")
    );
    match Sqlite::create_database(&final_path).await {
        Ok(()) => {
            info!("Using {}", &final_path);
        }
        Err(e) => {
            let sqlx::Error::Database(db_err) = e else {
                panic!("error creating database: {e}");
            };

            panic!("sql db error: {db_err:?}");
        }
    }
}

impl Backend {
    pub async fn new(data_dir: &Path) -> Self {
        let db_pathbuf = into_sql(data_dir);
        let db_path = db_pathbuf.to_str().expect("non utf-8 data");
        let pool = match SqlitePool::connect(db_path).await {
            Ok(pool) => pool,
            Err(_err) => {
                init(data_dir).await;
                SqlitePool::connect(db_path).await.expect("db connection")
            }
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migration");

        Self(pool)
    }
}

impl Backend {
    pub async fn find_user(&self, username: &str) -> std::result::Result<User, FindError> {
        sqlx::query_as(
            "
            SELECT *
            FROM users
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_one(&self.0)
        .await
        .map_err(|e| {
            if matches!(e, sqlx::Error::RowNotFound) {
                FindError::NotFound
            } else {
                error!("couldn't query user {username}: {e:?}");
                FindError::Internal
            }
        })
    }

    pub async fn user_by_id(&self, id: i64) -> Result<Option<User>> {
        sqlx::query_as(
            "
            SELECT *
            FROM users
            WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_optional(&self.0)
        .await
        .map_err(|e| {
            error!("couldn't query user {id}: {e:?}");
        })
    }

    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        now: Timestamp,
    ) -> std::result::Result<User, CreateError> {
        sqlx::query_as(
            "
            INSERT INTO users
            (username, password_hash, created_at, updated_at)
            VALUES
            (?, ?, ?, ?)
            RETURNING *
            ",
        )
        .bind(username)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(&self.0)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CreateError::Duplicate
            } else {
                error!("couldn't insert user {username}: {e:?}");
                CreateError::Internal
            }
        })
    }
}

impl Backend {
    pub async fn posts(&self) -> Result<Vec<Post>> {
        sqlx::query_as(
            "
            SELECT *
            FROM posts
            ORDER BY id
            ",
        )
        .fetch_all(&self.0)
        .await
        .map_err(|e| {
            error!("error selecting posts: {e:?}");
        })
    }

    pub async fn post(&self, id: i64) -> Result<Option<Post>> {
        sqlx::query_as(
            "
            SELECT *
            FROM posts
            WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_optional(&self.0)
        .await
        .map_err(|e| {
            error!("error selecting post {id}: {e:?}");
        })
    }

    pub async fn create_post(&self, title: &str, now: Timestamp) -> Result<Post> {
        sqlx::query_as(
            "
            INSERT INTO posts
            (title, created_at, updated_at)
            VALUES
            (?, ?, ?)
            RETURNING *
            ",
        )
        .bind(title)
        .bind(now)
        .bind(now)
        .fetch_one(&self.0)
        .await
        .map_err(|e| {
            error!("error inserting post: {e:?}");
        })
    }

    pub async fn update_post(&self, id: i64, title: &str, now: Timestamp) -> Result<Option<Post>> {
        sqlx::query_as(
            "
            UPDATE posts
            SET
                title = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING *
            ",
        )
        .bind(title)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.0)
        .await
        .map_err(|e| {
            error!("error updating post {id}: {e:?}");
        })
    }

    pub async fn delete_post(&self, id: i64) -> Result<bool> {
        sqlx::query(
            "
            DELETE FROM posts
            WHERE id = ?
            ",
        )
        .bind(id)
        .execute(&self.0)
        .await
        .map(|done| done.rows_affected() > 0)
        .map_err(|e| {
            error!("error deleting post {id}: {e:?}");
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            // 2067 = SQLITE_CONSTRAINT_UNIQUE
            db_err.code().as_deref() == Some("2067")
                || db_err.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}

#[cfg(test)]
pub mod test {
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};

    pub async fn create_db() -> Pool<Sqlite> {
        // sqlite's :memory: is per-connection - keep exactly one alive
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(":memory:")
            .await
            .unwrap();

        sqlx::migrate!("./migrations").run(&db).await.unwrap();

        db
    }
}

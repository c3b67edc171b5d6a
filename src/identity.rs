use std::sync::Arc;

use log::{error, info};

use crate::backend::{Backend, CreateError, FindError};
use crate::session::{ClientSession, SessionStore};
use crate::stamp::Timestamp;
use crate::user::User;

/// A validation failure tagged with the input field it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// User-correctable, reported in-band against a named field.
    Field(FieldError),
    /// Anything else - already logged, opaque to the caller.
    Internal,
}

pub type Result<T> = std::result::Result<T, Rejection>;

fn field(field: &'static str, message: &'static str) -> Rejection {
    Rejection::Field(FieldError { field, message })
}

/// Owns user records, credential verification and session binding.
/// All state lives in the two collaborators; conflicting writes are
/// serialised by the unique constraint on `users.username`.
pub struct Identity {
    backend: Arc<Backend>,
    sessions: Arc<SessionStore>,
}

impl Identity {
    pub fn new(backend: Arc<Backend>, sessions: Arc<SessionStore>) -> Self {
        Self { backend, sessions }
    }

    pub async fn register(
        &self,
        session: &ClientSession,
        username: &str,
        password: &str,
    ) -> Result<User> {
        if username.len() <= 2 {
            return Err(field("username", "Length must be greater than 2."));
        }

        if password.len() <= 2 {
            return Err(field("password", "Length must be greater than 2."));
        }

        let hash = hash_password(password.to_string()).await?;
        let now = Timestamp::now().map_err(|()| Rejection::Internal)?;

        let user = self
            .backend
            .create_user(username, &hash, now)
            .await
            .map_err(|e| match e {
                CreateError::Duplicate => {
                    info!("register rejected, {username} already taken");
                    field("username", "Username has already been taken.")
                }
                CreateError::Internal => Rejection::Internal,
            })?;

        self.bind(session, user.id).await?;
        info!("{username} registered");

        Ok(user)
    }

    pub async fn login(
        &self,
        session: &ClientSession,
        username: &str,
        password: &str,
    ) -> Result<User> {
        // distinct user/password errors are deliberate, see DESIGN.md
        let user = self.backend.find_user(username).await.map_err(|e| match e {
            FindError::NotFound => {
                info!("login rejected, no such user {username}");
                field("username", "Username doesn't exist.")
            }
            FindError::Internal => Rejection::Internal,
        })?;

        if !verify_password(user.password_hash.clone(), password.to_string()).await? {
            info!("login rejected, wrong password for {username}");
            return Err(field("password", "Incorrect password."));
        }

        self.bind(session, user.id).await?;
        info!("{username} logged in");

        Ok(user)
    }

    /// Resolve the session's bound user. `None` for an anonymous, expired
    /// or stale (user row gone) session - never an error.
    pub async fn me(&self, session: &ClientSession) -> Result<Option<User>> {
        let Some(token) = session.token() else {
            return Ok(None);
        };

        let user_id = self
            .sessions
            .get(token)
            .await
            .map_err(|()| Rejection::Internal)?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        self.backend
            .user_by_id(user_id)
            .await
            .map_err(|()| Rejection::Internal)
    }

    async fn bind(&self, session: &ClientSession, user_id: i64) -> Result<()> {
        let token = session.token_for_bind();

        self.sessions.bind(token, user_id).await.map_err(|()| {
            error!("couldn't bind session {token} to user {user_id}");
            Rejection::Internal
        })
    }
}

/// Argon2id on the blocking pool - hashing is CPU-bound and must not
/// stall the async executor.
async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
        use argon2::Argon2;

        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!("couldn't hash password: {e:?}");
                Rejection::Internal
            })
    })
    .await
    .map_err(|e| {
        error!("hash task died: {e:?}");
        Rejection::Internal
    })?
}

async fn verify_password(hash: String, password: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        use argon2::password_hash::{Error, PasswordHash, PasswordVerifier};
        use argon2::Argon2;

        let parsed = PasswordHash::new(&hash).map_err(|e| {
            error!("stored hash isn't a valid phc string: {e:?}");
            Rejection::Internal
        })?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(Error::Password) => Ok(false),
            Err(e) => {
                error!("couldn't verify password: {e:?}");
                Err(Rejection::Internal)
            }
        }
    })
    .await
    .map_err(|e| {
        error!("verify task died: {e:?}");
        Rejection::Internal
    })?
}

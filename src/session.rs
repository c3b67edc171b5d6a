use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// Cookie carrying the session token.
pub const COOKIE: &str = "qid";

/// Sessions (and their cookie) live for a year.
pub const TTL_SECONDS: u64 = 60 * 60 * 24 * 365;

#[cfg(feature = "session-redis")]
mod store_redis;
#[cfg(feature = "session-redis")]
pub use store_redis::SessionStore;

#[cfg(not(feature = "session-redis"))]
mod store_memory;
#[cfg(not(feature = "session-redis"))]
pub use store_memory::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for SessionId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        Uuid::try_parse(s).map(Self).map_err(|_| ())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

/// What this request knows about the client's session: the token the
/// request arrived with, plus any token issued while handling it. The
/// http layer turns an issued token into a Set-Cookie on the way out.
#[derive(Clone)]
pub struct ClientSession(Arc<Inner>);

struct Inner {
    current: Option<SessionId>,
    issued: Mutex<Option<SessionId>>,
}

impl ClientSession {
    pub fn from_cookie(cookie: Option<&str>) -> Self {
        // an unparseable cookie is the same as no cookie
        let current = cookie.and_then(|s| s.parse().ok());

        Self(Arc::new(Inner {
            current,
            issued: Mutex::new(None),
        }))
    }

    /// The token the client presented, if any.
    pub fn token(&self) -> Option<SessionId> {
        self.0.current
    }

    /// The token to bind against: the one the client sent, else a fresh
    /// one which `fresh()` will then report for cookie emission.
    pub fn token_for_bind(&self) -> SessionId {
        match self.0.current {
            Some(id) => id,
            None => {
                let mut issued = self.0.issued.lock().unwrap();
                *issued.get_or_insert_with(SessionId::new)
            }
        }
    }

    /// A token created during this request, if any.
    pub fn fresh(&self) -> Option<SessionId> {
        *self.0.issued.lock().unwrap()
    }
}

//! Authenticated identity storage shared between auth and transport layers.

use serde::Deserialize;
use std::sync::{Arc, RwLock};

/// User record returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub username: String,
    pub role: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Access token plus user record. Both are set together or neither —
/// a half-logged-in state is never representable through `AuthStore`.
#[derive(Debug, Clone, Default)]
pub struct AuthIdentity {
    pub token: Option<String>,
    pub user: Option<User>,
}

impl AuthIdentity {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.role == "admin")
    }
}

/// Sole owner and mutator of the identity. The transport layer reads the
/// bearer token through a clone; no other component writes token or user.
pub struct AuthStore {
    inner: Arc<RwLock<AuthIdentity>>,
}

impl AuthStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(AuthIdentity::default())),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn snapshot(&self) -> AuthIdentity {
        self.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated()
    }

    pub fn is_admin(&self) -> bool {
        self.read().is_admin()
    }

    pub fn session_id(&self) -> Option<String> {
        self.read().user.as_ref().and_then(|u| u.session_id.clone())
    }

    /// Store token and user together.
    pub fn set(&self, token: String, user: User) {
        let mut identity = self.write();
        identity.token = Some(token);
        identity.user = Some(user);
    }

    /// Replace only the access token, keeping the user record (refresh path).
    pub fn set_token(&self, token: String) {
        self.write().token = Some(token);
    }

    /// Update the user record without touching the token (fetch-me path).
    pub fn set_user(&self, user: User) {
        self.write().user = Some(user);
    }

    pub fn clear(&self) {
        let mut identity = self.write();
        identity.token = None;
        identity.user = None;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, AuthIdentity> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Auth store lock poisoned during read, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, AuthIdentity> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Auth store lock poisoned during write, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for AuthStore {
    fn default() -> Self {
        Self::new()
    }
}

// Shared identity; clones observe the same token and user.
impl Clone for AuthStore {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

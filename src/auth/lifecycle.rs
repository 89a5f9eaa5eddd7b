//! Access token lifecycle: login, silent refresh, logout.
//!
//! Recovery always degrades to the fully-logged-out state. No path leaves a
//! token without a user or a user without a token.

use std::sync::Arc;

use crate::auth::identity::{AuthIdentity, User};
use crate::common::AppError;
use crate::transport::ApiClient;

pub struct TokenLifecycle {
    api: Arc<ApiClient>,
}

impl TokenLifecycle {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub fn identity(&self) -> AuthIdentity {
        self.api.auth().snapshot()
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.auth().is_authenticated()
    }

    pub fn is_admin(&self) -> bool {
        self.api.auth().is_admin()
    }

    /// Exchange credentials for an authenticated identity.
    /// Any failure clears local identity before the error propagates.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthIdentity, AppError> {
        match self.api.login(username, password).await {
            Ok(body) => {
                self.api.auth().set(body.access_token, body.user);
                tracing::info!(username, "Login succeeded");
                Ok(self.api.auth().snapshot())
            }
            Err(err) => {
                self.api.auth().clear();
                Err(err)
            }
        }
    }

    /// Refresh the stored user record. No-op when unauthenticated.
    ///
    /// An unauthorized response means the token expired naturally: identity
    /// is torn down locally, without upstream calls and without a notice.
    /// Other failures are logged and swallowed, leaving user state unchanged.
    pub async fn fetch_current_user(&self) -> Option<User> {
        if !self.api.auth().is_authenticated() {
            return None;
        }

        match self.api.fetch_me().await {
            Ok(user) => {
                self.api.auth().set_user(user.clone());
                Some(user)
            }
            Err(err) if err.is_unauthorized() => {
                tracing::debug!("Current-user fetch unauthorized, clearing identity");
                self.api.auth().clear();
                None
            }
            Err(err) => {
                tracing::warn!("Failed to fetch current user: {err}");
                None
            }
        }
    }

    /// Attempt a silent token refresh against the cookie-borne credential.
    pub async fn refresh(&self) -> bool {
        self.api.refresh().await
    }

    /// Best-effort upstream teardown, then unconditional local teardown.
    /// Never fails from the caller's perspective.
    pub async fn logout(&self) {
        if let Some(session_id) = self.api.auth().session_id() {
            if let Err(err) = self.api.clear_memory(&session_id).await {
                tracing::warn!("Failed to clear session resources during logout: {err}");
            }
        }

        if let Err(err) = self.api.logout().await {
            tracing::warn!("Upstream logout failed: {err}");
        }

        self.api.auth().clear();
        tracing::info!("Logged out");
    }
}

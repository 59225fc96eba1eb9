use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::AuthSettings;
use crate::identity::IdentityReconciler;
use crate::provider::IdentityProvider;
use crate::session::SessionManager;
use crate::store::{SessionStore, UserStore};

/// Shared state for auth route handlers.
pub(super) struct AuthState<P, U, S> {
    pub(super) provider: Arc<P>,
    pub(super) users: Arc<U>,
    pub(super) reconciler: IdentityReconciler<U>,
    pub(super) sessions: SessionManager<S>,
    pub(super) settings: AuthSettings,
}

impl<P, U: UserStore, S: SessionStore> AuthState<P, U, S> {
    pub(super) fn new(provider: P, users: U, sessions: S, settings: AuthSettings) -> Self {
        let users = Arc::new(users);
        Self {
            provider: Arc::new(provider),
            reconciler: IdentityReconciler::new(users.clone()),
            users,
            sessions: SessionManager::with_ttl(Arc::new(sessions), settings.session_ttl),
            settings,
        }
    }
}

// Manual Clone: avoid derive adding `P: Clone, U: Clone, S: Clone` bounds.
impl<P, U, S> Clone for AuthState<P, U, S> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            users: self.users.clone(),
            reconciler: self.reconciler.clone(),
            sessions: self.sessions.clone(),
            settings: self.settings.clone(),
        }
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<P: IdentityProvider, U: UserStore, S: SessionStore> FromRef<AuthState<P, U, S>> for Key {
    fn from_ref(state: &AuthState<P, U, S>) -> Self {
        state.settings.cookie_key.clone()
    }
}

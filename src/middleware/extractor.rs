use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::Key;

use super::config::{AuthConfig, AuthSettings};
use super::cookies;
use super::error::AuthError;
use crate::error::Error;
use crate::session::SessionManager;
use crate::store::SessionStore;
use crate::types::{Provider, SessionId, UserId};

/// Authenticated principal resolved from the session cookie.
///
/// Bound into the request extensions by [`require_auth`]; as an extractor it
/// works with any router state. Without the layer in front of the handler it
/// rejects with `401 Unauthorized`.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected(user: AuthUser) -> impl IntoResponse {
///     format!("Hello, user {}", user.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Session ID (from cookie).
    pub session_id: SessionId,
    pub user_id: UserId,
    /// Provider the session was created with.
    pub provider: Provider,
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}

/// State for the [`require_auth`] layer: the session store plus the cookie
/// settings of an [`AuthConfig`].
///
/// ```rust,ignore
/// let gate = AuthGate::new(&config, store.clone());
/// let app = auth_routes(config, providers, store.clone(), store).merge(
///     Router::new()
///         .route("/hello", get(|user: AuthUser| async move { user.user_id.to_string() }))
///         .route_layer(axum::middleware::from_fn_with_state(gate, require_auth::<MemoryStore>)),
/// );
/// ```
pub struct AuthGate<S> {
    sessions: SessionManager<S>,
    cookie_key: Key,
    cookie_name: String,
}

impl<S: SessionStore> AuthGate<S> {
    /// Gate over `session_store`, reading the cookie `config` describes.
    #[must_use]
    pub fn new(config: &AuthConfig, session_store: S) -> Self {
        let sessions = SessionManager::with_ttl(Arc::new(session_store), config.settings.session_ttl);
        Self::from_settings(sessions, &config.settings)
    }

    pub(super) fn from_settings(sessions: SessionManager<S>, settings: &AuthSettings) -> Self {
        Self {
            sessions,
            cookie_key: settings.cookie_key.clone(),
            cookie_name: settings.session_cookie_name.clone(),
        }
    }
}

impl<S> Clone for AuthGate<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            cookie_key: self.cookie_key.clone(),
            cookie_name: self.cookie_name.clone(),
        }
    }
}

impl<S> FromRef<AuthGate<S>> for Key {
    fn from_ref(gate: &AuthGate<S>) -> Self {
        gate.cookie_key.clone()
    }
}

/// Resolve the session cookie in `jar` to a live session.
///
/// Every failure is reported as [`AuthError::Unauthenticated`]: a missing or
/// tampered cookie, an unknown or expired session, and a failing store all
/// look the same to the client.
///
/// # Errors
///
/// [`AuthError::Unauthenticated`] unless the session is live.
pub async fn resolve_session<S: SessionStore>(
    sessions: &SessionManager<S>,
    jar: &PrivateCookieJar,
    cookie_name: &str,
) -> Result<AuthUser, AuthError> {
    let session_id =
        cookies::get_session_id(jar, cookie_name).ok_or(AuthError::Unauthenticated)?;

    match sessions.get_session_by_id(&session_id).await {
        Ok(session) => Ok(AuthUser {
            session_id: session.id,
            user_id: session.user_id,
            provider: session.provider,
        }),
        Err(Error::SessionNotFound | Error::SessionExpired) => Err(AuthError::Unauthenticated),
        Err(e) => {
            tracing::error!(error = %e, "Session lookup failed");
            Err(AuthError::Unauthenticated)
        }
    }
}

/// Route layer that rejects unauthenticated requests and binds the
/// [`AuthUser`] into the request extensions.
///
/// Mount with `axum::middleware::from_fn_with_state(gate, require_auth::<S>)`.
///
/// # Errors
///
/// [`AuthError::Unauthenticated`] unless the session cookie names a live session.
pub async fn require_auth<S: SessionStore>(
    State(gate): State<AuthGate<S>>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = resolve_session(&gate.sessions, &jar, &gate.cookie_name).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum_extra::extract::cookie::Cookie;

    use super::*;
    use crate::store::MemoryStore;

    const COOKIE: &str = "huddle_session";

    fn manager() -> SessionManager<MemoryStore> {
        SessionManager::new(Arc::new(MemoryStore::new()))
    }

    fn jar_with(value: &str) -> PrivateCookieJar {
        PrivateCookieJar::new(Key::generate()).add(Cookie::new(COOKIE, value.to_string()))
    }

    #[tokio::test]
    async fn no_carrier_is_rejected() {
        let jar = PrivateCookieJar::new(Key::generate());
        let err = resolve_session(&manager(), &jar, COOKIE).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn empty_session_id_is_rejected() {
        let err = resolve_session(&manager(), &jar_with(""), COOKIE)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn live_session_binds_user() {
        let sessions = manager();
        let session = sessions
            .create_session(UserId(7), Provider::GitHub, None, None)
            .await
            .unwrap();

        let user = resolve_session(&sessions, &jar_with(session.id.as_str()), COOKIE)
            .await
            .unwrap();

        assert_eq!(user.user_id, UserId(7));
        assert_eq!(user.session_id, session.id);
        assert_eq!(user.provider, Provider::GitHub);
    }

    #[tokio::test]
    async fn deleted_session_is_rejected() {
        let sessions = manager();
        let session = sessions
            .create_session(UserId(7), Provider::GitHub, None, None)
            .await
            .unwrap();
        sessions.delete_session_by_id(&session.id).await.unwrap();

        let err = resolve_session(&sessions, &jar_with(session.id.as_str()), COOKIE)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn extractor_reads_principal_bound_by_the_gate() {
        let (mut parts, ()) = axum::http::Request::new(()).into_parts();
        let err = AuthUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));

        parts.extensions.insert(AuthUser {
            session_id: SessionId("sid".into()),
            user_id: UserId(3),
            provider: Provider::Google,
        });
        let user = AuthUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.user_id, UserId(3));
    }
}

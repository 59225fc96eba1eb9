//! Server-side sessions: issue, resolve, revoke.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::error::Error;
use crate::random;
use crate::store::{SessionStore, StoreError};
use crate::types::{Provider, SessionId, UserId};

/// Lifetime of a session, and max-age of the cookie that carries it.
pub const SESSION_MAX_AGE: Duration = Duration::days(7);

const SESSION_ID_BYTES: usize = 32;

/// A server-side session row.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub provider: Provider,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl Session {
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Fields for [`SessionStore::create`].
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub provider: Provider,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: OffsetDateTime,
}

/// Generates a session identifier: 32 bytes from the OS random source,
/// base64url without padding (43 characters).
///
/// # Errors
///
/// [`Error::Random`] if the OS random source fails. Not retried.
pub fn generate_session_id() -> Result<SessionId, Error> {
    random::url_safe_token::<SESSION_ID_BYTES>().map(SessionId)
}

/// Issues and resolves sessions against a [`SessionStore`].
pub struct SessionManager<S> {
    store: Arc<S>,
    ttl: Duration,
}

// Manual Clone: avoid derive adding `S: Clone`.
impl<S> Clone for SessionManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ttl: self.ttl,
        }
    }
}

impl<S: SessionStore> SessionManager<S> {
    /// Manager issuing sessions that live for [`SESSION_MAX_AGE`].
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_ttl(store, SESSION_MAX_AGE)
    }

    /// Manager with a process-wide session lifetime other than the default.
    #[must_use]
    pub fn with_ttl(store: Arc<S>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create and persist a session for `user_id`.
    ///
    /// # Errors
    ///
    /// [`Error::Random`] if no identifier could be generated;
    /// [`Error::Store`] if persisting fails, including an id collision.
    pub async fn create_session(
        &self,
        user_id: UserId,
        provider: Provider,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<Session, Error> {
        let session = NewSession {
            id: generate_session_id()?,
            user_id,
            provider,
            ip_address,
            user_agent,
            expires_at: OffsetDateTime::now_utc() + self.ttl,
        };

        Ok(self.store.create(session).await?)
    }

    /// Resolve a session id to a live session.
    ///
    /// A session past its expiry is rejected and purged; a failed purge is
    /// only logged.
    ///
    /// # Errors
    ///
    /// [`Error::SessionNotFound`], [`Error::SessionExpired`], or
    /// [`Error::Store`] on any other storage failure.
    pub async fn get_session_by_id(&self, id: &SessionId) -> Result<Session, Error> {
        let session = self.store.find(id).await.map_err(|e| match e {
            StoreError::NotFound => Error::SessionNotFound,
            other => Error::Store(other),
        })?;

        if session.is_expired_at(OffsetDateTime::now_utc()) {
            if let Err(e) = self.store.delete(id).await {
                tracing::warn!(error = %e, user_id = %session.user_id, "Failed to purge expired session");
            }
            return Err(Error::SessionExpired);
        }

        Ok(session)
    }

    /// Delete one session. Missing ids are not an error.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] if the store fails.
    pub async fn delete_session_by_id(&self, id: &SessionId) -> Result<(), Error> {
        Ok(self.store.delete(id).await?)
    }

    /// Revoke every session of `user_id` ("log out everywhere").
    ///
    /// # Errors
    ///
    /// [`Error::Store`] if the store fails.
    pub async fn delete_all_sessions_for_user(&self, user_id: UserId) -> Result<u64, Error> {
        let removed = self.store.delete_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, removed, "Revoked all sessions");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager() -> (SessionManager<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SessionManager::new(store.clone()), store)
    }

    #[test]
    fn session_id_is_43_url_safe_chars() {
        let id = generate_session_id().unwrap();
        assert_eq!(id.as_str().len(), 43);
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn session_ids_are_unique() {
        let a = generate_session_id().unwrap();
        let b = generate_session_id().unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn create_session_expires_in_seven_days() {
        let (manager, _) = manager();
        let session = manager
            .create_session(
                UserId(7),
                Provider::Google,
                Some("1.2.3.4".into()),
                Some("curl".into()),
            )
            .await
            .unwrap();

        assert_eq!(session.user_id, UserId(7));
        assert_eq!(session.provider, Provider::Google);
        assert_eq!(session.ip_address.as_deref(), Some("1.2.3.4"));
        assert_eq!(session.user_agent.as_deref(), Some("curl"));
        assert_eq!(session.id.as_str().len(), 43);

        let drift = session.expires_at - OffsetDateTime::now_utc() - Duration::days(7);
        assert!(drift.abs() < Duration::seconds(5), "drift was {drift}");
    }

    #[tokio::test]
    async fn created_session_resolves_to_its_user() {
        let (manager, _) = manager();
        let created = manager
            .create_session(UserId(3), Provider::GitHub, None, None)
            .await
            .unwrap();

        let found = manager.get_session_by_id(&created.id).await.unwrap();
        assert_eq!(found.user_id, UserId(3));
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (manager, _) = manager();
        let err = manager
            .get_session_by_id(&SessionId("nope".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound));
    }

    #[tokio::test]
    async fn expired_session_is_rejected_and_purged() {
        let (manager, store) = manager();
        let id = generate_session_id().unwrap();
        let stale = NewSession {
            id: id.clone(),
            user_id: UserId(1),
            provider: Provider::GitHub,
            ip_address: None,
            user_agent: None,
            expires_at: OffsetDateTime::now_utc() - Duration::minutes(1),
        };
        SessionStore::create(store.as_ref(), stale).await.unwrap();

        let err = manager.get_session_by_id(&id).await.unwrap_err();
        assert!(matches!(err, Error::SessionExpired));
        assert!(matches!(store.find(&id).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (manager, _) = manager();
        let created = manager
            .create_session(UserId(1), Provider::GitHub, None, None)
            .await
            .unwrap();

        manager.delete_session_by_id(&created.id).await.unwrap();
        manager.delete_session_by_id(&created.id).await.unwrap();
        manager
            .delete_session_by_id(&SessionId("never-existed".into()))
            .await
            .unwrap();

        assert!(matches!(
            manager.get_session_by_id(&created.id).await,
            Err(Error::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn delete_all_sessions_for_user() {
        let (manager, _) = manager();
        let a = manager
            .create_session(UserId(1), Provider::GitHub, None, None)
            .await
            .unwrap();
        manager
            .create_session(UserId(1), Provider::Google, None, None)
            .await
            .unwrap();
        let other = manager
            .create_session(UserId(2), Provider::GitHub, None, None)
            .await
            .unwrap();

        assert_eq!(manager.delete_all_sessions_for_user(UserId(1)).await.unwrap(), 2);
        assert!(manager.get_session_by_id(&a.id).await.is_err());
        assert!(manager.get_session_by_id(&other.id).await.is_ok());
    }
}

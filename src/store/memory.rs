use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{SessionStore, StoreError, UserStore};
use crate::identity::{NewUser, TokenUpdate, User};
use crate::session::{NewSession, Session};
use crate::types::{Provider, SessionId, UserId};

/// In-process [`UserStore`] + [`SessionStore`].
///
/// Cloning is cheap and every clone shares the same tables, so one instance can
/// be handed to the router as both stores. Nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    by_provider: HashMap<(Provider, String), UserId>,
    last_user_id: i64,
    sessions: HashMap<SessionId, Session>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every session whose expiry has passed. Returns how many were removed.
    ///
    /// [`SessionStore::create`] runs this on each insert, so the table stays
    /// bounded by the sessions that are still live.
    pub async fn purge_expired_sessions(&self) -> usize {
        self.inner.write().await.purge_expired(OffsetDateTime::now_utc())
    }

    /// Number of stored session rows, live or not.
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }
}

impl Tables {
    fn purge_expired(&mut self, now: OffsetDateTime) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired_at(now));
        before - self.sessions.len()
    }
}

impl UserStore for MemoryStore {
    async fn find_by_provider(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<User, StoreError> {
        let tables = self.inner.read().await;
        tables
            .by_provider
            .get(&(provider, provider_user_id.to_owned()))
            .and_then(|id| tables.users.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.inner
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.inner.write().await;

        let identity_key = match (user.provider, &user.provider_user_id) {
            (Some(provider), Some(provider_user_id)) => {
                let key = (provider, provider_user_id.clone());
                if tables.by_provider.contains_key(&key) {
                    return Err(StoreError::Conflict(format!(
                        "user for {provider}:{provider_user_id} already exists"
                    )));
                }
                Some(key)
            }
            _ => None,
        };

        tables.last_user_id += 1;
        let id = UserId(tables.last_user_id);
        let now = OffsetDateTime::now_utc();
        let row = User {
            id,
            username: user.username,
            email: user.email,
            avatar_url: user.avatar_url,
            name: user.name,
            first_name: user.first_name,
            last_name: user.last_name,
            nickname: user.nickname,
            description: user.description,
            location: user.location,
            provider: user.provider,
            provider_user_id: user.provider_user_id,
            access_token: user.access_token,
            refresh_token: user.refresh_token,
            token_expires_at: user.token_expires_at,
            created_at: now,
            updated_at: now,
        };

        if let Some(key) = identity_key {
            tables.by_provider.insert(key, id);
        }
        tables.users.insert(id, row.clone());
        Ok(row)
    }

    async fn update_tokens(&self, id: UserId, tokens: TokenUpdate) -> Result<User, StoreError> {
        let mut tables = self.inner.write().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;

        user.access_token = Some(tokens.access_token);
        if let Some(refresh_token) = tokens.refresh_token {
            user.refresh_token = Some(refresh_token);
        }
        user.token_expires_at = tokens.expires_at;
        user.updated_at = OffsetDateTime::now_utc();

        Ok(user.clone())
    }
}

impl SessionStore for MemoryStore {
    async fn create(&self, session: NewSession) -> Result<Session, StoreError> {
        let mut tables = self.inner.write().await;
        let purged = tables.purge_expired(OffsetDateTime::now_utc());
        if purged > 0 {
            tracing::debug!(purged, "Dropped expired sessions");
        }
        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict("duplicate session id".into()));
        }

        let row = Session {
            id: session.id,
            user_id: session.user_id,
            provider: session.provider,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            expires_at: session.expires_at,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.sessions.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn find(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.inner
            .read()
            .await
            .sessions
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        self.inner.write().await.sessions.remove(id);
        Ok(())
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        let mut tables = self.inner.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - tables.sessions.len()) as u64)
    }
}

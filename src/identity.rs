//! Durable user identities and the find-or-create step of a login.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::Error;
use crate::provider::ProviderIdentity;
use crate::store::{StoreError, UserStore};
use crate::types::{Provider, UserId};

/// A durable user row.
#[derive(Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub provider: Option<Provider>,
    pub provider_user_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("provider", &self.provider)
            .field("provider_user_id", &self.provider_user_id)
            .finish_non_exhaustive()
    }
}

/// Fields for [`UserStore::create`]. The store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub provider: Option<Provider>,
    pub provider_user_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<OffsetDateTime>,
}

/// Token fields written on a repeat login.
///
/// `refresh_token: None` leaves the stored refresh token in place: providers
/// commonly issue one only on first consent. `expires_at` always replaces
/// the stored value since it describes the new access token.
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
}

/// The user fields safe to hand to a browser.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub provider: Option<Provider>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            avatar_url: user.avatar_url.clone(),
            provider: user.provider,
        }
    }
}

/// Maps a freshly authenticated provider identity onto a local user.
pub struct IdentityReconciler<U> {
    users: Arc<U>,
}

impl<U> Clone for IdentityReconciler<U> {
    fn clone(&self) -> Self {
        Self {
            users: self.users.clone(),
        }
    }
}

impl<U: UserStore> IdentityReconciler<U> {
    #[must_use]
    pub fn new(users: Arc<U>) -> Self {
        Self { users }
    }

    /// Find or create the user behind `identity`.
    ///
    /// A known identity only gets its tokens refreshed; profile fields stay as
    /// first recorded. An unknown identity becomes a new user named after the
    /// provider nickname, else the email, else the empty string.
    ///
    /// Performs exactly one write and never retries.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] for any storage failure other than a lookup miss,
    /// including a [`StoreError::Conflict`] when a concurrent login created the
    /// same identity first.
    pub async fn reconcile(&self, identity: &ProviderIdentity) -> Result<User, Error> {
        match self
            .users
            .find_by_provider(identity.provider, &identity.provider_user_id)
            .await
        {
            Ok(existing) => {
                tracing::debug!(user_id = %existing.id, provider = %identity.provider, "Refreshing OAuth tokens");
                let tokens = TokenUpdate {
                    access_token: identity.access_token.clone(),
                    refresh_token: identity.refresh_token.clone(),
                    expires_at: identity.expires_at,
                };
                Ok(self.users.update_tokens(existing.id, tokens).await?)
            }
            Err(StoreError::NotFound) => {
                let user = self.users.create(new_user_from(identity)).await?;
                tracing::info!(user_id = %user.id, provider = %identity.provider, "Created user");
                Ok(user)
            }
            Err(e) => {
                tracing::error!(error = %e, provider = %identity.provider, "User lookup failed");
                Err(e.into())
            }
        }
    }
}

fn new_user_from(identity: &ProviderIdentity) -> NewUser {
    let username = identity
        .nickname
        .clone()
        .or_else(|| identity.email.clone())
        .unwrap_or_default();

    NewUser {
        username,
        email: identity.email.clone(),
        avatar_url: identity.avatar_url.clone(),
        name: identity.name.clone(),
        first_name: identity.first_name.clone(),
        last_name: identity.last_name.clone(),
        nickname: identity.nickname.clone(),
        description: identity.description.clone(),
        location: identity.location.clone(),
        provider: Some(identity.provider),
        provider_user_id: Some(identity.provider_user_id.clone()),
        access_token: Some(identity.access_token.clone()),
        refresh_token: identity.refresh_token.clone(),
        token_expires_at: identity.expires_at,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::store::MemoryStore;

    fn reconciler() -> (IdentityReconciler<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (IdentityReconciler::new(store.clone()), store)
    }

    fn github_identity(access_token: &str) -> ProviderIdentity {
        ProviderIdentity::new(Provider::GitHub, "42", access_token)
            .with_email("a@example.com")
            .with_nickname("")
    }

    #[tokio::test]
    async fn first_login_creates_user_named_after_email() {
        let (reconciler, _) = reconciler();
        let user = reconciler.reconcile(&github_identity("tok1")).await.unwrap();

        assert_eq!(user.username, "a@example.com");
        assert_eq!(user.provider, Some(Provider::GitHub));
        assert_eq!(user.provider_user_id.as_deref(), Some("42"));
        assert_eq!(user.access_token.as_deref(), Some("tok1"));
        assert_eq!(user.nickname, None);
    }

    #[tokio::test]
    async fn second_login_refreshes_tokens_only() {
        let (reconciler, _) = reconciler();
        let first = reconciler.reconcile(&github_identity("tok1")).await.unwrap();

        let relogin = ProviderIdentity::new(Provider::GitHub, "42", "tok2")
            .with_email("changed@example.com")
            .with_nickname("new-name");
        let second = reconciler.reconcile(&relogin).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.access_token.as_deref(), Some("tok2"));
        assert_eq!(second.username, "a@example.com");
        assert_eq!(second.email.as_deref(), Some("a@example.com"));
    }

    #[tokio::test]
    async fn nickname_preferred_over_email() {
        let (reconciler, _) = reconciler();
        let identity = ProviderIdentity::new(Provider::GitHub, "7", "tok")
            .with_email("octo@example.com")
            .with_nickname("octocat");
        let user = reconciler.reconcile(&identity).await.unwrap();
        assert_eq!(user.username, "octocat");
    }

    #[tokio::test]
    async fn missing_email_and_nickname_yields_empty_username() {
        let (reconciler, _) = reconciler();
        let identity = ProviderIdentity::new(Provider::Google, "sub-9", "tok");
        let user = reconciler.reconcile(&identity).await.unwrap();
        assert_eq!(user.username, "");
        assert_eq!(user.email, None);
    }

    #[tokio::test]
    async fn same_id_under_other_provider_is_a_different_user() {
        let (reconciler, _) = reconciler();
        let github = reconciler
            .reconcile(&ProviderIdentity::new(Provider::GitHub, "1", "a"))
            .await
            .unwrap();
        let google = reconciler
            .reconcile(&ProviderIdentity::new(Provider::Google, "1", "b"))
            .await
            .unwrap();
        assert_ne!(github.id, google.id);
    }

    /// Lookup always fails with a backend error; counts write attempts.
    #[derive(Default)]
    struct BrokenStore {
        writes: AtomicUsize,
    }

    impl UserStore for BrokenStore {
        async fn find_by_provider(&self, _: Provider, _: &str) -> Result<User, StoreError> {
            Err(StoreError::Backend("connection reset".into()))
        }

        async fn find_by_id(&self, _: UserId) -> Result<User, StoreError> {
            Err(StoreError::NotFound)
        }

        async fn create(&self, _: NewUser) -> Result<User, StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend("unexpected write".into()))
        }

        async fn update_tokens(&self, _: UserId, _: TokenUpdate) -> Result<User, StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend("unexpected write".into()))
        }
    }

    #[tokio::test]
    async fn lookup_failure_is_fatal_and_writes_nothing() {
        let store = Arc::new(BrokenStore::default());
        let reconciler = IdentityReconciler::new(store.clone());

        let err = reconciler.reconcile(&github_identity("tok")).await.unwrap_err();

        assert!(matches!(err, Error::Store(StoreError::Backend(_))));
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    /// Yields after every lookup, so two logins can both miss before either inserts.
    struct YieldingStore(MemoryStore);

    impl UserStore for YieldingStore {
        async fn find_by_provider(&self, provider: Provider, id: &str) -> Result<User, StoreError> {
            let found = self.0.find_by_provider(provider, id).await;
            tokio::task::yield_now().await;
            found
        }

        async fn find_by_id(&self, id: UserId) -> Result<User, StoreError> {
            self.0.find_by_id(id).await
        }

        async fn create(&self, user: NewUser) -> Result<User, StoreError> {
            UserStore::create(&self.0, user).await
        }

        async fn update_tokens(&self, id: UserId, tokens: TokenUpdate) -> Result<User, StoreError> {
            self.0.update_tokens(id, tokens).await
        }
    }

    #[tokio::test]
    async fn racing_first_logins_create_one_row() {
        let memory = MemoryStore::new();
        let reconciler = IdentityReconciler::new(Arc::new(YieldingStore(memory.clone())));
        let identity = github_identity("tok");

        let (a, b) = tokio::join!(reconciler.reconcile(&identity), reconciler.reconcile(&identity));

        let (winner, loser) = match (a, b) {
            (Ok(user), Err(e)) | (Err(e), Ok(user)) => (user, e),
            (a, b) => panic!("expected one winner and one conflict, got {a:?} / {b:?}"),
        };
        assert!(matches!(loser, Error::Store(StoreError::Conflict(_))));

        let stored = memory.find_by_provider(Provider::GitHub, "42").await.unwrap();
        assert_eq!(stored.id, winner.id);
        assert!(matches!(
            memory.find_by_id(UserId(winner.id.0 + 1)).await,
            Err(StoreError::NotFound)
        ));
    }
}

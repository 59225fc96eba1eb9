//! Storage contracts for users and sessions.
//!
//! The crate never talks to a database directly. Applications implement
//! [`UserStore`] and [`SessionStore`] over their own persistence layer;
//! [`MemoryStore`] is a complete in-process implementation for development
//! and tests.
//!
//! Implementations must report a missing row as [`StoreError::NotFound`].
//! The reconciler and session manager branch on that variant and pass every
//! other error through unchanged.

mod memory;

use std::future::Future;

pub use memory::MemoryStore;

use crate::identity::{NewUser, TokenUpdate, User};
use crate::session::{NewSession, Session};
use crate::types::{Provider, SessionId, UserId};

/// Storage failure, split so callers can tell "no such row" apart from
/// everything else.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    /// Unique constraint violation: duplicate session id, or a second user for
    /// the same (provider, provider user id).
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// Persistence for durable user identities.
///
/// (provider, provider_user_id) must be unique. Enforce it in the schema:
/// two concurrent first logins for the same identity both miss the lookup and
/// both attempt [`create`](UserStore::create).
///
/// # Example
///
/// ```rust,ignore
/// impl UserStore for PgStore {
///     async fn find_by_provider(&self, provider: Provider, provider_user_id: &str)
///         -> Result<User, StoreError>
///     {
///         sqlx::query_as("SELECT * FROM users WHERE provider = $1 AND provider_user_id = $2")
///             .bind(provider.as_str())
///             .bind(provider_user_id)
///             .fetch_optional(&self.pool)
///             .await
///             .map_err(|e| StoreError::Backend(e.into()))?
///             .ok_or(StoreError::NotFound)
///     }
///     // ...
/// }
/// ```
pub trait UserStore: Send + Sync + 'static {
    /// Look up a user by provider identity.
    fn find_by_provider(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> impl Future<Output = Result<User, StoreError>> + Send;

    fn find_by_id(&self, id: UserId) -> impl Future<Output = Result<User, StoreError>> + Send;

    /// Insert a user; the store assigns the id.
    fn create(&self, user: NewUser) -> impl Future<Output = Result<User, StoreError>> + Send;

    /// Overwrite the OAuth token fields only. Returns the updated row.
    fn update_tokens(
        &self,
        id: UserId,
        tokens: TokenUpdate,
    ) -> impl Future<Output = Result<User, StoreError>> + Send;
}

/// Persistence for server-side sessions.
pub trait SessionStore: Send + Sync + 'static {
    /// Insert a session. A duplicate id is a [`StoreError::Conflict`].
    fn create(&self, session: NewSession) -> impl Future<Output = Result<Session, StoreError>> + Send;

    /// Look up a session by id. Expiry is checked by the caller.
    fn find(&self, id: &SessionId) -> impl Future<Output = Result<Session, StoreError>> + Send;

    /// Delete a session. Deleting a missing id succeeds.
    fn delete(&self, id: &SessionId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete every session of a user. Returns how many were removed.
    fn delete_for_user(&self, user_id: UserId) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

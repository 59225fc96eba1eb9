#![doc = include_str!("../README.md")]

pub mod error;
pub mod identity;
#[cfg(feature = "middleware")]
pub mod middleware;
#[cfg(feature = "oauth")]
pub mod oauth;
pub mod provider;
mod random;
pub mod session;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use error::Error;
pub use identity::{IdentityReconciler, NewUser, PublicUser, TokenUpdate, User};
#[cfg(feature = "oauth")]
pub use oauth::{OAuthClient, ProviderConfig, TokenResponse};
pub use provider::{AuthorizationRequest, IdentityProvider, ProviderIdentity};
pub use session::{
    NewSession, SESSION_MAX_AGE, Session, SessionManager, generate_session_id,
};
pub use store::{MemoryStore, SessionStore, StoreError, UserStore};
pub use types::{Provider, SessionId, UserId};

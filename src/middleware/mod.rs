//! Axum login routes and session authentication.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use huddle_auth::middleware::{AuthConfig, AuthGate, AuthUser, auth_routes, require_auth};
//! use huddle_auth::{MemoryStore, OAuthClient};
//!
//! // 1. Implement UserStore and SessionStore for your database (or use MemoryStore)
//! let store = MemoryStore::new();
//!
//! // 2. Configure from environment
//! let config = AuthConfig::from_env()?;
//! let providers = OAuthClient::from_env()?;
//!
//! // 3. Gate for your own routes, sharing the session store
//! let gate = AuthGate::new(&config, store.clone());
//!
//! // 4. Mount the login routes, then yours behind `require_auth`
//! let app = auth_routes(config, providers, store.clone(), store).merge(
//!     Router::new()
//!         .route("/hello", get(|user: AuthUser| async move { user.user_id.to_string() }))
//!         .route_layer(axum::middleware::from_fn_with_state(gate, require_auth::<MemoryStore>)),
//! );
//! ```

mod config;
mod cookies;
mod error;
mod extractor;
mod routes;
mod state;

pub use config::{AuthConfig, MIN_SECRET_LEN, SESSION_COOKIE_NAME, cookie_key_from_secret};
pub use error::AuthError;
pub use extractor::{AuthGate, AuthUser, require_auth, resolve_session};
pub use routes::auth_routes;

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;

use axum_extra::extract::cookie::Key;
use time::Duration;

use super::error::AuthError;
use crate::session::SESSION_MAX_AGE;

/// Name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "huddle_session";

/// Shortest accepted `SESSION_SECRET`, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Shared auth settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) cookie_key: Key,
    pub(crate) session_cookie_name: String,
    pub(crate) session_ttl: Duration,
    pub(crate) secure_cookies: bool,
    pub(crate) auth_path: String,
    pub(crate) frontend_url: Option<String>,
    pub(crate) trust_forwarded_headers: bool,
}

/// Session and cookie configuration for [`auth_routes`](super::auth_routes).
///
/// The cookie key is a constructor parameter. Use [`from_env()`](AuthConfig::from_env)
/// for the deployment convention, or [`new()`](AuthConfig::new) with `with_*`
/// methods for full control.
pub struct AuthConfig {
    pub(super) settings: AuthSettings,
}

impl AuthConfig {
    /// Config using `cookie_key` to encrypt and authenticate cookies.
    ///
    /// Defaults: secure cookies on, 7-day sessions, auth routes under `/auth`,
    /// JSON response from the login callback.
    #[must_use]
    pub fn new(cookie_key: Key) -> Self {
        Self {
            settings: AuthSettings {
                cookie_key,
                session_cookie_name: SESSION_COOKIE_NAME.into(),
                session_ttl: SESSION_MAX_AGE,
                secure_cookies: true,
                auth_path: "/auth".into(),
                frontend_url: None,
                trust_forwarded_headers: false,
            },
        }
    }

    /// Create config from environment variables.
    ///
    /// # Env vars
    /// - `SESSION_SECRET`: cookie key material, at least [`MIN_SECRET_LEN`] bytes.
    ///   Required when `APP_ENV=production`.
    /// - `APP_ENV`: `production` turns on `Secure` cookies and makes the secret mandatory.
    /// - `FRONTEND_URL`: where to send the browser after login. Without it the
    ///   callback answers with JSON.
    /// - `TRUST_PROXY_HEADERS`: `true` records the session IP from
    ///   `X-Forwarded-For` / `X-Real-IP`. Only set it behind a proxy that
    ///   overwrites those headers.
    ///
    /// Outside production a missing secret falls back to a random per-process
    /// key, and every restart logs all users out.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the secret is missing in production or too short.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let production = var("APP_ENV").is_some_and(|env| env.eq_ignore_ascii_case("production"));

        let cookie_key = match var("SESSION_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => cookie_key_from_secret(&secret)?,
            None if production => {
                return Err(AuthError::Config(
                    "SESSION_SECRET must be set in production".into(),
                ));
            }
            None => {
                tracing::warn!(
                    "SESSION_SECRET is not set: using an ephemeral cookie key. \
                     Sessions will not survive a restart. Never deploy like this."
                );
                Key::generate()
            }
        };

        let mut config = Self::new(cookie_key).with_secure_cookies(production);
        if let Some(url) = var("FRONTEND_URL").filter(|u| !u.is_empty()) {
            config = config.with_frontend_url(url);
        }
        if var("TRUST_PROXY_HEADERS").is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
            config = config.with_trusted_proxy_headers(true);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    /// Session lifetime, also used as the cookie max-age.
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.settings.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    /// Redirect to `{url}/` after a successful login instead of answering with JSON.
    #[must_use]
    pub fn with_frontend_url(mut self, url: impl Into<String>) -> Self {
        self.settings.frontend_url = Some(url.into());
        self
    }

    /// Take the client IP of new sessions from `X-Forwarded-For` / `X-Real-IP`
    /// instead of the socket peer address. Off by default: without a proxy that
    /// rewrites them, clients can put anything there.
    #[must_use]
    pub fn with_trusted_proxy_headers(mut self, trust: bool) -> Self {
        self.settings.trust_forwarded_headers = trust;
        self
    }

    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.settings.secure_cookies
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.settings.session_ttl
    }

    #[must_use]
    pub fn frontend_url(&self) -> Option<&str> {
        self.settings.frontend_url.as_deref()
    }
}

/// Derive the cookie encryption key from a configured secret.
///
/// # Errors
///
/// [`AuthError::Config`] if `secret` is shorter than [`MIN_SECRET_LEN`] bytes.
pub fn cookie_key_from_secret(secret: &str) -> Result<Key, AuthError> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(AuthError::Config(format!(
            "SESSION_SECRET must be at least {MIN_SECRET_LEN} bytes"
        )));
    }
    Ok(Key::derive_from(secret.as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<AuthConfig, AuthError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AuthConfig::from_vars(|k| vars.get(k).cloned())
    }

    #[test]
    fn production_requires_secret() {
        let err = load(&[("APP_ENV", "production")]).err().unwrap();
        assert!(matches!(err, AuthError::Config(msg) if msg.contains("SESSION_SECRET")));
    }

    #[test]
    fn proxy_headers_are_opt_in() {
        assert!(!load(&[]).unwrap().settings.trust_forwarded_headers);
        let config = load(&[("TRUST_PROXY_HEADERS", "true")]).unwrap();
        assert!(config.settings.trust_forwarded_headers);
    }

    #[test]
    fn production_uses_secure_cookies() {
        let config = load(&[("APP_ENV", "production"), ("SESSION_SECRET", SECRET)]).unwrap();
        assert!(config.secure_cookies());
    }

    #[test]
    fn development_falls_back_to_ephemeral_key() {
        let config = load(&[]).unwrap();
        assert!(!config.secure_cookies());
        assert_eq!(config.session_ttl(), SESSION_MAX_AGE);
        assert_eq!(config.frontend_url(), None);
    }

    #[test]
    fn short_secret_rejected_everywhere() {
        assert!(load(&[("SESSION_SECRET", "short")]).is_err());
        assert!(load(&[("APP_ENV", "production"), ("SESSION_SECRET", "short")]).is_err());
    }

    #[test]
    fn same_secret_derives_same_key() {
        let a = cookie_key_from_secret(SECRET).unwrap();
        let b = cookie_key_from_secret(SECRET).unwrap();
        assert_eq!(a.master(), b.master());
    }

    #[test]
    fn frontend_url_from_env() {
        let config = load(&[("FRONTEND_URL", "http://localhost:5173")]).unwrap();
        assert_eq!(config.frontend_url(), Some("http://localhost:5173"));
    }
}

mod flow;
mod profile;

use std::collections::HashMap;

use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use url::Url;

pub use flow::code_challenge;

use crate::error::Error;
use crate::provider::{AuthorizationRequest, IdentityProvider, ProviderIdentity};
use crate::types::Provider;

const CLIENT_USER_AGENT: &str = concat!("huddle-auth/", env!("CARGO_PKG_VERSION"));

/// `OAuth2` client registration for one provider.
///
/// Start from [`github`](ProviderConfig::github) or [`google`](ProviderConfig::google),
/// which fill in the provider's endpoints and default scopes:
///
/// ```rust,ignore
/// let github = ProviderConfig::github("client-id", "secret", "https://api.example.com/auth/github/callback".parse()?)?
///     .with_scopes(vec!["read:user".into()]);
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct ProviderConfig {
    pub(crate) provider: Provider,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) redirect_uri: Url,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) userinfo_url: Url,
    pub(crate) scopes: Vec<String>,
}

impl ProviderConfig {
    fn preset(
        provider: Provider,
        client_id: String,
        client_secret: String,
        redirect_uri: Url,
        endpoints: [&str; 3],
        scopes: &[&str],
    ) -> Result<Self, Error> {
        let parse = |u: &str| {
            Url::parse(u).map_err(|e| Error::Config(format!("{provider} endpoint {u}: {e}")))
        };
        let [auth_url, token_url, userinfo_url] = endpoints;
        Ok(Self {
            provider,
            client_id,
            client_secret,
            redirect_uri,
            auth_url: parse(auth_url)?,
            token_url: parse(token_url)?,
            userinfo_url: parse(userinfo_url)?,
            scopes: scopes.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    /// GitHub OAuth App.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if a preset endpoint fails to parse.
    pub fn github(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
    ) -> Result<Self, Error> {
        Self::preset(
            Provider::GitHub,
            client_id.into(),
            client_secret.into(),
            redirect_uri,
            [
                "https://github.com/login/oauth/authorize",
                "https://github.com/login/oauth/access_token",
                "https://api.github.com/user",
            ],
            &["read:user", "user:email"],
        )
    }

    /// Google OpenID Connect client.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if a preset endpoint fails to parse.
    pub fn google(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
    ) -> Result<Self, Error> {
        Self::preset(
            Provider::Google,
            client_id.into(),
            client_secret.into(),
            redirect_uri,
            [
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
                "https://openidconnect.googleapis.com/v1/userinfo",
            ],
            &["openid", "email", "profile"],
        )
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn provider(&self) -> Provider {
        self.provider
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri.as_str())
            .finish_non_exhaustive()
    }
}

/// Token response from a provider's token endpoint.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
}

/// Raw token endpoint body. GitHub reports failures with `200 OK` and an
/// `error` field, so success is decided on the body, not the status.
#[derive(Deserialize)]
struct RawTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl RawTokenResponse {
    fn into_tokens(self) -> Result<TokenResponse, Error> {
        if let Some(error) = self.error {
            let detail = match self.error_description {
                Some(desc) => format!("{error}: {desc}"),
                None => error,
            };
            return Err(Error::OAuth {
                operation: "token exchange",
                status: None,
                detail,
            });
        }

        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::OAuth {
                operation: "token exchange",
                status: None,
                detail: "response carried no access_token".into(),
            })?;

        Ok(TokenResponse {
            access_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".into()),
            expires_in: self.expires_in,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
        })
    }
}

/// `OAuth2` authorization-code client for every configured provider.
pub struct OAuthClient {
    providers: HashMap<Provider, ProviderConfig>,
    http: reqwest::Client,
}

impl Default for OAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthClient {
    /// Client with no providers registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Register (or replace) a provider.
    #[must_use]
    pub fn with_provider(mut self, config: ProviderConfig) -> Self {
        self.providers.insert(config.provider, config);
        self
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Register providers from environment variables.
    ///
    /// A provider is enabled when `<NAME>_CLIENT_ID` is set; it then also needs
    /// `<NAME>_CLIENT_SECRET` and `<NAME>_CALLBACK_URL`. `NAME` is `GITHUB` or
    /// `GOOGLE`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if an enabled provider is missing a variable or has an
    /// invalid callback URL.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut client = Self::new();

        for provider in Provider::ALL {
            let prefix = provider.as_str().to_ascii_uppercase();
            let Some(client_id) = var(&format!("{prefix}_CLIENT_ID")).filter(|v| !v.is_empty())
            else {
                continue;
            };
            let required = |suffix: &str| {
                let name = format!("{prefix}_{suffix}");
                var(&name)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| Error::Config(format!("{name} is required when {prefix}_CLIENT_ID is set")))
            };
            let client_secret = required("CLIENT_SECRET")?;
            let callback_url: Url = required("CALLBACK_URL")?
                .parse()
                .map_err(|e| Error::Config(format!("{prefix}_CALLBACK_URL: {e}")))?;

            let config = match provider {
                Provider::GitHub => ProviderConfig::github(client_id, client_secret, callback_url)?,
                Provider::Google => ProviderConfig::google(client_id, client_secret, callback_url)?,
            };
            client = client.with_provider(config);
        }

        Ok(client)
    }

    /// Providers that can be used for login.
    pub fn providers(&self) -> impl Iterator<Item = Provider> + '_ {
        self.providers.keys().copied()
    }

    fn config(&self, provider: Provider) -> Result<&ProviderConfig, Error> {
        self.providers
            .get(&provider)
            .ok_or_else(|| Error::UnknownProvider(provider.to_string()))
    }

    /// Build the authorization redirect with fresh `state` and PKCE values.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownProvider`] if `provider` is not registered,
    /// [`Error::Random`] if the OS random source fails.
    pub fn authorization_url(&self, provider: Provider) -> Result<AuthorizationRequest, Error> {
        let config = self.config(provider)?;
        let secrets = flow::FlowSecrets::generate()?;
        let scope = config.scopes.join(" ");

        let mut url = config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", config.redirect_uri.as_str())
            .append_pair("state", &secrets.state)
            .append_pair("code_challenge", &secrets.code_challenge())
            .append_pair("code_challenge_method", "S256")
            .append_pair("scope", &scope);

        Ok(AuthorizationRequest::new(url, secrets.state, secrets.code_verifier))
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// [`Error::Http`] on network failure, [`Error::OAuth`] if the provider
    /// rejects the exchange.
    pub async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, Error> {
        let config = self.config(provider)?;
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(config.token_url.clone())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .form(&params)
            .send()
            .await?;

        let response = Self::ensure_success(response, "token exchange").await?;
        response.json::<RawTokenResponse>().await?.into_tokens()
    }

    /// Fetch the user's profile with an access token.
    ///
    /// # Errors
    ///
    /// [`Error::Http`] on network failure, [`Error::OAuth`] if the endpoint
    /// answers with an error or an unexpected payload.
    pub async fn fetch_identity(
        &self,
        provider: Provider,
        tokens: &TokenResponse,
    ) -> Result<ProviderIdentity, Error> {
        let config = self.config(provider)?;
        let response = self
            .http
            .get(config.userinfo_url.clone())
            .bearer_auth(&tokens.access_token)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .await?;

        let response = Self::ensure_success(response, "userinfo request").await?;
        let body = response.bytes().await?;
        profile::parse_identity(provider, &body, tokens)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::OAuth {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}

impl IdentityProvider for OAuthClient {
    fn begin_auth(&self, provider: Provider) -> Result<AuthorizationRequest, Error> {
        self.authorization_url(provider)
    }

    async fn complete_auth(
        &self,
        provider: Provider,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderIdentity, Error> {
        let tokens = self.exchange_code(provider, code, code_verifier).await?;
        self.fetch_identity(provider, &tokens).await
    }
}

use std::future::Future;

use time::OffsetDateTime;

use crate::error::Error;
use crate::types::Provider;

/// Claims returned by an identity provider after a successful code exchange,
/// normalised to the fields every provider can fill.
///
/// Optional fields are `None` when the provider did not send them. The
/// `with_*` setters treat an empty string as absent, so a blank value can
/// never shadow a known one downstream.
#[derive(Clone)]
#[non_exhaustive]
pub struct ProviderIdentity {
    pub provider: Provider,
    /// Provider-scoped user id (GitHub numeric id, Google `sub`).
    pub provider_user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
}

fn present(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    (!value.is_empty()).then_some(value)
}

impl ProviderIdentity {
    /// Create an identity with the fields every provider must supply.
    #[must_use]
    pub fn new(
        provider: Provider,
        provider_user_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            provider_user_id: provider_user_id.into(),
            email: None,
            name: None,
            first_name: None,
            last_name: None,
            nickname: None,
            description: None,
            location: None,
            avatar_url: None,
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = present(email);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = present(name);
        self
    }

    #[must_use]
    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = present(first_name);
        self
    }

    #[must_use]
    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = present(last_name);
        self
    }

    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = present(nickname);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = present(description);
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = present(location);
        self
    }

    #[must_use]
    pub fn with_avatar_url(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = present(avatar_url);
        self
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = present(refresh_token);
        self
    }

    #[must_use]
    pub fn with_expires_at(mut self, expires_at: OffsetDateTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

impl std::fmt::Debug for ProviderIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderIdentity")
            .field("provider", &self.provider)
            .field("provider_user_id", &self.provider_user_id)
            .field("email", &self.email)
            .field("nickname", &self.nickname)
            .finish_non_exhaustive()
    }
}

/// Authorization redirect plus the values to remember until the callback.
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub code_verifier: String,
}

impl AuthorizationRequest {
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        state: impl Into<String>,
        code_verifier: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            state: state.into(),
            code_verifier: code_verifier.into(),
        }
    }
}

/// The OAuth2 provider collaborator.
///
/// [`OAuthClient`](crate::oauth::OAuthClient) is the HTTP implementation;
/// tests substitute their own.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Build the redirect that starts the authorization-code flow.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownProvider`] when the provider has no credentials configured.
    fn begin_auth(&self, provider: Provider) -> Result<AuthorizationRequest, Error>;

    /// Exchange the callback `code` and fetch the user's profile.
    fn complete_auth(
        &self,
        provider: Provider,
        code: &str,
        code_verifier: &str,
    ) -> impl Future<Output = Result<ProviderIdentity, Error>> + Send;
}

//! Provider profile payloads mapped onto [`ProviderIdentity`].

use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use super::TokenResponse;
use crate::error::Error;
use crate::provider::ProviderIdentity;
use crate::types::Provider;

/// `GET https://api.github.com/user`
#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

/// OpenID Connect userinfo as served by Google.
#[derive(Debug, Deserialize)]
struct GoogleUser {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

pub(super) fn parse_identity(
    provider: Provider,
    body: &[u8],
    tokens: &TokenResponse,
) -> Result<ProviderIdentity, Error> {
    let identity = match provider {
        Provider::GitHub => {
            let user: GitHubUser = decode(body)?;
            ProviderIdentity::new(provider, user.id.to_string(), &tokens.access_token)
                .with_nickname(user.login)
                .with_name(user.name.unwrap_or_default())
                .with_email(user.email.unwrap_or_default())
                .with_avatar_url(user.avatar_url.unwrap_or_default())
                .with_description(user.bio.unwrap_or_default())
                .with_location(user.location.unwrap_or_default())
        }
        Provider::Google => {
            let user: GoogleUser = decode(body)?;
            ProviderIdentity::new(provider, user.sub, &tokens.access_token)
                .with_email(user.email.unwrap_or_default())
                .with_name(user.name.unwrap_or_default())
                .with_first_name(user.given_name.unwrap_or_default())
                .with_last_name(user.family_name.unwrap_or_default())
                .with_avatar_url(user.picture.unwrap_or_default())
        }
    };

    let identity = match &tokens.refresh_token {
        Some(refresh_token) => identity.with_refresh_token(refresh_token),
        None => identity,
    };

    let expires_at = tokens
        .expires_in
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| OffsetDateTime::now_utc().checked_add(Duration::seconds(secs)));

    Ok(match expires_at {
        Some(expires_at) => identity.with_expires_at(expires_at),
        None => identity,
    })
}

fn decode<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(body).map_err(|e| Error::OAuth {
        operation: "userinfo request",
        status: None,
        detail: format!("unexpected profile payload: {e}"),
    })
}

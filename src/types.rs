use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Store-assigned user identifier.
///
/// Durable: a user keeps the same id across every login by the same
/// provider identity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
    Into,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Opaque session identifier, the only value the session cookie carries.
///
/// Produced by [`generate_session_id`](crate::session::generate_session_id).
/// Treat as a bearer credential: never log it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionId(..)")
    }
}

/// Supported OAuth2 identity providers.
///
/// The lowercase name is used in URL paths (`/auth/github`) and stored
/// alongside users and sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    Google,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::GitHub, Provider::Google];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Google => "google",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownProvider(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parses_path_segment() {
        assert_eq!("github".parse::<Provider>().unwrap(), Provider::GitHub);
        assert_eq!("Google".parse::<Provider>().unwrap(), Provider::Google);
    }

    #[test]
    fn unknown_provider_rejected() {
        let err = "gitlab".parse::<Provider>().unwrap_err();
        assert!(matches!(err, Error::UnknownProvider(name) if name == "gitlab"));
        assert!("".parse::<Provider>().is_err());
    }

    #[test]
    fn provider_serde_matches_path_name() {
        for provider in Provider::ALL {
            let json = serde_json::to_string(&provider).unwrap();
            assert_eq!(json, format!("\"{}\"", provider.as_str()));
        }
    }

    #[test]
    fn user_id_display_and_serde() {
        let id = UserId::from(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
    }

    #[test]
    fn session_id_debug_is_redacted() {
        let id = SessionId::from("secret-value".to_string());
        assert_eq!(format!("{id:?}"), "SessionId(..)");
        assert_eq!(id.as_str(), "secret-value");
    }
}

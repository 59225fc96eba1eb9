use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::types::SessionId;

const STATE_COOKIE_NAME: &str = "huddle_oauth_state";
const VERIFIER_COOKIE_NAME: &str = "huddle_oauth_verifier";
const FLOW_COOKIE_MAX_AGE: Duration = Duration::minutes(10);

/// Create state + PKCE verifier cookies for the authorization request.
pub(super) fn flow_cookies(
    state: &str,
    code_verifier: &str,
    secure: bool,
    auth_path: &str,
) -> (Cookie<'static>, Cookie<'static>) {
    let flow_cookie = |name: &'static str, value: &str| {
        Cookie::build((name, value.to_string()))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .path(auth_path.to_string())
            .max_age(FLOW_COOKIE_MAX_AGE)
            .build()
    };

    (
        flow_cookie(STATE_COOKIE_NAME, state),
        flow_cookie(VERIFIER_COOKIE_NAME, code_verifier),
    )
}

/// Removal cookies for state + verifier.
pub(super) fn clear_flow_cookies(auth_path: &str) -> (Cookie<'static>, Cookie<'static>) {
    let removal = |name: &'static str| Cookie::build(name).path(auth_path.to_string()).build();
    (removal(STATE_COOKIE_NAME), removal(VERIFIER_COOKIE_NAME))
}

/// The session carrier: holds the session id and nothing else.
pub(super) fn session_cookie(
    name: &str,
    session_id: &SessionId,
    max_age: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name.to_string(), session_id.as_str().to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Removal cookie for the session carrier.
pub(super) fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build(name.to_string()).path("/").build()
}

/// Session id from the carrier. `None` if absent, tampered with, or empty.
pub(super) fn get_session_id(jar: &PrivateCookieJar, name: &str) -> Option<SessionId> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .map(SessionId)
}

pub(super) fn get_state(jar: &PrivateCookieJar) -> Option<String> {
    jar.get(STATE_COOKIE_NAME).map(|c| c.value().to_string())
}

pub(super) fn get_code_verifier(jar: &PrivateCookieJar) -> Option<String> {
    jar.get(VERIFIER_COOKIE_NAME).map(|c| c.value().to_string())
}

#[cfg(test)]
mod tests {
    use axum_extra::extract::cookie::Key;

    use super::*;
    use crate::session::SESSION_MAX_AGE;

    #[test]
    fn session_cookie_attributes() {
        let id = SessionId("abc".into());
        let cookie = session_cookie("huddle_session", &id, SESSION_MAX_AGE, true);

        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(Duration::days(7)));
    }

    #[test]
    fn insecure_outside_production() {
        let cookie = session_cookie("huddle_session", &SessionId("abc".into()), SESSION_MAX_AGE, false);
        assert_eq!(cookie.secure(), Some(false));
    }

    #[test]
    fn flow_cookies_scoped_to_auth_path() {
        let (state, verifier) = flow_cookies("s", "v", false, "/auth");
        for cookie in [&state, &verifier] {
            assert_eq!(cookie.path(), Some("/auth"));
            assert_eq!(cookie.max_age(), Some(Duration::minutes(10)));
            assert_eq!(cookie.http_only(), Some(true));
        }
    }

    #[test]
    fn carrier_roundtrips_through_private_jar() {
        let jar = PrivateCookieJar::new(Key::generate()).add(session_cookie(
            "huddle_session",
            &SessionId("opaque".into()),
            SESSION_MAX_AGE,
            false,
        ));
        assert_eq!(
            get_session_id(&jar, "huddle_session").map(|id| id.as_str().to_string()),
            Some("opaque".to_string())
        );
    }

    #[test]
    fn empty_carrier_is_absent() {
        let jar = PrivateCookieJar::new(Key::generate()).add(Cookie::new("huddle_session", ""));
        assert!(get_session_id(&jar, "huddle_session").is_none());
    }
}

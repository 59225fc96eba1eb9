use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Extension, Path, Query, State};
use axum::http::{HeaderMap, header::USER_AGENT};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::Cookie;
use serde::Deserialize;
use serde_json::{Value, json};

use super::config::AuthConfig;
use super::cookies;
use super::error::AuthError;
use super::extractor::{AuthGate, AuthUser, require_auth};
use super::state::AuthState;
use crate::identity::PublicUser;
use crate::provider::IdentityProvider;
use crate::store::{SessionStore, StoreError, UserStore};
use crate::types::Provider;

/// Create the authentication router.
///
/// | Route | |
/// |---|---|
/// | `GET {auth_path}/{provider}` | redirect to the provider |
/// | `GET {auth_path}/{provider}/callback` | finish login, set the session cookie |
/// | `POST {auth_path}/logout` | end this session |
/// | `POST {auth_path}/logout/all` | end every session of the caller (authenticated) |
/// | `GET /api/me` | the caller's public profile (authenticated) |
/// | `GET /health` | liveness |
///
/// `auth_path` defaults to `/auth`. Put routes of your own behind the same
/// sessions with [`AuthGate`] and [`require_auth`].
pub fn auth_routes<P, U, S>(config: AuthConfig, provider: P, user_store: U, session_store: S) -> Router
where
    P: IdentityProvider,
    U: UserStore,
    S: SessionStore,
{
    let auth_path = config.settings.auth_path.clone();
    let state = AuthState::new(provider, user_store, session_store, config.settings);
    let gate = AuthGate::from_settings(state.sessions.clone(), &state.settings);

    let protected = Router::new()
        .route(
            &format!("{auth_path}/logout/all"),
            post(logout_everywhere::<P, U, S>),
        )
        .route("/api/me", get(me::<P, U, S>))
        .route_layer(axum::middleware::from_fn_with_state(gate, require_auth::<S>));

    Router::new()
        .route(&format!("{auth_path}/logout"), post(logout::<P, U, S>))
        .route(&format!("{auth_path}/{{provider}}"), get(begin_auth::<P, U, S>))
        .route(
            &format!("{auth_path}/{{provider}}/callback"),
            get(callback::<P, U, S>),
        )
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

// ── Begin ──────────────────────────────────────────────────────────

async fn begin_auth<P: IdentityProvider, U: UserStore, S: SessionStore>(
    State(state): State<AuthState<P, U, S>>,
    Path(provider): Path<String>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Redirect), AuthError> {
    let provider: Provider = provider.parse()?;
    let auth_req = state.provider.begin_auth(provider)?;

    let (state_cookie, verifier_cookie) = cookies::flow_cookies(
        &auth_req.state,
        &auth_req.code_verifier,
        state.settings.secure_cookies,
        &state.settings.auth_path,
    );

    tracing::debug!(%provider, "Starting OAuth2 login");
    Ok((jar.add(state_cookie).add(verifier_cookie), Redirect::to(&auth_req.url)))
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// The flow cookies are single-use: they are cleared whether login succeeds or not.
async fn callback<P: IdentityProvider, U: UserStore, S: SessionStore>(
    State(state): State<AuthState<P, U, S>>,
    Path(provider): Path<String>,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    headers: HeaderMap,
) -> Response {
    let peer = peer.map(|Extension(ConnectInfo(addr))| addr);
    let result = complete_login(&state, &provider, &jar, params, peer, &headers).await;

    let (clear_state, clear_verifier) = cookies::clear_flow_cookies(&state.settings.auth_path);
    let jar = jar.remove(clear_state).remove(clear_verifier);

    match result {
        Ok((session_cookie, response)) => (jar.add(session_cookie), response).into_response(),
        Err(e) => (jar, e).into_response(),
    }
}

async fn complete_login<P: IdentityProvider, U: UserStore, S: SessionStore>(
    state: &AuthState<P, U, S>,
    provider: &str,
    jar: &PrivateCookieJar,
    params: CallbackParams,
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
) -> Result<(Cookie<'static>, Response), AuthError> {
    let provider: Provider = provider.parse()?;

    if let Some(error) = &params.error {
        let desc = params.error_description.as_deref().unwrap_or("Unknown error");
        tracing::warn!(%provider, error = %error, description = %desc, "OAuth2 error from provider");
        return Err(AuthError::OAuth(format!("{error}: {desc}")));
    }

    let code = params
        .code
        .ok_or_else(|| AuthError::OAuth("missing authorization code".into()))?;

    let received_state = params
        .state
        .ok_or_else(|| AuthError::OAuth("state mismatch".into()))?;

    let stored_state =
        cookies::get_state(jar).ok_or_else(|| AuthError::OAuth("state mismatch".into()))?;

    if received_state != stored_state {
        tracing::warn!(%provider, "OAuth state mismatch");
        return Err(AuthError::OAuth("state mismatch".into()));
    }

    let code_verifier = cookies::get_code_verifier(jar)
        .ok_or_else(|| AuthError::OAuth("missing PKCE verifier".into()))?;

    let identity = state
        .provider
        .complete_auth(provider, &code, &code_verifier)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, %provider, "OAuth2 code exchange failed");
            AuthError::from(e)
        })?;

    let user = state.reconciler.reconcile(&identity).await.map_err(|e| {
        tracing::error!(error = %e, %provider, "Failed to save user");
        AuthError::from(e)
    })?;

    let client_ip = extract_client_ip(headers, state.settings.trust_forwarded_headers, peer);
    let session = state
        .sessions
        .create_session(user.id, provider, client_ip, extract_user_agent(headers))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = %user.id, "Session creation failed");
            AuthError::from(e)
        })?;

    let session_cookie = cookies::session_cookie(
        &state.settings.session_cookie_name,
        &session.id,
        state.sessions.ttl(),
        state.settings.secure_cookies,
    );

    tracing::info!(user_id = %user.id, %provider, "OAuth2 login successful");

    let response = match &state.settings.frontend_url {
        Some(url) => {
            let target = format!("{}/", url.trim_end_matches('/'));
            Redirect::to(&target).into_response()
        }
        None => Json(json!({
            "message": "authentication successful",
            "user": PublicUser::from(&user),
        }))
        .into_response(),
    };
    Ok((session_cookie, response))
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<P: IdentityProvider, U: UserStore, S: SessionStore>(
    State(state): State<AuthState<P, U, S>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Json<Value>) {
    let cookie_name = &state.settings.session_cookie_name;

    if let Some(session_id) = cookies::get_session_id(&jar, cookie_name) {
        if let Err(e) = state.sessions.delete_session_by_id(&session_id).await {
            tracing::warn!(error = %e, "Session deletion failed during logout");
        }
    }

    let clear_cookie = cookies::clear_session_cookie(cookie_name);
    (
        jar.remove(clear_cookie),
        Json(json!({ "message": "logged out successfully" })),
    )
}

async fn logout_everywhere<P: IdentityProvider, U: UserStore, S: SessionStore>(
    State(state): State<AuthState<P, U, S>>,
    user: AuthUser,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Json<Value>), AuthError> {
    let revoked = state
        .sessions
        .delete_all_sessions_for_user(user.user_id)
        .await?;

    let clear_cookie = cookies::clear_session_cookie(&state.settings.session_cookie_name);
    Ok((
        jar.remove(clear_cookie),
        Json(json!({ "message": "logged out everywhere", "revoked_sessions": revoked })),
    ))
}

// ── API ────────────────────────────────────────────────────────────

async fn me<P: IdentityProvider, U: UserStore, S: SessionStore>(
    State(state): State<AuthState<P, U, S>>,
    user: AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    let row = state.users.find_by_id(user.user_id).await.map_err(|e| match e {
        StoreError::NotFound => AuthError::NotFound("user not found".into()),
        other => AuthError::Store(other.to_string()),
    })?;

    Ok(Json(PublicUser::from(&row)))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ── Helpers ────────────────────────────────────────────────────────

fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// `X-Forwarded-For` / `X-Real-IP` are client-controlled unless a proxy
/// overwrites them, so they are only read when `trust_forwarded` is set.
fn extract_client_ip(
    headers: &HeaderMap,
    trust_forwarded: bool,
    peer: Option<SocketAddr>,
) -> Option<String> {
    let forwarded = || {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string())
            })
    };

    trust_forwarded
        .then(forwarded)
        .flatten()
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

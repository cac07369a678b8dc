use axum::{extract::State, response::IntoResponse, Json};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use serde::Serialize;
use serde_json::json;

use crate::error::AppError;
use crate::middleware::gate::gate_placeholder;
use crate::middleware::guard::{ActiveMember, Caller};
use crate::services::session::RefreshError;
use crate::AppState;

pub const ACCESS_COOKIE: &str = "hearth_session";
pub const REFRESH_COOKIE: &str = "hearth_refresh";
/// The refresh cookie is scoped to the refresh endpoint so it rides along on
/// exactly one request shape.
pub const REFRESH_COOKIE_PATH: &str = "/api/auth/refresh";

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub expires_in: i64,
    pub needs_setup: bool,
}

pub fn access_cookie(token: &str, secure: bool, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((ACCESS_COOKIE, token.to_string()))
        .http_only(true)
        .secure(secure)
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

pub fn refresh_cookie(token: &str, secure: bool, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token.to_string()))
        .http_only(true)
        .secure(secure)
        .path(REFRESH_COOKIE_PATH)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

fn expire(name: &'static str, path: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .http_only(true)
        .path(path)
        .max_age(time::Duration::ZERO)
        .build()
}

/// Issue a full session: both cookies plus the JSON body.
pub fn issue_session(
    state: &AppState,
    jar: CookieJar,
    access_token: &str,
    refresh_token: &str,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    needs_setup: bool,
) -> (CookieJar, Json<TokenResponse>) {
    let secure = state.config.security.secure_cookies;
    let jar = jar
        .add(access_cookie(access_token, secure, access_ttl_secs))
        .add(refresh_cookie(refresh_token, secure, refresh_ttl_secs));
    (
        jar,
        Json(TokenResponse {
            token_type: "Bearer".to_string(),
            expires_in: access_ttl_secs,
            needs_setup,
        }),
    )
}

/// `POST /api/auth/refresh`. Rotates the refresh credential and re-issues
/// the access cookie, re-deriving claims from the member record where one
/// exists so role changes take effect at the next refresh.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("auth/no-token")))?;

    let claims = state
        .sessions
        .verify_refresh_token(&token)
        .await
        .map_err(|err| match err {
            RefreshError::Token(_) => AppError::Unauthorized(anyhow::anyhow!("auth/invalid-token")),
            RefreshError::Stale => AppError::Unauthorized(anyhow::anyhow!("session/stale-refresh")),
            RefreshError::Store(err) => err,
        })?;

    let mut session = claims.session;
    if let Some(member) = state.members.find_by_uid(&session.site, &session.sub).await? {
        let needs_setup = session.needs_setup;
        session = member.session_claims(needs_setup);
    }

    let access = state.sessions.sign_access_token(&session)?;
    let refresh = state.sessions.rotate_refresh_token(&session).await?;
    Ok(issue_session(
        &state,
        jar,
        &access,
        &refresh,
        state.sessions.access_ttl_secs(),
        state.sessions.refresh_ttl_secs(),
        session.needs_setup,
    ))
}

/// `POST /api/auth/logout`. Revokes the registry entry when the caller can
/// still be identified, and clears both cookies either way.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let sub = jar
        .get(REFRESH_COOKIE)
        .or_else(|| jar.get(ACCESS_COOKIE))
        .map(|c| c.value().to_string())
        .and_then(|token| state.codec.verify(&token).ok())
        .map(|claims| claims.session.sub);

    if let Some(sub) = sub {
        state.sessions.revoke_refresh_token(&sub).await?;
    }

    let jar = jar
        .add(expire(ACCESS_COOKIE, "/"))
        .add(expire(REFRESH_COOKIE, REFRESH_COOKIE_PATH));
    Ok((jar, Json(json!({ "status": "logged_out" }))))
}

/// `GET /api/auth/me`. Member-guarded.
pub async fn me(Caller(claims): Caller, ActiveMember(member): ActiveMember) -> impl IntoResponse {
    Json(json!({
        "claims": claims,
        "member": super::invite::MemberResponse::from(member),
    }))
}

/// `GET /auth/gate`. The gate serves this placeholder in place for gated
/// pages; the route exists for clients that land on it directly.
pub async fn auth_gate() -> impl IntoResponse {
    gate_placeholder("/")
}

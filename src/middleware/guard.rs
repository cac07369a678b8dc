use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use serde_json::json;

use crate::handlers::session::ACCESS_COOKIE;
use crate::models::{Member, SessionClaims};
use crate::AppState;

fn reject(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

/// Require a valid session token. Accepts a bearer header or the session
/// cookie; attaches the verified claims for downstream extractors.
pub async fn user_guard(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|t| t.to_string());
    let token = bearer.or_else(|| jar.get(ACCESS_COOKIE).map(|c| c.value().to_string()));

    let token = match token {
        Some(token) => token,
        None => return reject(StatusCode::UNAUTHORIZED, "auth/no-token"),
    };

    match state.codec.verify(&token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims.session);
            next.run(req).await
        }
        Err(_) => reject(StatusCode::UNAUTHORIZED, "auth/invalid-token"),
    }
}

/// Require that the verified caller resolves to a member record. Layered
/// after [`user_guard`]; a valid session without membership gets 404, which
/// is deliberately distinct from the 401 an invalid token gets.
pub async fn member_guard(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let claims = match req.extensions().get::<SessionClaims>() {
        Some(claims) => claims.clone(),
        None => return reject(StatusCode::UNAUTHORIZED, "auth/no-token"),
    };

    match state.members.find_by_uid(&claims.site, &claims.sub).await {
        Ok(Some(member)) => {
            req.extensions_mut().insert(member);
            next.run(req).await
        }
        Ok(None) => reject(StatusCode::NOT_FOUND, "member/not-found"),
        Err(err) => {
            tracing::error!(error = %err, "Member lookup failed");
            err.into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GuardRejection {
    pub error: String,
}

/// The verified session claims, for handlers behind [`user_guard`] or the
/// request gate.
pub struct Caller(pub SessionClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<GuardRejection>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<SessionClaims>().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(GuardRejection {
                error: "Session claims missing from request extensions".to_string(),
            }),
        ))?;
        Ok(Caller(claims.clone()))
    }
}

/// The resolved member record, for handlers behind [`member_guard`].
pub struct ActiveMember(pub Member);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ActiveMember
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<GuardRejection>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let member = parts.extensions.get::<Member>().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(GuardRejection {
                error: "Member record missing from request extensions".to_string(),
            }),
        ))?;
        Ok(ActiveMember(member.clone()))
    }
}

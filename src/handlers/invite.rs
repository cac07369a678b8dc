use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;
use crate::middleware::guard::ActiveMember;
use crate::models::{Invite, InviteStatus, Member, Role, SignupStatus};
use crate::services::invite::AcceptIdentity;
use crate::AppState;

use super::session::issue_session;

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub id: String,
    pub site: String,
    pub uid: Option<String>,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl From<Member> for MemberResponse {
    fn from(member: Member) -> Self {
        Self {
            id: member.id,
            site: member.site,
            uid: member.uid,
            email: member.email,
            role: member.role,
            first_name: member.first_name,
            last_name: member.last_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub token: String,
    pub site: String,
    pub status: InviteStatus,
    pub single_use: bool,
    pub expires_at: DateTime<Utc>,
}

impl From<Invite> for InviteResponse {
    fn from(invite: Invite) -> Self {
        Self {
            token: invite.token,
            site: invite.site,
            status: invite.status,
            single_use: invite.single_use,
            expires_at: invite.expires_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInviteRequest {
    #[serde(default)]
    pub single_use: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateInviteResponse {
    #[serde(flatten)]
    pub invite: InviteResponse,
    pub url: String,
}

/// `POST /api/invites`. Member-guarded; only admins may mint invites.
pub async fn create_invite(
    State(state): State<AppState>,
    ActiveMember(member): ActiveMember,
    Json(body): Json<CreateInviteRequest>,
) -> Result<impl IntoResponse, AppError> {
    if member.role != Role::Admin {
        return Err(AppError::Forbidden(anyhow::anyhow!("invite/admin-only")));
    }

    let invited_by = member.uid.clone().unwrap_or_else(|| member.id.clone());
    let invite = state
        .invites
        .create_invite(&member.site, Some(invited_by), body.single_use)
        .await?;
    let url = format!("{}/invite/{}", state.config.invites.base_url, invite.token);

    Ok((
        StatusCode::CREATED,
        Json(CreateInviteResponse {
            invite: invite.into(),
            url,
        }),
    ))
}

/// `GET /api/invites/{token}`. Public: the landing page uses this to decide
/// whether to show the join flow or the "link no longer valid" state.
pub async fn get_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let invite = state.invites.get_usable_invite(&token).await?;
    Ok(Json(InviteResponse::from(invite)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptInviteRequest {
    #[validate(length(min = 1))]
    pub external_id: String,
    #[validate(length(min = 1))]
    pub site: String,
    #[validate(email)]
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AcceptInviteResponse {
    pub member: MemberResponse,
    pub needs_setup: bool,
}

/// `POST /api/invites/{token}/accept`. Joins (or merges into) the member
/// registry and issues the short invite-flow session.
pub async fn accept_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
    jar: CookieJar,
    Json(body): Json<AcceptInviteRequest>,
) -> Result<impl IntoResponse, AppError> {
    body.validate()?;

    let identity = AcceptIdentity {
        uid: body.external_id,
        email: body.email,
        first_name: body.first_name,
        last_name: body.last_name,
        site: Some(body.site),
    };
    let outcome = state.invites.accept_invite(&token, identity).await?;

    let claims = outcome.member.session_claims(outcome.needs_setup);
    let access_ttl = state.config.jwt.invite_access_minutes * 60;
    let refresh_ttl = state.config.jwt.invite_refresh_minutes * 60;
    let access = state.sessions.sign_access_token_with_ttl(&claims, access_ttl)?;
    let refresh = state
        .sessions
        .sign_refresh_token_with_ttl(&claims, refresh_ttl)
        .await?;

    let (jar, _) = issue_session(
        &state,
        jar,
        &access,
        &refresh,
        access_ttl,
        refresh_ttl,
        outcome.needs_setup,
    );
    Ok((
        jar,
        Json(AcceptInviteResponse {
            member: outcome.member.into(),
            needs_setup: outcome.needs_setup,
        }),
    ))
}

/// `POST /api/invites/{token}/revoke`. Member-guarded, admin-only, scoped to
/// the caller's own site.
pub async fn revoke_invite(
    State(state): State<AppState>,
    ActiveMember(member): ActiveMember,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if member.role != Role::Admin {
        return Err(AppError::Forbidden(anyhow::anyhow!("invite/admin-only")));
    }

    let invite = state
        .invites
        .revoke_invite(&token, Some(&member.site))
        .await?;
    Ok(Json(InviteResponse::from(invite)))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub site: String,
    pub email: String,
    pub status: SignupStatus,
    pub verification_token: String,
}

/// `GET /api/invites/{token}/verify?code=`. Flips a signup request from
/// `pending_verification` to `pending`; a replayed link reports the replay
/// instead of re-verifying.
pub async fn verify_signup(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> Result<impl IntoResponse, AppError> {
    let request = state.invites.verify_signup(&query.code).await?;

    // The emailed link carries the invite token for context; a mismatch
    // means the code was pasted under the wrong link.
    if let Some(invite_token) = &request.invite_token {
        if invite_token != &token {
            return Err(AppError::BadRequest(anyhow::anyhow!("signup/wrong-invite")));
        }
    }

    Ok(Json(SignupResponse {
        site: request.site,
        email: request.email,
        status: request.status,
        verification_token: request.verification_token,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequestBody {
    #[validate(length(min = 1))]
    pub site: String,
    #[validate(email)]
    pub email: String,
    pub invite_token: Option<String>,
}

/// `POST /api/signup`. Idempotent per (email, site); the verification token
/// is returned to the caller because mail delivery is an external
/// collaborator.
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequestBody>,
) -> Result<impl IntoResponse, AppError> {
    body.validate()?;

    let request = state
        .invites
        .create_signup_request(&body.site, &body.email, body.invite_token)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SignupResponse {
            site: request.site,
            email: request.email,
            status: request.status,
            verification_token: request.verification_token,
        }),
    ))
}

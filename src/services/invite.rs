use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, to_bson, to_document, Bson},
    error::{TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
    ClientSession,
};
use thiserror::Error;

use crate::config::InviteConfig;
use crate::error::AppError;
use crate::models::{Invite, InviteStatus, Member, Role, SignupRequest, SignupStatus};
use crate::services::database::MongoDb;

/// Invite and signup rejections, each carrying the stable code clients
/// branch on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InviteError {
    #[error("invite/not-found")]
    NotFound,
    #[error("invite/expired")]
    Expired,
    #[error("invite/revoked")]
    Revoked,
    #[error("invite/used")]
    Used,
    #[error("invite/wrong-site")]
    WrongSite,
    #[error("invite/missing-email")]
    MissingEmail,
    #[error("invite/email-taken")]
    EmailTaken,
    #[error("signup/already-verified")]
    AlreadyVerified,
    #[error("signup/expired")]
    SignupExpired,
}

impl From<InviteError> for AppError {
    fn from(err: InviteError) -> Self {
        let msg = anyhow::anyhow!(err.to_string());
        match err {
            InviteError::NotFound => AppError::NotFound(msg),
            InviteError::Expired
            | InviteError::Revoked
            | InviteError::Used
            | InviteError::SignupExpired => AppError::Gone(msg),
            InviteError::WrongSite => AppError::Forbidden(msg),
            InviteError::MissingEmail => AppError::BadRequest(msg),
            InviteError::EmailTaken | InviteError::AlreadyVerified => AppError::Conflict(msg),
        }
    }
}

/// The identity of the person accepting an invite, as attested by their
/// session or the verification flow.
#[derive(Debug, Clone)]
pub struct AcceptIdentity {
    pub uid: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Site the caller believes the invite belongs to; mismatch is rejected
    /// before any write.
    pub site: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberPlan {
    /// Insert a brand-new member record.
    Create(Member),
    /// Replace an existing record with this merged state.
    Merge(Member),
}

/// Everything acceptance will write, decided up front so the decision logic
/// stays independent of the transaction plumbing.
#[derive(Debug, Clone)]
pub struct AcceptPlan {
    pub member: MemberPlan,
    pub mark_used: bool,
    pub needs_setup: bool,
}

/// Decide what accepting `invite` as `identity` should do.
///
/// Pure over its inputs. Merge backfills rather than overwrites: an existing
/// record keeps its names unless it had none, gains a uid only if it had
/// none, and a `pending` role is promoted to full membership.
pub fn plan_accept(
    invite: &Invite,
    existing: Option<&Member>,
    identity: &AcceptIdentity,
    now: DateTime<Utc>,
) -> Result<AcceptPlan, InviteError> {
    match invite.status {
        InviteStatus::Pending => {}
        InviteStatus::Used => return Err(InviteError::Used),
        InviteStatus::Expired => return Err(InviteError::Expired),
        InviteStatus::Revoked => return Err(InviteError::Revoked),
    }
    if invite.is_expired_at(now) {
        return Err(InviteError::Expired);
    }
    if let Some(site) = &identity.site {
        if site != &invite.site {
            return Err(InviteError::WrongSite);
        }
    }

    let plan = match existing {
        Some(current) => {
            if let Some(uid) = &current.uid {
                if uid != &identity.uid {
                    // The matched record belongs to a different signed-in
                    // identity; refuse rather than reassign.
                    return Err(InviteError::EmailTaken);
                }
            }
            let mut merged = current.clone();
            if merged.uid.is_none() {
                merged.uid = Some(identity.uid.clone());
            }
            if let Some(email) = &identity.email {
                merged.email = crate::models::normalize_email(email);
            }
            if merged.first_name.is_none() {
                merged.first_name = identity.first_name.clone();
            }
            if merged.last_name.is_none() {
                merged.last_name = identity.last_name.clone();
            }
            if merged.role == Role::Pending {
                merged.role = Role::Member;
            }
            merged.updated_at = now;
            AcceptPlan {
                member: MemberPlan::Merge(merged),
                mark_used: invite.single_use,
                needs_setup: false,
            }
        }
        None => {
            let email = identity
                .email
                .as_deref()
                .map(crate::models::normalize_email)
                .ok_or(InviteError::MissingEmail)?;
            let mut member = Member::new(invite.site.clone(), identity.uid.clone(), email, Role::Member);
            member.first_name = identity.first_name.clone();
            member.last_name = identity.last_name.clone();
            member.created_at = now;
            member.updated_at = now;
            AcceptPlan {
                member: MemberPlan::Create(member),
                mark_used: invite.single_use,
                needs_setup: true,
            }
        }
    };
    Ok(plan)
}

#[derive(Debug, Clone)]
pub struct AcceptOutcome {
    pub member: Member,
    pub invite: Invite,
    pub needs_setup: bool,
}

/// Invite and signup lifecycle against the member registry.
#[derive(Clone)]
pub struct InviteService {
    db: MongoDb,
    ttl_hours: i64,
    signup_ttl_hours: i64,
}

impl InviteService {
    pub fn new(db: MongoDb, config: &InviteConfig) -> Self {
        Self {
            db,
            ttl_hours: config.ttl_hours,
            signup_ttl_hours: config.signup_ttl_hours,
        }
    }

    pub async fn create_invite(
        &self,
        site: &str,
        invited_by: Option<String>,
        single_use: bool,
    ) -> Result<Invite, AppError> {
        let invite = Invite::new(site, invited_by, self.ttl_hours, single_use);
        self.db.invites().insert_one(&invite, None).await?;
        tracing::info!(site = %site, single_use, "Invite created");
        Ok(invite)
    }

    /// Look up an invite by token, persisting the expired transition if its
    /// deadline has passed. The flip is guarded on the current status so a
    /// concurrent accept or revoke wins.
    pub async fn get_invite(&self, token: &str) -> Result<Invite, AppError> {
        let invite = self
            .db
            .invites()
            .find_one(doc! { "_id": token }, None)
            .await?
            .ok_or(InviteError::NotFound)?;

        let now = Utc::now();
        if invite.status == InviteStatus::Pending && invite.is_expired_at(now) {
            let flipped = self
                .db
                .invites()
                .find_one_and_update(
                    doc! { "_id": token, "status": InviteStatus::Pending.as_str() },
                    doc! { "$set": {
                        "status": InviteStatus::Expired.as_str(),
                        "updated_at": bson_dt(now)?,
                    }},
                    FindOneAndUpdateOptions::builder()
                        .return_document(ReturnDocument::After)
                        .build(),
                )
                .await?;
            if let Some(flipped) = flipped {
                return Ok(flipped);
            }
            // Lost the race; re-read whatever state won.
            return self
                .db
                .invites()
                .find_one(doc! { "_id": token }, None)
                .await?
                .ok_or_else(|| InviteError::NotFound.into());
        }
        Ok(invite)
    }

    /// Fetch an invite and require that it is still acceptable.
    pub async fn get_usable_invite(&self, token: &str) -> Result<Invite, AppError> {
        let invite = self.get_invite(token).await?;
        match invite.status {
            InviteStatus::Pending => Ok(invite),
            InviteStatus::Used => Err(InviteError::Used.into()),
            InviteStatus::Expired => Err(InviteError::Expired.into()),
            InviteStatus::Revoked => Err(InviteError::Revoked.into()),
        }
    }

    /// Revoke a pending invite. Revoking an already-revoked invite is a
    /// no-op; a used or expired invite cannot be revoked.
    pub async fn revoke_invite(&self, token: &str, site: Option<&str>) -> Result<Invite, AppError> {
        let invite = self.get_invite(token).await?;
        if let Some(site) = site {
            if site != invite.site {
                return Err(InviteError::WrongSite.into());
            }
        }
        match invite.status {
            InviteStatus::Revoked => Ok(invite),
            InviteStatus::Used => Err(InviteError::Used.into()),
            InviteStatus::Expired => Err(InviteError::Expired.into()),
            InviteStatus::Pending => {
                let flipped = self
                    .db
                    .invites()
                    .find_one_and_update(
                        doc! { "_id": token, "status": InviteStatus::Pending.as_str() },
                        doc! { "$set": {
                            "status": InviteStatus::Revoked.as_str(),
                            "updated_at": bson_dt(Utc::now())?,
                        }},
                        FindOneAndUpdateOptions::builder()
                            .return_document(ReturnDocument::After)
                            .build(),
                    )
                    .await?;
                flipped.ok_or_else(|| {
                    AppError::Conflict(anyhow::anyhow!("invite/state-changed"))
                })
            }
        }
    }

    /// Accept an invite: one transaction covering the member write and the
    /// invite usage update, so a failure on either side leaves both
    /// untouched.
    ///
    /// Retries on the server's transient-transaction labels: two
    /// simultaneous accepts for the same identity conflict, and the loser
    /// re-runs, observes the winner's member record, and merges instead of
    /// duplicating.
    pub async fn accept_invite(
        &self,
        token: &str,
        identity: AcceptIdentity,
    ) -> Result<AcceptOutcome, AppError> {
        let mut session = self.db.client().start_session(None).await?;

        let outcome = loop {
            session.start_transaction(None).await?;

            let outcome = match self.accept_in_txn(&mut session, token, &identity).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    let _ = session.abort_transaction().await;
                    if is_transient_txn_error(&err) {
                        continue;
                    }
                    return Err(err);
                }
            };

            match commit_with_retry(&mut session).await {
                Ok(()) => break outcome,
                Err(err) if is_transient_txn_error(&err) => continue,
                Err(err) => return Err(err),
            }
        };

        tracing::info!(
            site = %outcome.member.site,
            member_id = %outcome.member.id,
            "Invite accepted"
        );
        Ok(outcome)
    }

    async fn accept_in_txn(
        &self,
        session: &mut ClientSession,
        token: &str,
        identity: &AcceptIdentity,
    ) -> Result<AcceptOutcome, AppError> {
        let now = Utc::now();
        let invites = self.db.invites();
        let members = self.db.members();

        let invite = invites
            .find_one_with_session(doc! { "_id": token }, None, session)
            .await?
            .ok_or(InviteError::NotFound)?;

        // Match the caller's identity first, then a pre-provisioned record
        // holding the same address.
        let mut existing = members
            .find_one_with_session(
                doc! { "site": &invite.site, "uid": &identity.uid },
                None,
                session,
            )
            .await?;
        if existing.is_none() {
            if let Some(email) = &identity.email {
                existing = members
                    .find_one_with_session(
                        doc! { "site": &invite.site, "email": crate::models::normalize_email(email) },
                        None,
                        session,
                    )
                    .await?;
            }
        }

        let plan = plan_accept(&invite, existing.as_ref(), identity, now)?;

        let member = match &plan.member {
            MemberPlan::Create(member) => {
                members.insert_one_with_session(member, None, session).await?;
                member.clone()
            }
            MemberPlan::Merge(member) => {
                members
                    .replace_one_with_session(doc! { "_id": &member.id }, member, None, session)
                    .await?;
                member.clone()
            }
        };

        let invite = if plan.mark_used {
            invites
                .find_one_and_update_with_session(
                    doc! { "_id": token, "status": InviteStatus::Pending.as_str() },
                    doc! { "$set": {
                        "status": InviteStatus::Used.as_str(),
                        "last_used_at": bson_dt(now)?,
                        "last_used_by": &identity.uid,
                        "updated_at": bson_dt(now)?,
                    }},
                    FindOneAndUpdateOptions::builder()
                        .return_document(ReturnDocument::After)
                        .build(),
                    session,
                )
                .await?
                .ok_or(InviteError::Used)?
        } else {
            invites
                .find_one_and_update_with_session(
                    doc! { "_id": token },
                    doc! { "$set": {
                        "last_used_at": bson_dt(now)?,
                        "last_used_by": &identity.uid,
                        "updated_at": bson_dt(now)?,
                    }},
                    FindOneAndUpdateOptions::builder()
                        .return_document(ReturnDocument::After)
                        .build(),
                    session,
                )
                .await?
                .ok_or(InviteError::NotFound)?
        };

        Ok(AcceptOutcome {
            member,
            invite,
            needs_setup: plan.needs_setup,
        })
    }

    /// Record a request to join a site. Idempotent per (email, site): a
    /// repeat submission refreshes `updated_at` on the existing document
    /// instead of creating a second one.
    pub async fn create_signup_request(
        &self,
        site: &str,
        email: &str,
        invite_token: Option<String>,
    ) -> Result<SignupRequest, AppError> {
        let request = SignupRequest::new(site, email, invite_token, self.signup_ttl_hours);
        let mut on_insert = to_document(&request)
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;
        on_insert.remove("updated_at");

        self.db
            .signup_requests()
            .update_one(
                doc! { "_id": &request.identity_key },
                doc! {
                    "$setOnInsert": on_insert,
                    "$set": { "updated_at": bson_dt(request.updated_at)? },
                },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;

        self.db
            .signup_requests()
            .find_one(doc! { "_id": &request.identity_key }, None)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("signup request vanished after upsert")))
    }

    /// Verify a signup by its emailed token. The status flip is guarded on
    /// the current state, so a link clicked twice reports the replay instead
    /// of double-provisioning.
    pub async fn verify_signup(&self, verification_token: &str) -> Result<SignupRequest, AppError> {
        let request = self
            .db
            .signup_requests()
            .find_one(doc! { "verification_token": verification_token }, None)
            .await?
            .ok_or(InviteError::NotFound)?;

        let now = Utc::now();
        if request.status != SignupStatus::PendingVerification {
            return Err(InviteError::AlreadyVerified.into());
        }
        if request.is_expired_at(now) {
            return Err(InviteError::SignupExpired.into());
        }

        let verified = self
            .db
            .signup_requests()
            .find_one_and_update(
                doc! {
                    "verification_token": verification_token,
                    "status": "pending_verification",
                },
                doc! { "$set": {
                    "status": "pending",
                    "updated_at": bson_dt(now)?,
                }},
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await?;

        verified.ok_or_else(|| InviteError::AlreadyVerified.into())
    }
}

/// Commit, retrying while the server reports an unknown commit outcome.
async fn commit_with_retry(session: &mut ClientSession) -> Result<(), AppError> {
    loop {
        match session.commit_transaction().await {
            Ok(()) => return Ok(()),
            Err(err) if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

/// Write conflicts between concurrent transactions surface with this label;
/// the whole transaction body is safe to re-run.
fn is_transient_txn_error(err: &AppError) -> bool {
    match err {
        AppError::Database(inner) => inner
            .downcast_ref::<mongodb::error::Error>()
            .map(|e| e.contains_label(TRANSIENT_TRANSACTION_ERROR))
            .unwrap_or(false),
        _ => false,
    }
}

fn bson_dt(dt: DateTime<Utc>) -> Result<Bson, AppError> {
    to_bson(&dt).map_err(|e| AppError::Internal(anyhow::Error::new(e)))
}

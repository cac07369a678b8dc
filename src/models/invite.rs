use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Invite lifecycle states.
///
/// Status only ever advances, with one deliberate exception: a reusable
/// (family) link stays `Pending` after acceptance and records usage metadata
/// instead. Only single-use links flip to `Used`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Used,
    Expired,
    Revoked,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Used => "used",
            InviteStatus::Expired => "expired",
            InviteStatus::Revoked => "revoked",
        }
    }
}

/// A shareable tokenized link granting join access to a site.
///
/// The token itself is the primary key; invites are never physically deleted
/// so the collection doubles as an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    #[serde(rename = "_id")]
    pub token: String,
    pub site: String,
    pub status: InviteStatus,
    /// Reusable family links (the default) keep `status == Pending` across
    /// acceptances; single-use links transition to `Used` on first accept.
    #[serde(default)]
    pub single_use: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_by: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_by: Option<String>,
}

impl Invite {
    pub fn new(
        site: impl Into<String>,
        invited_by: Option<String>,
        ttl_hours: i64,
        single_use: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            token: generate_token(),
            site: site.into(),
            status: InviteStatus::Pending,
            single_use,
            invited_by,
            expires_at: now + Duration::hours(ttl_hours),
            created_at: now,
            updated_at: now,
            last_used_at: None,
            last_used_by: None,
        }
    }

    /// Computed expiry; persistence of the `Expired` transition happens
    /// lazily on read, not here.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// 32 random bytes, hex-encoded: unguessable and URL-safe.
pub(crate) fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

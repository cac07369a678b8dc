use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Role, SessionClaims};

/// A joined identity: binds an external account to a site with a role.
///
/// Uniqueness axes: at most one member per (site, uid) and per (site, email).
/// `uid` is optional because operators can pre-provision a member by email
/// before the person has ever signed in; accepting an invite backfills it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "_id")]
    pub id: String,
    pub site: String,
    pub uid: Option<String>,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    pub fn new(
        site: impl Into<String>,
        uid: impl Into<String>,
        email: impl Into<String>,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            site: site.into(),
            uid: Some(uid.into()),
            email: email.into(),
            role,
            first_name: None,
            last_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Session claims derived from the current record.
    ///
    /// `needs_setup` is session state rather than member state, so the caller
    /// supplies it.
    pub fn session_claims(&self, needs_setup: bool) -> SessionClaims {
        let sub = self.uid.clone().unwrap_or_else(|| self.id.clone());
        SessionClaims::new(sub, self.site.clone(), self.role, self.email.clone())
            .with_name(self.first_name.clone(), self.last_name.clone())
            .with_needs_setup(needs_setup)
    }
}

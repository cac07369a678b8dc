use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::invite::generate_token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignupStatus {
    PendingVerification,
    Pending,
    Approved,
    Rejected,
}

/// A pending request to join a site, created before email verification.
///
/// The document id is a hash of (normalized email, site), which makes
/// creation idempotent: concurrent or repeated submissions for the same
/// address upsert into one document instead of duplicating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    #[serde(rename = "_id")]
    pub identity_key: String,
    pub site: String,
    pub email: String,
    pub status: SignupStatus,
    /// Single-use: verification atomically flips the status, so a link
    /// clicked twice (e.g. by a mail pre-fetcher) cannot double-provision.
    pub verification_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SignupRequest {
    pub fn new(
        site: impl Into<String>,
        email: &str,
        invite_token: Option<String>,
        ttl_hours: i64,
    ) -> Self {
        let site = site.into();
        let now = Utc::now();
        Self {
            identity_key: Self::identity_key(&site, email),
            site,
            email: normalize_email(email),
            status: SignupStatus::PendingVerification,
            verification_token: generate_token(),
            invite_token,
            expires_at: now + Duration::hours(ttl_hours),
            created_at: now,
            updated_at: now,
        }
    }

    /// Stable id for (email, site): at most one live request per pair.
    pub fn identity_key(site: &str, email: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(normalize_email(email).as_bytes());
        hasher.update(b":");
        hasher.update(site.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Canonical form used for identity keys and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_is_case_and_whitespace_insensitive() {
        let a = SignupRequest::identity_key("site-1", "Person@Example.COM ");
        let b = SignupRequest::identity_key("site-1", "person@example.com");
        assert_eq!(a, b);
    }

    #[test]
    fn identity_key_separates_sites() {
        let a = SignupRequest::identity_key("site-1", "person@example.com");
        let b = SignupRequest::identity_key("site-2", "person@example.com");
        assert_ne!(a, b);
    }

    #[test]
    fn new_request_awaits_verification() {
        let req = SignupRequest::new("site-1", "Person@Example.com", None, 48);
        assert_eq!(req.status, SignupStatus::PendingVerification);
        assert_eq!(req.email, "person@example.com");
        assert!(!req.is_expired_at(Utc::now()));
    }
}

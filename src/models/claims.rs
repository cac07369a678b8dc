use serde::{Deserialize, Serialize};

/// Membership role within a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
    Pending,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
            Role::Pending => "pending",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application claims carried inside every session token.
///
/// Immutable once issued: a role promotion or completed credential setup is
/// reflected by issuing a fresh token, never by editing one in flight.
/// Construction goes through [`SessionClaims::new`] plus the chained setters
/// so mandatory and optional fields are explicit at every call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the caller's external identity id.
    pub sub: String,
    /// Site (tenant) the session is scoped to.
    pub site: String,
    pub role: Role,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Caller still has to finish credential setup; the request gate keeps
    /// them on the setup surface until a fresh token clears this.
    #[serde(default)]
    pub needs_setup: bool,
}

impl SessionClaims {
    pub fn new(
        sub: impl Into<String>,
        site: impl Into<String>,
        role: Role,
        email: impl Into<String>,
    ) -> Self {
        Self {
            sub: sub.into(),
            site: site.into(),
            role,
            email: email.into(),
            first_name: None,
            last_name: None,
            needs_setup: false,
        }
    }

    pub fn with_name(mut self, first: Option<String>, last: Option<String>) -> Self {
        self.first_name = first;
        self.last_name = last;
        self
    }

    pub fn with_needs_setup(mut self, needs_setup: bool) -> Self {
        self.needs_setup = needs_setup;
        self
    }
}

/// Full wire payload: registered fields plus the flattened session claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub session: SessionClaims,
    pub iss: String,
    pub aud: String,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

//! Domain records stored in MongoDB plus the session-claims model.

mod claims;
mod invite;
mod member;
mod signup_request;

pub use claims::{Role, SessionClaims, TokenClaims};
pub use invite::{Invite, InviteStatus};
pub use member::Member;
pub use signup_request::{normalize_email, SignupRequest, SignupStatus};

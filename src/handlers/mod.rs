pub mod invite;
pub mod session;

pub mod database;
pub mod invite;
pub mod jwt;
pub mod registry;
pub mod session;

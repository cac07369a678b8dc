pub mod gate;
pub mod guard;
pub mod headers;
pub mod locale;
pub mod trace;

//! RSA key fixtures shared between unit and integration tests.

pub const TEST_PRIVATE_KEY: &str = include_str!("../tests/keys/test_private.pem");
pub const TEST_PUBLIC_KEY: &str = include_str!("../tests/keys/test_public.pem");
/// A second keypair whose signatures must never verify against
/// [`TEST_PUBLIC_KEY`].
pub const WRONG_PRIVATE_KEY: &str = include_str!("../tests/keys/other_private.pem");

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;

use crate::config::JwtConfig;
use crate::models::{SessionClaims, TokenClaims};

/// Default clock-skew tolerance, applied on both the `exp` and `nbf` bounds.
pub const DEFAULT_LEEWAY_SECS: u64 = 5;

/// Verification failures, surfaced as data rather than thrown past the
/// boundary: the gate and guards decide the HTTP-level response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not a three-segment compact JWT")]
    Malformed,
    #[error("signature verification failed")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("token audience mismatch")]
    AudienceMismatch,
    #[error("token issuer mismatch")]
    IssuerMismatch,
}

#[derive(Debug, Default, Clone)]
pub struct SignOptions {
    /// Unix seconds before which the token is not valid.
    pub not_before: Option<i64>,
    pub jti: Option<String>,
}

/// Signs and verifies compact RS256 tokens. Pure over the configured keys:
/// no I/O, no shared state.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    leeway_secs: u64,
}

impl TokenCodec {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        Self::from_pem(
            &config.private_key_pem,
            &config.public_key_pem,
            &config.issuer,
            &config.audience,
        )
        .map(|codec| codec.with_leeway(config.leeway_secs))
    }

    pub fn from_pem(
        private_pem: &str,
        public_pem: &str,
        issuer: &str,
        audience: &str,
    ) -> Result<Self, anyhow::Error> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            leeway_secs: DEFAULT_LEEWAY_SECS,
        })
    }

    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    /// Sign `claims` into a compact token valid for `ttl_seconds`.
    ///
    /// A missing or unparsable private key is a startup configuration error;
    /// by the time requests flow, signing only fails on serialization bugs.
    pub fn sign(
        &self,
        claims: &SessionClaims,
        ttl_seconds: i64,
        opts: SignOptions,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now().timestamp();
        let payload = TokenClaims {
            session: claims.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + ttl_seconds,
            nbf: opts.not_before,
            jti: opts.jti,
        };

        encode(&Header::new(Algorithm::RS256), &payload, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))
    }

    /// Verify a compact token and return its claims.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        if token.split('.').count() != 3 {
            return Err(TokenError::Malformed);
        }

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                ErrorKind::InvalidAudience => TokenError::AudienceMismatch,
                ErrorKind::InvalidIssuer => TokenError::IssuerMismatch,
                _ => TokenError::Malformed,
            })
    }
}

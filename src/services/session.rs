use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::AppError;
use crate::models::{SessionClaims, TokenClaims};
use crate::services::jwt::{SignOptions, TokenCodec, TokenError};
use crate::services::registry::RefreshStore;

/// Refresh verification failures. `Stale` is the rotation signal: the token
/// verified cryptographically but is no longer the registered credential for
/// its subject.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("refresh token has been superseded or revoked")]
    Stale,
    #[error(transparent)]
    Store(#[from] AppError),
}

/// Issues access/refresh token pairs and enforces single-active-refresh
/// rotation through the registry.
#[derive(Clone)]
pub struct SessionService {
    codec: TokenCodec,
    store: Arc<dyn RefreshStore>,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl SessionService {
    pub fn new(codec: TokenCodec, store: Arc<dyn RefreshStore>, jwt: &JwtConfig) -> Self {
        Self {
            codec,
            store,
            access_ttl_secs: jwt.access_ttl_minutes * 60,
            refresh_ttl_secs: jwt.refresh_ttl_days * 24 * 3600,
        }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    pub fn sign_access_token(&self, claims: &SessionClaims) -> Result<String, AppError> {
        self.sign_access_token_with_ttl(claims, self.access_ttl_secs)
    }

    pub fn sign_access_token_with_ttl(
        &self,
        claims: &SessionClaims,
        ttl_secs: i64,
    ) -> Result<String, AppError> {
        self.codec
            .sign(claims, ttl_secs, SignOptions::default())
            .map_err(AppError::Internal)
    }

    /// Issue a refresh token and register its hash as the subject's sole live
    /// credential. Any previously issued refresh token for the subject stops
    /// verifying the moment this returns.
    pub async fn sign_refresh_token(&self, claims: &SessionClaims) -> Result<String, AppError> {
        self.sign_refresh_token_with_ttl(claims, self.refresh_ttl_secs)
            .await
    }

    pub async fn sign_refresh_token_with_ttl(
        &self,
        claims: &SessionClaims,
        ttl_secs: i64,
    ) -> Result<String, AppError> {
        let opts = SignOptions {
            jti: Some(Uuid::new_v4().to_string()),
            ..Default::default()
        };
        let token = self
            .codec
            .sign(claims, ttl_secs, opts)
            .map_err(AppError::Internal)?;

        self.store
            .put(&claims.sub, &hash_token(&token), ttl_secs.max(0) as u64)
            .await?;
        Ok(token)
    }

    /// Verify a presented refresh token: signature and lifetime first, then
    /// the registry hash comparison that makes rotation stick.
    pub async fn verify_refresh_token(&self, token: &str) -> Result<TokenClaims, RefreshError> {
        let claims = self.codec.verify(token)?;

        let registered = self.store.get(&claims.session.sub).await?;
        match registered {
            Some(hash) if hash == hash_token(token) => Ok(claims),
            _ => Err(RefreshError::Stale),
        }
    }

    /// Rotation is "issue a new one", never an in-place mutation.
    pub async fn rotate_refresh_token(&self, claims: &SessionClaims) -> Result<String, AppError> {
        self.sign_refresh_token(claims).await
    }

    /// Drop the subject's registered refresh credential (logout).
    pub async fn revoke_refresh_token(&self, sub: &str) -> Result<(), AppError> {
        self.store.del(sub).await
    }
}

/// Tokens are stored by digest so a registry dump never yields usable
/// credentials.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

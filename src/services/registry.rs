use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::AppError;

fn refresh_key(sub: &str) -> String {
    format!("refresh:{}", sub)
}

/// One live refresh credential per subject.
///
/// `put` overwrites unconditionally, which is what makes rotation work: the
/// instant a new refresh token is stored, every previously issued one stops
/// matching.
#[async_trait]
pub trait RefreshStore: Send + Sync {
    async fn put(&self, sub: &str, token_hash: &str, ttl_secs: u64) -> Result<(), AppError>;
    async fn get(&self, sub: &str) -> Result<Option<String>, AppError>;
    async fn del(&self, sub: &str) -> Result<(), AppError>;
    async fn health_check(&self) -> Result<(), AppError>;
}

/// Redis-backed store. Entries expire with the refresh TTL so a subject who
/// never returns leaves nothing behind.
#[derive(Clone)]
pub struct RedisRefreshStore {
    conn: ConnectionManager,
}

impl RedisRefreshStore {
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl RefreshStore for RedisRefreshStore {
    async fn put(&self, sub: &str, token_hash: &str, ttl_secs: u64) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(refresh_key(sub))
            .arg(token_hash)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, sub: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(refresh_key(sub))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn del(&self, sub: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(refresh_key(sub))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

/// In-memory store for tests and single-process deployments. TTLs are
/// ignored; lifetime enforcement still happens at token verification.
#[derive(Default)]
pub struct MemoryRefreshStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshStore for MemoryRefreshStore {
    async fn put(&self, sub: &str, token_hash: &str, _ttl_secs: u64) -> Result<(), AppError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Registry(anyhow::anyhow!("refresh store lock poisoned")))?;
        entries.insert(sub.to_string(), token_hash.to_string());
        Ok(())
    }

    async fn get(&self, sub: &str) -> Result<Option<String>, AppError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Registry(anyhow::anyhow!("refresh store lock poisoned")))?;
        Ok(entries.get(sub).cloned())
    }

    async fn del(&self, sub: &str) -> Result<(), AppError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Registry(anyhow::anyhow!("refresh store lock poisoned")))?;
        entries.remove(sub);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_overwrites_previous_hash() {
        let store = MemoryRefreshStore::new();
        store.put("uid-1", "hash-a", 60).await.unwrap();
        store.put("uid-1", "hash-b", 60).await.unwrap();
        assert_eq!(store.get("uid-1").await.unwrap().as_deref(), Some("hash-b"));
    }

    #[tokio::test]
    async fn del_clears_entry() {
        let store = MemoryRefreshStore::new();
        store.put("uid-1", "hash-a", 60).await.unwrap();
        store.del("uid-1").await.unwrap();
        assert_eq!(store.get("uid-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn subjects_are_isolated() {
        let store = MemoryRefreshStore::new();
        store.put("uid-1", "hash-a", 60).await.unwrap();
        assert_eq!(store.get("uid-2").await.unwrap(), None);
    }
}

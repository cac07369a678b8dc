use async_trait::async_trait;
use mongodb::{
    bson::doc,
    options::{ClientOptions, IndexOptions},
    Client, Collection, Database, IndexModel,
};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::AppError;
use crate::models::{Invite, Member, SignupRequest};

/// Read access to the member registry, abstracted so route guards and tests
/// do not need a live database.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn find_by_uid(&self, site: &str, uid: &str) -> Result<Option<Member>, AppError>;
    async fn find_by_email(&self, site: &str, email: &str) -> Result<Option<Member>, AppError>;
}

#[derive(Clone)]
pub struct MongoDb {
    client: Client,
    database: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database_name: &str) -> Result<Self, AppError> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some("hearth-auth".to_string());

        let client = Client::with_options(options)?;
        let database = client.database(database_name);

        tracing::info!(database = %database_name, "Connected to MongoDB");
        Ok(Self { client, database })
    }

    /// Create the indexes the authority's invariants lean on. Idempotent;
    /// runs at startup.
    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        // One member per (site, uid). Partial so pre-provisioned members
        // without a uid do not collide on null.
        self.members()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "site": 1, "uid": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .partial_filter_expression(doc! { "uid": { "$exists": true } })
                            .build(),
                    )
                    .build(),
                None,
            )
            .await?;

        // One member per (site, email).
        self.members()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "site": 1, "email": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
                None,
            )
            .await?;

        self.invites()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "site": 1, "status": 1 })
                    .build(),
                None,
            )
            .await?;

        self.signup_requests()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "verification_token": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
                None,
            )
            .await?;

        tracing::info!("MongoDB indexes initialized");
        Ok(())
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn members(&self) -> Collection<Member> {
        self.database.collection("members")
    }

    pub fn invites(&self) -> Collection<Invite> {
        self.database.collection("invites")
    }

    pub fn signup_requests(&self) -> Collection<SignupRequest> {
        self.database.collection("signup_requests")
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}

#[async_trait]
impl MemberDirectory for MongoDb {
    async fn find_by_uid(&self, site: &str, uid: &str) -> Result<Option<Member>, AppError> {
        let member = self
            .members()
            .find_one(doc! { "site": site, "uid": uid }, None)
            .await?;
        Ok(member)
    }

    async fn find_by_email(&self, site: &str, email: &str) -> Result<Option<Member>, AppError> {
        let member = self
            .members()
            .find_one(doc! { "site": site, "email": email }, None)
            .await?;
        Ok(member)
    }
}

/// In-memory directory for tests.
#[derive(Default)]
pub struct MemoryDirectory {
    members: Mutex<HashMap<String, Member>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, member: Member) {
        if let Ok(mut members) = self.members.lock() {
            members.insert(member.id.clone(), member);
        }
    }
}

#[async_trait]
impl MemberDirectory for MemoryDirectory {
    async fn find_by_uid(&self, site: &str, uid: &str) -> Result<Option<Member>, AppError> {
        let members = self
            .members
            .lock()
            .map_err(|_| AppError::Database(anyhow::anyhow!("member directory lock poisoned")))?;
        Ok(members
            .values()
            .find(|m| m.site == site && m.uid.as_deref() == Some(uid))
            .cloned())
    }

    async fn find_by_email(&self, site: &str, email: &str) -> Result<Option<Member>, AppError> {
        let members = self
            .members
            .lock()
            .map_err(|_| AppError::Database(anyhow::anyhow!("member directory lock poisoned")))?;
        Ok(members
            .values()
            .find(|m| m.site == site && m.email == email)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[tokio::test]
    async fn memory_directory_finds_by_uid_and_email() {
        let dir = MemoryDirectory::new();
        dir.insert(Member::new("site-1", "uid-1", "a@example.com", Role::Member));

        assert!(dir.find_by_uid("site-1", "uid-1").await.unwrap().is_some());
        assert!(dir.find_by_uid("site-2", "uid-1").await.unwrap().is_none());
        assert!(dir
            .find_by_email("site-1", "a@example.com")
            .await
            .unwrap()
            .is_some());
    }
}

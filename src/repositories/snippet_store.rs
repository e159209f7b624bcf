use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::domain::{
    Account, AuthSession, Credentials, Registration, ShareRecord, Snippet, SnippetDraft,
    SnippetPatch,
};

/// Row-level access to the `snippets` table, scoped to one owner.
///
/// Methods returning `None`/`false` mean no row is visible to `owner`: either it
/// does not exist or it belongs to another account.
#[async_trait]
pub trait SnippetStore: Send + Sync {
    /// All rows owned by `owner`, most recently created first
    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Snippet>>;

    /// Insert a row; the store assigns id and timestamps
    async fn insert(&self, owner: Uuid, draft: &SnippetDraft) -> Result<Snippet>;

    async fn update(&self, owner: Uuid, id: Uuid, patch: &SnippetPatch) -> Result<Option<Snippet>>;

    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<bool>;

    /// Bump `copy_count` by one and return the new value
    async fn increment_copy_count(&self, owner: Uuid, id: Uuid) -> Result<Option<u64>>;

    /// Check if the store is reachable and properly configured
    async fn health_check(&self) -> Result<()>;
}

/// Service-level access used by the share-link issuer; bypasses row ownership
#[async_trait]
pub trait ShareStore: Send + Sync {
    async fn snippet_owner(&self, snippet_id: Uuid) -> Result<Option<Uuid>>;

    /// Persist a share record; the insert is all-or-nothing
    async fn insert_share(&self, record: &ShareRecord) -> Result<()>;
}

/// The hosted authentication provider
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, registration: &Registration) -> Result<AuthSession>;

    /// `None` when the credentials are rejected
    async fn sign_in(&self, credentials: &Credentials) -> Result<Option<AuthSession>>;

    async fn sign_out(&self, access_token: &str) -> Result<()>;

    /// Resolve a bearer credential to the account it was issued for
    async fn resolve_token(&self, access_token: &str) -> Result<Option<Account>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row-level change notification on the `snippets` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub owner_id: Uuid,
    pub snippet_id: Uuid,
}

/// Realtime change notifications
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to changes of rows owned by `owner`; dropping the receiver unsubscribes
    async fn subscribe(&self, owner: Uuid) -> Result<UnboundedReceiver<ChangeEvent>>;
}

/// Configuration for remote stores
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            timeout_seconds: 10,
        }
    }
}

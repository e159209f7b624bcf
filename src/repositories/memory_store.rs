use std::collections::HashMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{
    Account, AuthSession, Credentials, Registration, ShareRecord, Snippet, SnippetDraft,
    SnippetPatch,
};
use crate::repositories::{
    AuthProvider, ChangeEvent, ChangeFeed, ChangeKind, ShareStore, SnippetStore,
};

struct StoredAccount {
    account: Account,
    salt: String,
    password_digest: String,
}

/// In-process backend implementing every store trait.
///
/// Rows are only visible to their owner, the same way the hosted store's row
/// policies behave. Used when no hosted backend is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    snippets: RwLock<Vec<Snippet>>,
    shares: RwLock<Vec<ShareRecord>>,
    accounts: RwLock<HashMap<Uuid, StoredAccount>>,
    tokens: RwLock<HashMap<String, Uuid>>,
    subscribers: Mutex<Vec<(Uuid, UnboundedSender<ChangeEvent>)>>,
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed row as-is, bypassing id and timestamp assignment
    pub async fn seed(&self, snippet: Snippet) {
        let owner_id = snippet.owner_id;
        let snippet_id = snippet.id;
        self.snippets.write().await.push(snippet);
        self.publish(owner_id, ChangeKind::Insert, snippet_id).await;
    }

    /// Service-level read of a single row, ignoring ownership
    pub async fn snippet(&self, id: Uuid) -> Option<Snippet> {
        self.snippets.read().await.iter().find(|s| s.id == id).cloned()
    }

    pub async fn shares(&self) -> Vec<ShareRecord> {
        self.shares.read().await.clone()
    }

    async fn publish(&self, owner_id: Uuid, kind: ChangeKind, snippet_id: Uuid) {
        let event = ChangeEvent {
            kind,
            owner_id,
            snippet_id,
        };
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|(owner, sender)| {
            if *owner == owner_id {
                sender.send(event.clone()).is_ok()
            } else {
                !sender.is_closed()
            }
        });
        debug!("Published {:?} to {} live subscriptions", event, subscribers.len());
    }

    async fn issue_token(&self, account_id: Uuid) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.write().await.insert(token.clone(), account_id);
        token
    }
}

#[async_trait]
impl SnippetStore for MemoryStore {
    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Snippet>> {
        // Reverse insertion order first so equal timestamps still list newest first
        let mut rows: Vec<Snippet> = self
            .snippets
            .read()
            .await
            .iter()
            .rev()
            .filter(|s| s.owner_id == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    #[instrument(skip(self, draft))]
    async fn insert(&self, owner: Uuid, draft: &SnippetDraft) -> Result<Snippet> {
        let snippet = draft.clone().into_snippet(Uuid::new_v4(), owner, Utc::now());
        self.snippets.write().await.push(snippet.clone());
        self.publish(owner, ChangeKind::Insert, snippet.id).await;
        Ok(snippet)
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, owner: Uuid, id: Uuid, patch: &SnippetPatch) -> Result<Option<Snippet>> {
        let updated = {
            let mut snippets = self.snippets.write().await;
            match snippets
                .iter_mut()
                .find(|s| s.id == id && s.owner_id == owner)
            {
                Some(snippet) => {
                    snippet.apply_patch(patch, Utc::now());
                    Some(snippet.clone())
                }
                None => None,
            }
        };

        if updated.is_some() {
            self.publish(owner, ChangeKind::Update, id).await;
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<bool> {
        let removed = {
            let mut snippets = self.snippets.write().await;
            let before = snippets.len();
            snippets.retain(|s| !(s.id == id && s.owner_id == owner));
            snippets.len() != before
        };

        if removed {
            self.publish(owner, ChangeKind::Delete, id).await;
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn increment_copy_count(&self, owner: Uuid, id: Uuid) -> Result<Option<u64>> {
        let count = {
            let mut snippets = self.snippets.write().await;
            match snippets
                .iter_mut()
                .find(|s| s.id == id && s.owner_id == owner)
            {
                Some(snippet) => {
                    snippet.copy_count += 1;
                    snippet.updated_at = Utc::now().max(snippet.created_at);
                    Some(snippet.copy_count)
                }
                None => None,
            }
        };

        if count.is_some() {
            self.publish(owner, ChangeKind::Update, id).await;
        }
        Ok(count)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ShareStore for MemoryStore {
    async fn snippet_owner(&self, snippet_id: Uuid) -> Result<Option<Uuid>> {
        Ok(self.snippet(snippet_id).await.map(|s| s.owner_id))
    }

    #[instrument(skip(self))]
    async fn insert_share(&self, record: &ShareRecord) -> Result<()> {
        let mut shares = self.shares.write().await;
        if shares.iter().any(|s| s.share_token == record.share_token) {
            bail!("duplicate share token");
        }
        shares.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for MemoryStore {
    #[instrument(skip(self))]
    async fn sign_up(&self, registration: &Registration) -> Result<AuthSession> {
        let account = {
            let mut accounts = self.accounts.write().await;
            if accounts
                .values()
                .any(|a| a.account.email.eq_ignore_ascii_case(&registration.email))
            {
                bail!("an account with this email already exists");
            }

            let account = Account {
                id: Uuid::new_v4(),
                email: registration.email.clone(),
                name: Some(registration.name.clone()),
            };
            let salt = Uuid::new_v4().simple().to_string();
            let password_digest = digest_password(&salt, &registration.password);
            accounts.insert(
                account.id,
                StoredAccount {
                    account: account.clone(),
                    salt,
                    password_digest,
                },
            );
            account
        };

        info!("Registered account {}", account.id);
        let access_token = self.issue_token(account.id).await;
        Ok(AuthSession {
            access_token,
            account,
        })
    }

    #[instrument(skip(self))]
    async fn sign_in(&self, credentials: &Credentials) -> Result<Option<AuthSession>> {
        let account = {
            let accounts = self.accounts.read().await;
            accounts
                .values()
                .find(|a| a.account.email.eq_ignore_ascii_case(&credentials.email))
                .filter(|a| digest_password(&a.salt, &credentials.password) == a.password_digest)
                .map(|a| a.account.clone())
        };

        let Some(account) = account else {
            return Ok(None);
        };

        let access_token = self.issue_token(account.id).await;
        Ok(Some(AuthSession {
            access_token,
            account,
        }))
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        self.tokens.write().await.remove(access_token);
        Ok(())
    }

    async fn resolve_token(&self, access_token: &str) -> Result<Option<Account>> {
        let Some(account_id) = self.tokens.read().await.get(access_token).copied() else {
            return Ok(None);
        };
        Ok(self
            .accounts
            .read()
            .await
            .get(&account_id)
            .map(|a| a.account.clone()))
    }
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn subscribe(&self, owner: Uuid) -> Result<UnboundedReceiver<ChangeEvent>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().await.push((owner, sender));
        debug!("New change subscription for owner {}", owner);
        Ok(receiver)
    }
}

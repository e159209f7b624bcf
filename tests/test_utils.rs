// Test utilities shared by the integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use snipvault::domain::{Account, Language, Registration, Snippet, SnippetDraft, SnippetPatch};
use snipvault::repositories::{AuthProvider, MemoryStore, SnippetStore};
use uuid::Uuid;

/// Register an account on `store` and return its access token and account
pub async fn register(store: &MemoryStore, email: &str) -> (String, Account) {
    let session = store
        .sign_up(&Registration {
            name: "Test User".to_string(),
            email: email.to_string(),
            password: "Sup3r$ecret".to_string(),
        })
        .await
        .expect("register test account");
    (session.access_token, session.account)
}

/// Snippet store that fails every call while `failing` is set
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("network unreachable");
        }
        Ok(())
    }
}

#[async_trait]
impl SnippetStore for FlakyStore {
    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Snippet>> {
        self.check()?;
        self.inner.list_for_owner(owner).await
    }

    async fn insert(&self, owner: Uuid, draft: &SnippetDraft) -> Result<Snippet> {
        self.check()?;
        self.inner.insert(owner, draft).await
    }

    async fn update(&self, owner: Uuid, id: Uuid, patch: &SnippetPatch) -> Result<Option<Snippet>> {
        self.check()?;
        self.inner.update(owner, id, patch).await
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<bool> {
        self.check()?;
        self.inner.delete(owner, id).await
    }

    async fn increment_copy_count(&self, owner: Uuid, id: Uuid) -> Result<Option<u64>> {
        self.check()?;
        self.inner.increment_copy_count(owner, id).await
    }

    async fn health_check(&self) -> Result<()> {
        self.check()
    }
}

/// Test data builder for snippets
pub struct SnippetBuilder {
    snippet: Snippet,
}

impl Default for SnippetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnippetBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            snippet: Snippet {
                id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                title: "Test Snippet".to_string(),
                description: "Test description".to_string(),
                code: "echo test".to_string(),
                language: Language::Bash,
                tags: vec!["test".to_string()],
                is_favorite: false,
                copy_count: 0,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_owner(mut self, owner: Uuid) -> Self {
        self.snippet.owner_id = owner;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.snippet.title = title.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.snippet.description = description.to_string();
        self
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.snippet.code = code.to_string();
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.snippet.language = language;
        self
    }

    pub fn with_tags(mut self, tags: Vec<&str>) -> Self {
        self.snippet.tags = tags.into_iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn favorite(mut self) -> Self {
        self.snippet.is_favorite = true;
        self
    }

    /// Shift creation time back, e.g. to control list ordering
    pub fn created_minutes_ago(mut self, minutes: i64) -> Self {
        let at: DateTime<Utc> = Utc::now() - Duration::minutes(minutes);
        self.snippet.created_at = at;
        self.snippet.updated_at = at;
        self
    }

    pub fn build(self) -> Snippet {
        self.snippet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_builder() {
        let owner = Uuid::new_v4();
        let snippet = SnippetBuilder::new()
            .with_owner(owner)
            .with_title("Test Function")
            .with_code("fn test() {}")
            .with_language(Language::Rust)
            .favorite()
            .build();

        assert_eq!(snippet.owner_id, owner);
        assert_eq!(snippet.title, "Test Function");
        assert_eq!(snippet.code, "fn test() {}");
        assert_eq!(snippet.language, Language::Rust);
        assert!(snippet.is_favorite);
        assert!(snippet.updated_at >= snippet.created_at);
    }
}

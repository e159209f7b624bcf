use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Snippet, SnippetDraft, SnippetPatch};
use crate::repositories::{MemoryStore, SnippetStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    List,
    Insert,
    Update,
    Delete,
    IncrementCopyCount,
}

/// Mock store for testing: a `MemoryStore` with switchable failures and a call counter
#[derive(Default)]
pub struct MockSnippetStore {
    pub inner: MemoryStore,
    fail_list: AtomicBool,
    fail_insert: AtomicBool,
    fail_update: AtomicBool,
    fail_delete: AtomicBool,
    fail_increment: AtomicBool,
    calls: AtomicUsize,
}

impl MockSnippetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_snippets(self, snippets: Vec<Snippet>) -> Self {
        for snippet in snippets {
            self.inner.seed(snippet).await;
        }
        self
    }

    pub fn failing_on(self, operation: StoreOperation) -> Self {
        self.set_failing(operation, true);
        self
    }

    pub fn set_failing(&self, operation: StoreOperation, failing: bool) {
        self.flag(operation).store(failing, Ordering::SeqCst);
    }

    /// Number of store calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn flag(&self, operation: StoreOperation) -> &AtomicBool {
        match operation {
            StoreOperation::List => &self.fail_list,
            StoreOperation::Insert => &self.fail_insert,
            StoreOperation::Update => &self.fail_update,
            StoreOperation::Delete => &self.fail_delete,
            StoreOperation::IncrementCopyCount => &self.fail_increment,
        }
    }

    fn check(&self, operation: StoreOperation) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.flag(operation).load(Ordering::SeqCst) {
            return Err(anyhow!("simulated {:?} failure", operation));
        }
        Ok(())
    }
}

#[async_trait]
impl SnippetStore for MockSnippetStore {
    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Snippet>> {
        self.check(StoreOperation::List)?;
        self.inner.list_for_owner(owner).await
    }

    async fn insert(&self, owner: Uuid, draft: &SnippetDraft) -> Result<Snippet> {
        self.check(StoreOperation::Insert)?;
        self.inner.insert(owner, draft).await
    }

    async fn update(&self, owner: Uuid, id: Uuid, patch: &SnippetPatch) -> Result<Option<Snippet>> {
        self.check(StoreOperation::Update)?;
        self.inner.update(owner, id, patch).await
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<bool> {
        self.check(StoreOperation::Delete)?;
        self.inner.delete(owner, id).await
    }

    async fn increment_copy_count(&self, owner: Uuid, id: Uuid) -> Result<Option<u64>> {
        self.check(StoreOperation::IncrementCopyCount)?;
        self.inner.increment_copy_count(owner, id).await
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Language;

    fn draft() -> SnippetDraft {
        SnippetDraft {
            title: "Counter".to_string(),
            description: String::new(),
            code: "let mut n = 0;".to_string(),
            language: Language::Rust,
            tags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn given_failing_insert_when_inserting_then_returns_error_and_counts_call() {
        // Arrange
        let store = MockSnippetStore::new().failing_on(StoreOperation::Insert);

        // Act
        let result = store.insert(Uuid::new_v4(), &draft()).await;

        // Assert
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Insert"));
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn given_failure_switched_off_when_inserting_then_delegates_to_inner_store() {
        // Arrange
        let store = MockSnippetStore::new().failing_on(StoreOperation::Insert);
        store.set_failing(StoreOperation::Insert, false);
        let owner = Uuid::new_v4();

        // Act
        let snippet = store.insert(owner, &draft()).await.expect("insert succeeds");

        // Assert
        assert_eq!(snippet.owner_id, owner);
        assert_eq!(store.list_for_owner(owner).await.expect("list").len(), 1);
    }
}

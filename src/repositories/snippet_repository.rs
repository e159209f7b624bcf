use std::sync::Arc;

use anyhow::Context;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Account, Language, SearchFilter, Snippet, SnippetForm, SnippetPatch};
use crate::error::SnippetError;
use crate::repositories::SnippetStore;
use crate::services::{LibraryStats, SearchEngine, Validator};

#[derive(Default)]
struct CacheState {
    account: Option<Account>,
    snippets: Vec<Snippet>,
    /// Bumped on every attach/detach so late results from an old session are dropped
    generation: u64,
}

/// Owns the signed-in account's snippets for the running session.
///
/// This is the only component that issues mutations against the store. The
/// local cache only changes after the store confirms a write; failed calls
/// leave it untouched.
pub struct SnippetRepository {
    store: Arc<dyn SnippetStore>,
    state: RwLock<CacheState>,
}

impl std::fmt::Debug for SnippetRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnippetRepository")
            .field("store", &"<SnippetStore>")
            .finish()
    }
}

fn remote_failure(e: anyhow::Error) -> SnippetError {
    error!("Remote store call failed: {:#}", e);
    SnippetError::Remote(e)
}

impl SnippetRepository {
    pub fn new(store: Arc<dyn SnippetStore>) -> Self {
        Self {
            store,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Start a session for `account` with an empty cache
    pub async fn attach(&self, account: Account) {
        let mut state = self.state.write().await;
        info!("Attaching snippet cache to account {}", account.id);
        state.account = Some(account);
        state.snippets.clear();
        state.generation += 1;
    }

    /// End the session and discard the cache
    pub async fn detach(&self) {
        let mut state = self.state.write().await;
        if let Some(account) = state.account.take() {
            info!("Discarding snippet cache of account {}", account.id);
        }
        state.snippets.clear();
        state.generation += 1;
    }

    pub async fn account(&self) -> Option<Account> {
        self.state.read().await.account.clone()
    }

    async fn owner(&self) -> Result<(Uuid, u64), SnippetError> {
        let state = self.state.read().await;
        state
            .account
            .as_ref()
            .map(|account| (account.id, state.generation))
            .ok_or(SnippetError::NotSignedIn)
    }

    /// Cached snippets, most recently created first
    pub async fn list(&self) -> Vec<Snippet> {
        self.state.read().await.snippets.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<Snippet> {
        self.state
            .read()
            .await
            .snippets
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    /// Replace the whole cache with the account's rows from the store
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<usize, SnippetError> {
        let (owner, generation) = self.owner().await?;

        let mut rows = self
            .store
            .list_for_owner(owner)
            .await
            .context("fetch snippets from store")
            .map_err(remote_failure)?;
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!("Session changed during refresh, discarding {} rows", rows.len());
            return Ok(state.snippets.len());
        }
        state.snippets = rows;

        debug!("Refreshed cache with {} snippets", state.snippets.len());
        Ok(state.snippets.len())
    }

    #[instrument(skip(self, form))]
    pub async fn create(&self, form: &SnippetForm) -> Result<Snippet, SnippetError> {
        let (owner, generation) = self.owner().await?;
        let draft = Validator::snippet(form)?;

        let snippet = self
            .store
            .insert(owner, &draft)
            .await
            .context("insert snippet")
            .map_err(remote_failure)?;

        let mut state = self.state.write().await;
        if state.generation == generation {
            // A racing refresh may already have brought the row in
            state.snippets.retain(|s| s.id != snippet.id);
            state.snippets.insert(0, snippet.clone());
        }

        info!("Created snippet {}", snippet.id);
        Ok(snippet)
    }

    /// Send the changed fields and merge the authoritative row into the cache
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: &SnippetPatch) -> Result<Snippet, SnippetError> {
        let (owner, generation) = self.owner().await?;
        let patch = Validator::patch(patch)?;

        if patch.is_empty() {
            return self.get(id).await.ok_or(SnippetError::NotFound(id));
        }

        let snippet = self
            .store
            .update(owner, id, &patch)
            .await
            .context("update snippet")
            .map_err(remote_failure)?
            .ok_or(SnippetError::NotFound(id))?;

        self.merge(generation, snippet.clone()).await;
        debug!("Updated snippet {}", id);
        Ok(snippet)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), SnippetError> {
        let (owner, generation) = self.owner().await?;

        let removed = self
            .store
            .delete(owner, id)
            .await
            .context("delete snippet")
            .map_err(remote_failure)?;
        if !removed {
            return Err(SnippetError::NotFound(id));
        }

        let mut state = self.state.write().await;
        if state.generation == generation {
            state.snippets.retain(|s| s.id != id);
        }

        info!("Deleted snippet {}", id);
        Ok(())
    }

    /// Flip the favorite flag based on the cached value
    #[instrument(skip(self))]
    pub async fn toggle_favorite(&self, id: Uuid) -> Result<Snippet, SnippetError> {
        self.owner().await?;
        let current = self.get(id).await.ok_or(SnippetError::NotFound(id))?;

        self.update(id, &SnippetPatch::favorite(!current.is_favorite))
            .await
    }

    /// Best-effort counter bump; failures are logged and never reported
    #[instrument(skip(self))]
    pub async fn increment_copy_count(&self, id: Uuid) {
        let Ok((owner, generation)) = self.owner().await else {
            debug!("Not signed in, skipping copy count");
            return;
        };

        match self.store.increment_copy_count(owner, id).await {
            Ok(Some(count)) => {
                let mut state = self.state.write().await;
                if state.generation != generation {
                    return;
                }
                if let Some(snippet) = state.snippets.iter_mut().find(|s| s.id == id) {
                    snippet.copy_count = count;
                }
            }
            Ok(None) => warn!("Snippet {} not found while recording a copy", id),
            Err(e) => warn!("Failed to record copy of snippet {}: {:#}", id, e),
        }
    }

    async fn merge(&self, generation: u64, snippet: Snippet) {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return;
        }
        if let Some(existing) = state.snippets.iter_mut().find(|s| s.id == snippet.id) {
            *existing = snippet;
        }
    }

    pub async fn search(&self, filter: &SearchFilter) -> Vec<Snippet> {
        let state = self.state.read().await;
        SearchEngine::search(&state.snippets, filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn all_tags(&self) -> Vec<String> {
        SearchEngine::all_tags(&self.state.read().await.snippets)
    }

    pub async fn stats(&self) -> LibraryStats {
        SearchEngine::stats(&self.state.read().await.snippets)
    }

    pub fn languages(&self) -> &'static [Language] {
        &Language::ALL
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::repositories::{ChangeFeed, SnippetRepository};

/// Keeps the repository in step with remote changes by reloading it on every notification
pub struct RealtimeSync;

/// A running subscription; stopping or dropping it ends the listener task
pub struct SyncHandle {
    owner: Uuid,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeSync {
    /// Subscribe to `owner`'s rows and refresh `repository` on each change
    pub async fn start(
        feed: Arc<dyn ChangeFeed>,
        repository: Arc<SnippetRepository>,
        owner: Uuid,
    ) -> Result<SyncHandle> {
        let mut events = feed
            .subscribe(owner)
            .await
            .context("subscribe to snippet changes")?;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            info!("Realtime sync started for account {}", owner);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => {
                        debug!("Realtime sync shutdown requested");
                        break;
                    }
                    event = events.recv() => {
                        let Some(event) = event else {
                            info!("Change feed closed, stopping realtime sync");
                            break;
                        };
                        debug!("Received {:?}", event);

                        // Collapse a burst into a single reload
                        let mut skipped = 0;
                        while events.try_recv().is_ok() {
                            skipped += 1;
                        }
                        if skipped > 0 {
                            debug!("Coalesced {} queued change events", skipped);
                        }

                        if let Err(e) = repository.refresh().await {
                            warn!("Refresh after change notification failed: {}", e);
                        }
                    }
                }
            }
            info!("Realtime sync stopped for account {}", owner);
        });

        Ok(SyncHandle {
            owner,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

impl SyncHandle {
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the listener and wait until it has processed its last notification
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Realtime sync task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, Language, SnippetDraft};
    use crate::repositories::{MemoryStore, SnippetStore};
    use std::time::Duration;

    fn draft(title: &str) -> SnippetDraft {
        SnippetDraft {
            title: title.to_string(),
            description: String::new(),
            code: "fn main() {}".to_string(),
            language: Language::Rust,
            tags: Vec::new(),
        }
    }

    async fn wait_for_len(repository: &SnippetRepository, expected: usize) -> bool {
        for _ in 0..100 {
            if repository.list().await.len() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn given_running_sync_when_row_changes_elsewhere_then_cache_is_refreshed() {
        // Arrange
        let store = Arc::new(MemoryStore::new());
        let repository = Arc::new(SnippetRepository::new(store.clone()));
        let account = Account {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            name: None,
        };
        repository.attach(account.clone()).await;
        let handle = RealtimeSync::start(store.clone(), repository.clone(), account.id)
            .await
            .expect("start sync");

        // Act
        store.insert(account.id, &draft("other tab")).await.expect("remote insert");

        // Assert
        assert!(wait_for_len(&repository, 1).await);
        assert!(handle.is_running());
        handle.stop().await;
    }

    #[tokio::test]
    async fn given_stopped_sync_when_row_changes_then_cache_is_not_refreshed() {
        // Arrange
        let store = Arc::new(MemoryStore::new());
        let repository = Arc::new(SnippetRepository::new(store.clone()));
        let owner = Uuid::new_v4();
        repository
            .attach(Account {
                id: owner,
                email: "ada@example.com".to_string(),
                name: None,
            })
            .await;
        let handle = RealtimeSync::start(store.clone(), repository.clone(), owner)
            .await
            .expect("start sync");

        // Act
        handle.stop().await;
        store.insert(owner, &draft("after teardown")).await.expect("remote insert");
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Assert
        assert!(repository.list().await.is_empty());
    }
}

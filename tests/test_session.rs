// Sign-in lifecycle, realtime sync between sessions and the copy action

use std::sync::Arc;
use std::time::Duration;

use snipvault::SnippetError;
use snipvault::domain::{LoginForm, RegistrationForm, SnippetForm};
use snipvault::repositories::{MemoryStore, SnippetRepository};
use snipvault::services::{ClipboardService, MemoryClipboard, SessionManager};

fn device(store: &Arc<MemoryStore>) -> SessionManager {
    let repository = Arc::new(SnippetRepository::new(store.clone()));
    SessionManager::new(store.clone(), repository, Some(store.clone()))
}

fn login() -> LoginForm {
    LoginForm {
        email: "ada@example.com".to_string(),
        password: "Sup3r$ecret".to_string(),
    }
}

async fn registered_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let sessions = device(&store);
    sessions
        .sign_up(&RegistrationForm {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "Sup3r$ecret".to_string(),
            confirm_password: "Sup3r$ecret".to_string(),
        })
        .await
        .expect("sign up");
    sessions.sign_out().await;
    store
}

fn form(title: &str) -> SnippetForm {
    SnippetForm {
        title: title.to_string(),
        description: String::new(),
        code: "git log --oneline".to_string(),
        language: "bash".to_string(),
        tags: vec!["git".to_string()],
    }
}

/// Poll until `check` holds or give up after about a second
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[test_log::test(tokio::test)]
async fn test_change_on_one_device_reaches_the_other() {
    let store = registered_store().await;
    let laptop = device(&store);
    let phone = device(&store);
    laptop.sign_in(&login()).await.expect("laptop sign in");
    phone.sign_in(&login()).await.expect("phone sign in");

    let created = laptop
        .repository()
        .create(&form("Compact log"))
        .await
        .expect("create on laptop");

    let phone_repository = phone.repository();
    assert!(
        eventually(|| {
            let repository = phone_repository.clone();
            async move { repository.get(created.id).await.is_some() }
        })
        .await
    );

    laptop.repository().delete(created.id).await.expect("delete on laptop");
    assert!(
        eventually(|| {
            let repository = phone_repository.clone();
            async move { repository.list().await.is_empty() }
        })
        .await
    );
}

#[test_log::test(tokio::test)]
async fn test_sign_out_stops_sync_and_clears_cache() {
    let store = registered_store().await;
    let laptop = device(&store);
    let phone = device(&store);
    laptop.sign_in(&login()).await.expect("laptop sign in");
    phone.sign_in(&login()).await.expect("phone sign in");
    let mut auth_changes = phone.on_auth_state_change();

    phone.sign_out().await;
    laptop
        .repository()
        .create(&form("After phone sign-out"))
        .await
        .expect("create on laptop");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(auth_changes.has_changed().expect("sender alive"));
    assert!(auth_changes.borrow_and_update().is_none());
    assert!(phone.current_user().is_none());
    assert!(phone.repository().list().await.is_empty());
    assert!(matches!(
        phone.repository().create(&form("offline")).await,
        Err(SnippetError::NotSignedIn)
    ));
}

#[test_log::test(tokio::test)]
async fn test_copy_puts_code_on_clipboard_and_counts_usage() {
    let store = registered_store().await;
    let laptop = device(&store);
    laptop.sign_in(&login()).await.expect("sign in");
    let snippet = laptop
        .repository()
        .create(&form("Compact log"))
        .await
        .expect("create");
    let clipboard = Arc::new(MemoryClipboard::new());
    let copier = ClipboardService::new(clipboard.clone(), laptop.repository());

    copier.copy_snippet(snippet.id).await.expect("first copy");
    copier.copy_snippet(snippet.id).await.expect("second copy");

    assert_eq!(clipboard.contents().await.as_deref(), Some("git log --oneline"));
    assert_eq!(store.snippet(snippet.id).await.expect("stored").copy_count, 2);
    assert_eq!(
        laptop.repository().get(snippet.id).await.expect("cached").copy_count,
        2
    );
}

#[test_log::test(tokio::test)]
async fn test_invalid_login_is_reported_without_session() {
    let store = registered_store().await;
    let laptop = device(&store);

    let malformed = laptop
        .sign_in(&LoginForm {
            email: "not-an-email".to_string(),
            password: String::new(),
        })
        .await;
    let rejected = laptop
        .sign_in(&LoginForm {
            email: "ada@example.com".to_string(),
            password: "Wrong$ecret1".to_string(),
        })
        .await;

    match malformed {
        Err(SnippetError::Validation(errors)) => {
            assert!(errors.has_field("email"));
            assert!(errors.has_field("password"));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
    assert!(matches!(rejected, Err(SnippetError::InvalidCredentials)));
    assert!(laptop.current_user().is_none());
}

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{Account, AuthSession, LoginForm, RegistrationForm};
use crate::error::SnippetError;
use crate::repositories::{AuthProvider, ChangeFeed, SnippetRepository};
use crate::services::{RealtimeSync, SyncHandle, Validator};

#[derive(Default)]
struct SessionState {
    session: Option<AuthSession>,
    sync: Option<SyncHandle>,
}

/// Drives the sign-in lifecycle: the repository is attached and the realtime
/// listener started on sign-in, both torn down again on sign-out.
pub struct SessionManager {
    auth: Arc<dyn AuthProvider>,
    repository: Arc<SnippetRepository>,
    feed: Option<Arc<dyn ChangeFeed>>,
    state: Mutex<SessionState>,
    auth_tx: watch::Sender<Option<Account>>,
}

impl SessionManager {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        repository: Arc<SnippetRepository>,
        feed: Option<Arc<dyn ChangeFeed>>,
    ) -> Self {
        let (auth_tx, _) = watch::channel(None);
        Self {
            auth,
            repository,
            feed,
            state: Mutex::new(SessionState::default()),
            auth_tx,
        }
    }

    pub fn repository(&self) -> Arc<SnippetRepository> {
        self.repository.clone()
    }

    pub fn current_user(&self) -> Option<Account> {
        self.auth_tx.borrow().clone()
    }

    /// Receiver that observes every sign-in and sign-out
    pub fn on_auth_state_change(&self) -> watch::Receiver<Option<Account>> {
        self.auth_tx.subscribe()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub async fn is_syncing(&self) -> bool {
        self.state
            .lock()
            .await
            .sync
            .as_ref()
            .is_some_and(SyncHandle::is_running)
    }

    #[instrument(skip(self, form))]
    pub async fn sign_up(&self, form: &RegistrationForm) -> Result<Account, SnippetError> {
        let registration = Validator::registration(form)?;

        let session = self
            .auth
            .sign_up(&registration)
            .await
            .context("register account")
            .map_err(|e| {
                error!("Sign-up failed: {:#}", e);
                SnippetError::Remote(e)
            })?;

        info!("Account {} registered", session.account.id);
        Ok(self.establish(session).await)
    }

    #[instrument(skip(self, form))]
    pub async fn sign_in(&self, form: &LoginForm) -> Result<Account, SnippetError> {
        let credentials = Validator::login(form)?;

        let session = self
            .auth
            .sign_in(&credentials)
            .await
            .context("sign in")
            .map_err(|e| {
                error!("Sign-in failed: {:#}", e);
                SnippetError::Remote(e)
            })?
            .ok_or(SnippetError::InvalidCredentials)?;

        info!("Account {} signed in", session.account.id);
        Ok(self.establish(session).await)
    }

    /// Stop the listener, discard the cache and revoke the credential
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        let mut state = self.state.lock().await;
        let Some(session) = state.session.take() else {
            debug!("Sign-out requested without an active session");
            return;
        };

        if let Some(sync) = state.sync.take() {
            sync.stop().await;
        }
        self.repository.detach().await;

        if let Err(e) = self.auth.sign_out(&session.access_token).await {
            warn!("Failed to revoke session of {}: {:#}", session.account.id, e);
        }

        self.auth_tx.send_replace(None);
        info!("Account {} signed out", session.account.id);
    }

    async fn establish(&self, session: AuthSession) -> Account {
        let mut state = self.state.lock().await;
        if let Some(sync) = state.sync.take() {
            sync.stop().await;
        }

        let account = session.account.clone();
        self.repository.attach(account.clone()).await;

        // Subscribe before the first load so no change falls between the two
        if let Some(feed) = &self.feed {
            match RealtimeSync::start(feed.clone(), self.repository.clone(), account.id).await {
                Ok(sync) => state.sync = Some(sync),
                Err(e) => warn!("Realtime sync unavailable: {:#}", e),
            }
        }
        if let Err(e) = self.repository.refresh().await {
            warn!("Initial snippet load failed: {}", e);
        }

        state.session = Some(session);
        self.auth_tx.send_replace(Some(account.clone()));
        account
    }
}

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::domain::{
    Account, AuthSession, Credentials, Registration, ShareRecord, Snippet, SnippetDraft,
    SnippetPatch,
};
use crate::repositories::{
    AuthProvider, ChangeEvent, ChangeFeed, ShareStore, SnippetStore, StoreConfig, realtime,
};

const SNIPPETS_TABLE: &str = "snippets";
const SHARES_TABLE: &str = "snippet_shares";

/// Store implementation that talks to a hosted PostgREST/GoTrue backend over HTTP,
/// with change notifications from its realtime websocket.
///
/// Like the hosted client library, it remembers the access token of the
/// signed-in session and uses it for row-level requests and realtime channels
/// so the backend's ownership policies apply. Share-store requests always use
/// the API key.
pub struct RestStore {
    config: StoreConfig,
    client: reqwest::Client,
    session_token: RwLock<Option<String>>,
}

#[derive(Serialize)]
struct InsertRow<'a> {
    user_id: Uuid,
    #[serde(flatten)]
    draft: &'a SnippetDraft,
}

#[derive(Deserialize)]
struct OwnerRow {
    user_id: Uuid,
}

#[derive(Deserialize)]
struct CopyCountRow {
    copy_count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

impl From<AuthUser> for Account {
    fn from(user: AuthUser) -> Self {
        Self {
            id: user.id,
            email: user.email.unwrap_or_default(),
            name: user.user_metadata.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

impl RestStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            config,
            client,
            session_token: RwLock::new(None),
        })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url(), table)
    }

    fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url(), endpoint)
    }

    /// PostgREST filters selecting one owner's rows, optionally a single row
    fn row_filter(owner: Uuid, id: Option<Uuid>) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(id) = id {
            query.push(("id", format!("eq.{}", id)));
        }
        query.push(("user_id", format!("eq.{}", owner)));
        query
    }

    async fn user_bearer(&self) -> String {
        self.session_token
            .read()
            .await
            .clone()
            .unwrap_or_else(|| self.config.api_key.clone())
    }

    fn request(&self, method: Method, url: &str, bearer: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(bearer)
    }

    /// Send a request and parse a JSON body, failing on non-success statuses
    #[instrument(skip(self, builder))]
    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("send {} request", what))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("read {} response body", what))?;

        if !status.is_success() {
            error!("{} failed with status {}: {}", what, status, body);
            return Err(anyhow!("{} failed with status {}: {}", what, status, body));
        }

        serde_json::from_str(&body).with_context(|| format!("parse {} response", what))
    }

    async fn send_empty(&self, builder: RequestBuilder, what: &str) -> Result<()> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("send {} request", what))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("{} failed with status {}: {}", what, status, body);
            bail!("{} failed with status {}: {}", what, status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl SnippetStore for RestStore {
    #[instrument(skip(self))]
    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Snippet>> {
        let bearer = self.user_bearer().await;
        let mut query = vec![("select", "*".to_string())];
        query.extend(Self::row_filter(owner, None));
        query.push(("order", "created_at.desc".to_string()));

        let snippets: Vec<Snippet> = self
            .send_json(
                self.request(Method::GET, &self.table_url(SNIPPETS_TABLE), &bearer)
                    .query(&query),
                "list snippets",
            )
            .await?;

        info!("Fetched {} snippets", snippets.len());
        Ok(snippets)
    }

    #[instrument(skip(self, draft))]
    async fn insert(&self, owner: Uuid, draft: &SnippetDraft) -> Result<Snippet> {
        let bearer = self.user_bearer().await;
        let row = InsertRow {
            user_id: owner,
            draft,
        };

        let rows: Vec<Snippet> = self
            .send_json(
                self.request(Method::POST, &self.table_url(SNIPPETS_TABLE), &bearer)
                    .header("Prefer", "return=representation")
                    .json(&row),
                "insert snippet",
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| anyhow!("insert returned no row"))
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, owner: Uuid, id: Uuid, patch: &SnippetPatch) -> Result<Option<Snippet>> {
        let bearer = self.user_bearer().await;
        let rows: Vec<Snippet> = self
            .send_json(
                self.request(Method::PATCH, &self.table_url(SNIPPETS_TABLE), &bearer)
                    .query(&Self::row_filter(owner, Some(id)))
                    .header("Prefer", "return=representation")
                    .json(patch),
                "update snippet",
            )
            .await?;

        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<bool> {
        let bearer = self.user_bearer().await;
        let rows: Vec<serde_json::Value> = self
            .send_json(
                self.request(Method::DELETE, &self.table_url(SNIPPETS_TABLE), &bearer)
                    .query(&Self::row_filter(owner, Some(id)))
                    .header("Prefer", "return=representation"),
                "delete snippet",
            )
            .await?;

        Ok(!rows.is_empty())
    }

    /// Read-modify-write: two sessions copying at the same instant can lose one increment
    #[instrument(skip(self))]
    async fn increment_copy_count(&self, owner: Uuid, id: Uuid) -> Result<Option<u64>> {
        let bearer = self.user_bearer().await;
        let mut query = vec![("select", "copy_count".to_string())];
        query.extend(Self::row_filter(owner, Some(id)));

        let current: Vec<CopyCountRow> = self
            .send_json(
                self.request(Method::GET, &self.table_url(SNIPPETS_TABLE), &bearer)
                    .query(&query),
                "read copy count",
            )
            .await?;

        let Some(current) = current.into_iter().next() else {
            return Ok(None);
        };

        let updated: Vec<CopyCountRow> = self
            .send_json(
                self.request(Method::PATCH, &self.table_url(SNIPPETS_TABLE), &bearer)
                    .query(&Self::row_filter(owner, Some(id)))
                    .header("Prefer", "return=representation")
                    .json(&serde_json::json!({ "copy_count": current.copy_count + 1 })),
                "increment copy count",
            )
            .await?;

        Ok(updated.into_iter().next().map(|row| row.copy_count))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<()> {
        debug!("Verifying backend availability at {}", self.base_url());

        self.send_empty(
            self.request(
                Method::GET,
                &format!("{}/rest/v1/", self.base_url()),
                &self.config.api_key,
            ),
            "health check",
        )
        .await
        .context("verify backend availability")?;

        info!("Backend verified successfully");
        Ok(())
    }
}

#[async_trait]
impl ShareStore for RestStore {
    #[instrument(skip(self))]
    async fn snippet_owner(&self, snippet_id: Uuid) -> Result<Option<Uuid>> {
        let rows: Vec<OwnerRow> = self
            .send_json(
                self.request(
                    Method::GET,
                    &self.table_url(SNIPPETS_TABLE),
                    &self.config.api_key,
                )
                .query(&[
                    ("select", "user_id".to_string()),
                    ("id", format!("eq.{}", snippet_id)),
                ]),
                "look up snippet owner",
            )
            .await?;

        Ok(rows.into_iter().next().map(|row| row.user_id))
    }

    #[instrument(skip(self))]
    async fn insert_share(&self, record: &ShareRecord) -> Result<()> {
        self.send_empty(
            self.request(Method::POST, &self.table_url(SHARES_TABLE), &self.config.api_key)
                .header("Prefer", "return=minimal")
                .json(record),
            "insert share record",
        )
        .await
    }
}

#[async_trait]
impl AuthProvider for RestStore {
    #[instrument(skip(self))]
    async fn sign_up(&self, registration: &Registration) -> Result<AuthSession> {
        let body = serde_json::json!({
            "email": registration.email,
            "password": registration.password,
            "data": { "name": registration.name },
        });

        let response: serde_json::Value = self
            .send_json(
                self.request(Method::POST, &self.auth_url("signup"), &self.config.api_key)
                    .json(&body),
                "sign up",
            )
            .await?;

        // Without an access token the backend is waiting for email confirmation
        if response.get("access_token").is_none() {
            bail!("confirm your email address, then sign in");
        }

        let token: TokenResponse =
            serde_json::from_value(response).context("parse sign-up session")?;
        *self.session_token.write().await = Some(token.access_token.clone());

        Ok(AuthSession {
            access_token: token.access_token,
            account: token.user.into(),
        })
    }

    #[instrument(skip(self))]
    async fn sign_in(&self, credentials: &Credentials) -> Result<Option<AuthSession>> {
        let response = self
            .request(
                Method::POST,
                &self.auth_url("token"),
                &self.config.api_key,
            )
            .query(&[("grant_type", "password")])
            .json(credentials)
            .send()
            .await
            .context("send sign in request")?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            debug!("Sign in rejected with status {}", status);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("sign in failed with status {}: {}", status, body);
        }

        let token: TokenResponse = response.json().await.context("parse sign in response")?;
        *self.session_token.write().await = Some(token.access_token.clone());

        Ok(Some(AuthSession {
            access_token: token.access_token,
            account: token.user.into(),
        }))
    }

    #[instrument(skip(self, access_token))]
    async fn sign_out(&self, access_token: &str) -> Result<()> {
        *self.session_token.write().await = None;

        self.send_empty(
            self.request(Method::POST, &self.auth_url("logout"), access_token),
            "sign out",
        )
        .await
    }

    #[instrument(skip(self, access_token))]
    async fn resolve_token(&self, access_token: &str) -> Result<Option<Account>> {
        let response = self
            .request(Method::GET, &self.auth_url("user"), access_token)
            .send()
            .await
            .context("send user lookup request")?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            bail!("user lookup failed with status {}", status);
        }

        let user: AuthUser = response.json().await.context("parse user lookup response")?;
        Ok(Some(user.into()))
    }
}

#[async_trait]
impl ChangeFeed for RestStore {
    #[instrument(skip(self))]
    async fn subscribe(&self, owner: Uuid) -> Result<UnboundedReceiver<ChangeEvent>> {
        let bearer = self.user_bearer().await;
        realtime::subscribe(
            self.base_url(),
            &self.config.api_key,
            &bearer,
            owner,
            Duration::from_secs(self.config.timeout_seconds),
        )
        .await
        .context("subscribe to realtime snippet changes")
    }
}

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{ShareLink, ShareRecord, ShareRequest};
use crate::repositories::{AuthProvider, ShareStore};

pub const MIN_EXPIRY_DAYS: u64 = 1;
pub const MAX_EXPIRY_DAYS: u64 = 365;

lazy_static! {
    static ref SNIPPET_ID: Regex = Regex::new(
        r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$"
    )
    .expect("compile snippet id regex");
}

/// Failures of the share-link endpoint, one per HTTP status
#[derive(Error, Debug)]
pub enum ShareError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: You do not own this snippet")]
    Forbidden,

    #[error("Snippet not found")]
    NotFound,

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ShareError {
    pub fn status_code(&self) -> u16 {
        match self {
            ShareError::BadRequest(_) => 400,
            ShareError::Unauthorized => 401,
            ShareError::Forbidden => 403,
            ShareError::NotFound => 404,
            ShareError::Internal(_) => 500,
        }
    }
}

/// JSON numbers with no fractional part, so `7` and `7.0` both count
fn whole_days(value: &serde_json::Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|days| days.fract() == 0.0 && *days >= 0.0 && *days <= u32::MAX as f64)
            .map(|days| days as u64)
    })
}

/// A request that passed input validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ValidatedRequest {
    snippet_id: Uuid,
    expires_in_days: Option<u64>,
}

/// Issues public share links for snippets owned by the caller
pub struct ShareLinkIssuer {
    auth: Arc<dyn AuthProvider>,
    shares: Arc<dyn ShareStore>,
    public_url: String,
}

impl ShareLinkIssuer {
    pub fn new(auth: Arc<dyn AuthProvider>, shares: Arc<dyn ShareStore>, public_url: &str) -> Self {
        Self {
            auth,
            shares,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn share_url(&self, token: &str) -> String {
        format!("{}/shared/{}", self.public_url, token)
    }

    /// Run the request through validation, authentication and the ownership
    /// check, then persist a new share record. Any failing stage ends the
    /// request and later stages never run.
    #[instrument(skip(self, request, authorization))]
    pub async fn issue(
        &self,
        request: &ShareRequest,
        authorization: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ShareLink, ShareError> {
        let validated = Self::validate(request)?;
        debug!("Share request for snippet {} validated", validated.snippet_id);

        let caller = self.authenticate(authorization).await?;

        let owner = self
            .shares
            .snippet_owner(validated.snippet_id)
            .await
            .context("look up snippet owner")
            .map_err(|e| {
                error!("Snippet lookup error: {:#}", e);
                ShareError::Internal(e)
            })?
            .ok_or_else(|| {
                warn!("Snippet {} not found", validated.snippet_id);
                ShareError::NotFound
            })?;
        if owner != caller {
            warn!(
                "Ownership verification failed: account {} attempted to share snippet owned by {}",
                caller, owner
            );
            return Err(ShareError::Forbidden);
        }

        let share_token = Uuid::new_v4().to_string();
        let record = ShareRecord {
            id: Uuid::new_v4(),
            snippet_id: validated.snippet_id,
            share_token: share_token.clone(),
            expires_at: validated
                .expires_in_days
                .map(|days| now + Duration::days(days as i64)),
            created_at: now,
        };
        self.shares
            .insert_share(&record)
            .await
            .context("create share record")
            .map_err(|e| {
                error!("Error creating share: {:#}", e);
                ShareError::Internal(e)
            })?;

        info!("Issued share link for snippet {}", record.snippet_id);
        Ok(ShareLink {
            share_url: self.share_url(&share_token),
            share_token,
        })
    }

    fn validate(request: &ShareRequest) -> Result<ValidatedRequest, ShareError> {
        let snippet_id = request
            .snippet_id
            .as_deref()
            .filter(|id| SNIPPET_ID.is_match(id))
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| ShareError::BadRequest("Invalid snippet ID format".to_string()))?;

        let expires_in_days = match &request.expires_in_days {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(
                whole_days(value)
                    .filter(|days| (MIN_EXPIRY_DAYS..=MAX_EXPIRY_DAYS).contains(days))
                    .ok_or_else(|| {
                        ShareError::BadRequest("Expiration must be between 1-365 days".to_string())
                    })?,
            ),
        };

        Ok(ValidatedRequest {
            snippet_id,
            expires_in_days,
        })
    }

    async fn authenticate(&self, authorization: Option<&str>) -> Result<Uuid, ShareError> {
        let token = authorization
            .map(|header| header.strip_prefix("Bearer ").unwrap_or(header).trim())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                warn!("Share request without credential");
                ShareError::Unauthorized
            })?;

        match self.auth.resolve_token(token).await {
            Ok(Some(account)) => Ok(account.id),
            Ok(None) => {
                warn!("Share request with unknown credential");
                Err(ShareError::Unauthorized)
            }
            Err(e) => {
                error!("Authentication error: {:#}", e);
                Err(ShareError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Language, Registration, SnippetDraft};
    use crate::repositories::{MemoryStore, SnippetStore};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    struct Fixture {
        store: Arc<MemoryStore>,
        issuer: ShareLinkIssuer,
        token: String,
        own_snippet: Uuid,
        foreign_snippet: Uuid,
    }

    async fn register(store: &MemoryStore, email: &str) -> (String, Uuid) {
        let session = store
            .sign_up(&Registration {
                name: "Someone".to_string(),
                email: email.to_string(),
                password: "Sup3r$ecret".to_string(),
            })
            .await
            .expect("sign up");
        (session.access_token, session.account.id)
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let (token, owner) = register(&store, "ada@example.com").await;
        let (_, other) = register(&store, "grace@example.com").await;
        let draft = SnippetDraft {
            title: "Shared".to_string(),
            description: String::new(),
            code: "SELECT 1;".to_string(),
            language: Language::Sql,
            tags: Vec::new(),
        };
        let own_snippet = store.insert(owner, &draft).await.expect("insert own").id;
        let foreign_snippet = store.insert(other, &draft).await.expect("insert foreign").id;
        let issuer = ShareLinkIssuer::new(store.clone(), store.clone(), "https://snippets.example.com/");

        Fixture {
            store,
            issuer,
            token,
            own_snippet,
            foreign_snippet,
        }
    }

    fn request(snippet_id: &str, days: Option<serde_json::Value>) -> ShareRequest {
        ShareRequest {
            snippet_id: Some(snippet_id.to_string()),
            expires_in_days: days,
        }
    }

    #[tokio::test]
    async fn given_owner_request_with_expiry_when_issuing_then_persists_record_and_returns_url() {
        // Arrange
        let fx = fixture().await;
        let bearer = format!("Bearer {}", fx.token);
        let now = Utc::now();

        // Act
        let link = fx
            .issuer
            .issue(&request(&fx.own_snippet.to_string(), Some(json!(7))), Some(&bearer), now)
            .await
            .expect("issue link");

        // Assert
        assert_eq!(
            link.share_url,
            format!("https://snippets.example.com/shared/{}", link.share_token)
        );
        let shares = fx.store.shares().await;
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].share_token, link.share_token);
        assert_eq!(shares[0].expires_at, Some(now + Duration::days(7)));
        assert!(Uuid::parse_str(&link.share_token).is_ok());
    }

    #[tokio::test]
    async fn given_null_expiry_when_issuing_then_link_never_expires() {
        let fx = fixture().await;
        let bearer = format!("Bearer {}", fx.token);

        fx.issuer
            .issue(
                &request(&fx.own_snippet.to_string(), Some(serde_json::Value::Null)),
                Some(&bearer),
                Utc::now(),
            )
            .await
            .expect("issue link");

        assert_eq!(fx.store.shares().await[0].expires_at, None);
    }

    #[tokio::test]
    async fn given_malformed_id_when_issuing_then_bad_request_before_authentication() {
        // Arrange
        let fx = fixture().await;

        // Act
        let result = fx.issuer.issue(&request("not-a-uuid", None), None, Utc::now()).await;

        // Assert
        let error = result.unwrap_err();
        assert_eq!(error.status_code(), 400);
        assert_eq!(error.to_string(), "Invalid snippet ID format");
    }

    #[test]
    fn given_uppercase_v4_id_when_validating_then_accepted() {
        let id = Uuid::new_v4().to_string().to_uppercase();

        let validated = ShareLinkIssuer::validate(&request(&id, None)).expect("valid id");

        assert_eq!(validated.snippet_id.to_string().to_uppercase(), id);
    }

    #[test]
    fn given_non_v4_uuid_when_validating_then_rejected() {
        let v1_style = "c232ab00-9414-11ec-b3c8-9e6bdeced846";

        let error = assert_err!(ShareLinkIssuer::validate(&request(v1_style, None)));

        assert!(matches!(error, ShareError::BadRequest(_)));
    }

    #[test]
    fn given_out_of_range_expiry_when_validating_then_rejected() {
        let id = Uuid::new_v4().to_string();

        for days in [json!(0), json!(366), json!(-1), json!(1.5), json!("7")] {
            let result = ShareLinkIssuer::validate(&request(&id, Some(days.clone())));
            assert!(
                matches!(result, Err(ShareError::BadRequest(ref m)) if m == "Expiration must be between 1-365 days"),
                "expected rejection for {}",
                days
            );
        }
        let longest = assert_ok!(ShareLinkIssuer::validate(&request(&id, Some(json!(365)))));
        assert_eq!(longest.expires_in_days, Some(MAX_EXPIRY_DAYS));
        assert_ok!(ShareLinkIssuer::validate(&request(&id, Some(json!(1)))));
    }

    #[test]
    fn given_integral_float_expiry_when_validating_then_accepted_as_whole_days() {
        // Arrange
        let id = Uuid::new_v4().to_string();

        // Act
        let week = assert_ok!(ShareLinkIssuer::validate(&request(&id, Some(json!(7.0)))));
        let too_long = ShareLinkIssuer::validate(&request(&id, Some(json!(366.0))));

        // Assert
        assert_eq!(week.expires_in_days, Some(7));
        assert!(matches!(too_long, Err(ShareError::BadRequest(_))));
    }

    #[tokio::test]
    async fn given_missing_or_unknown_credential_when_issuing_then_unauthorized() {
        let fx = fixture().await;
        let req = request(&fx.own_snippet.to_string(), None);

        let missing = fx.issuer.issue(&req, None, Utc::now()).await;
        let unknown = fx.issuer.issue(&req, Some("Bearer nope"), Utc::now()).await;

        assert!(matches!(missing, Err(ShareError::Unauthorized)));
        assert!(matches!(unknown, Err(ShareError::Unauthorized)));
        assert!(fx.store.shares().await.is_empty());
    }

    #[tokio::test]
    async fn given_foreign_snippet_when_issuing_then_forbidden_and_nothing_persisted() {
        // Arrange
        let fx = fixture().await;
        let bearer = format!("Bearer {}", fx.token);

        // Act
        let result = fx
            .issuer
            .issue(&request(&fx.foreign_snippet.to_string(), None), Some(&bearer), Utc::now())
            .await;

        // Assert
        assert_eq!(result.unwrap_err().status_code(), 403);
        assert!(fx.store.shares().await.is_empty());
    }

    #[tokio::test]
    async fn given_absent_snippet_when_issuing_then_not_found() {
        let fx = fixture().await;
        let bearer = format!("Bearer {}", fx.token);

        let result = fx
            .issuer
            .issue(&request(&Uuid::new_v4().to_string(), None), Some(&bearer), Utc::now())
            .await;

        assert!(matches!(result, Err(ShareError::NotFound)));
    }
}

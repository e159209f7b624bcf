use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of a share-link request, before validation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    #[serde(default)]
    pub snippet_id: Option<String>,
    /// Kept as raw JSON so that strings and fractions can be rejected as out of range
    #[serde(default)]
    pub expires_in_days: Option<serde_json::Value>,
}

/// Successful share-link response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    pub share_url: String,
    pub share_token: String,
}

/// A row of the `snippet_shares` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRecord {
    pub id: Uuid,
    pub snippet_id: Uuid,
    pub share_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

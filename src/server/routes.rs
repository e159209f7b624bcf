use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, error};

use super::AppState;
use crate::domain::{ShareLink, ShareRequest};
use crate::services::ShareError;

/// `POST /functions/v1/generate-share-link`
pub async fn share_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ShareLink>, ShareError> {
    let value: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        debug!("Rejecting unparseable share request: {}", e);
        ShareError::BadRequest("Invalid request body".to_string())
    })?;
    if !value.is_object() {
        return Err(ShareError::BadRequest("Invalid request body".to_string()));
    }

    // A present but non-string snippetId is a malformed id, not a malformed body
    let request: ShareRequest = serde_json::from_value(value)
        .map_err(|_| ShareError::BadRequest("Invalid snippet ID format".to_string()))?;

    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let link = state
        .issuer
        .issue(&request, authorization, Utc::now())
        .await?;
    Ok(Json(link))
}

/// `GET /health`
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            error!("Health check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::ShareError;

impl IntoResponse for ShareError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn given_forbidden_error_when_rendering_then_status_and_json_body_match() {
        // Arrange
        let error = ShareError::Forbidden;

        // Act
        let response = error.into_response();

        // Assert
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["error"], "Forbidden: You do not own this snippet");
    }

    #[test]
    fn given_internal_error_when_rendering_then_returns_500() {
        let error = ShareError::Internal(anyhow::anyhow!("database offline"));

        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! Stable error taxonomy for the dispatch pipeline.
//!
//! Every stage classifies its own failures into exactly one [`DispatchError`]
//! kind at the point of origin; classified errors propagate unchanged to the
//! HTTP boundary. The [`IntoResponse`] impl below is the single place where a
//! kind becomes a status code and a response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classified pipeline failure. Messages are safe to show to callers;
/// underlying causes stay in server-side logs.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The upload itself is at fault: empty or oversized payload, bytes that
    /// do not decode as an image, unknown backend selector.
    #[error("{0}")]
    InvalidInput(String),

    /// The local recognition engine is missing, not executable, or out of
    /// capacity.
    #[error("{0}")]
    EngineUnavailable(String),

    /// Transport-level failure reaching the cloud recognition service.
    #[error("{0}")]
    NetworkFailure(String),

    /// The cloud recognition service rejected our credentials.
    #[error("{0}")]
    AuthFailure(String),

    /// Throttled by the cloud service, or its outbound pool is saturated.
    #[error("{0}")]
    QuotaExceeded(String),

    /// Unanticipated fault. Always carries the underlying cause so the logs
    /// can explain what happened.
    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Cause>,
    },
}

impl DispatchError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_with(message: impl Into<String>, source: impl Into<Cause>) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Stable kind name used in logs and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::EngineUnavailable(_) => "ENGINE_UNAVAILABLE",
            Self::NetworkFailure(_) => "NETWORK_FAILURE",
            Self::AuthFailure(_) => "AUTH_FAILURE",
            Self::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::AuthFailure(_) => StatusCode::UNAUTHORIZED,
            Self::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::NetworkFailure(_) => StatusCode::BAD_GATEWAY,
            Self::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            // Debug formatting includes the source chain for Internal.
            error!(kind = self.kind(), error = ?self, "request failed");
        } else {
            warn!(kind = self.kind(), error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(DispatchError::InvalidInput("x".into()).kind(), "INVALID_INPUT");
        assert_eq!(
            DispatchError::EngineUnavailable("x".into()).kind(),
            "ENGINE_UNAVAILABLE"
        );
        assert_eq!(DispatchError::NetworkFailure("x".into()).kind(), "NETWORK_FAILURE");
        assert_eq!(DispatchError::AuthFailure("x".into()).kind(), "AUTH_FAILURE");
        assert_eq!(DispatchError::QuotaExceeded("x".into()).kind(), "QUOTA_EXCEEDED");
        assert_eq!(DispatchError::internal("x").kind(), "INTERNAL");
    }

    #[test]
    fn test_status_mapping_is_injective() {
        let errors = [
            DispatchError::InvalidInput("x".into()),
            DispatchError::AuthFailure("x".into()),
            DispatchError::QuotaExceeded("x".into()),
            DispatchError::NetworkFailure("x".into()),
            DispatchError::EngineUnavailable("x".into()),
            DispatchError::internal("x"),
        ];
        let mut statuses: Vec<u16> = errors.iter().map(|e| e.status().as_u16()).collect();
        statuses.sort_unstable();
        statuses.dedup();
        assert_eq!(statuses.len(), 6);
    }

    #[test]
    fn test_client_vs_server_error_classes() {
        assert!(DispatchError::InvalidInput("x".into()).status().is_client_error());
        assert!(DispatchError::AuthFailure("x".into()).status().is_client_error());
        assert!(DispatchError::QuotaExceeded("x".into()).status().is_client_error());
        assert!(DispatchError::EngineUnavailable("x".into()).status().is_server_error());
        assert!(DispatchError::NetworkFailure("x".into()).status().is_server_error());
        assert!(DispatchError::internal("x").status().is_server_error());
    }

    #[tokio::test]
    async fn test_response_body_is_error_object() {
        let response = DispatchError::InvalidInput("empty image payload".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, json!({ "error": "empty image payload" }));
    }

    #[test]
    fn test_internal_keeps_cause_out_of_message() {
        let err = DispatchError::internal_with(
            "local OCR engine failed to process the image",
            "read_params_file: Can't open stdin",
        );
        assert_eq!(err.to_string(), "local OCR engine failed to process the image");
        assert!(std::error::Error::source(&err).is_some());
    }
}

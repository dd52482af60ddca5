use axum::{
    Json,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

use crate::{
    models::transfer::MoveItem,
    services::{store::RemoteError, transfer::MoveStage},
};

/// Everything a gateway operation can fail with.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("invalid key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("invalid bucket name `{name}`: {reason}")]
    InvalidBucketName { name: String, reason: &'static str },
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("move aborted after {moved} item(s) during {stage}: {source}")]
    MoveAborted {
        moved: usize,
        stage: MoveStage,
        item: MoveItem,
        #[source]
        source: RemoteError,
    },
}

impl GatewayError {
    pub fn missing(field: &str) -> Self {
        Self::InvalidRequest(format!("{field} is required"))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// The HTTP shape of an error.
///
/// Invalid input answers `{"error": message}`; remote failures carry the
/// provider error itself as `payload`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub payload: Option<Value>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            payload: None,
        }
    }

    /// Shortcut for a 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = self
            .payload
            .unwrap_or_else(|| json!({ "error": self.message }));

        (self.status, Json(body)).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidRequest(_)
            | GatewayError::InvalidKey { .. }
            | GatewayError::InvalidBucketName { .. } => AppError::bad_request(err.to_string()),
            GatewayError::Remote(remote) => {
                let payload = serde_json::to_value(&remote).unwrap_or(Value::Null);
                AppError::internal(remote.to_string()).with_payload(payload)
            }
            GatewayError::MoveAborted {
                moved,
                stage,
                item,
                source,
            } => {
                let mut payload = serde_json::to_value(&source).unwrap_or_else(|_| json!({}));
                if let Value::Object(map) = &mut payload {
                    map.insert("moved".into(), json!(moved));
                    map.insert("failedStage".into(), json!(stage.to_string()));
                    map.insert("failedItem".into(), json!(item));
                }
                AppError::internal(source.to_string()).with_payload(payload)
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

/// Framing errors are client errors; an oversized body keeps its 413.
impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_maps_to_bad_request() {
        let err: AppError = GatewayError::missing("folderName").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "folderName is required");
        assert!(err.payload.is_none());
    }

    #[test]
    fn remote_failure_keeps_provider_error() {
        let remote = RemoteError::new("GetObject", Some("NoSuchKey".into()), "key not found");
        let err: AppError = GatewayError::Remote(remote).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        let payload = err.payload.expect("payload");
        assert_eq!(payload["operation"], "GetObject");
        assert_eq!(payload["code"], "NoSuchKey");
        assert_eq!(payload["message"], "key not found");
    }

    #[test]
    fn aborted_move_reports_progress() {
        let err: AppError = GatewayError::MoveAborted {
            moved: 1,
            stage: MoveStage::Copy,
            item: MoveItem {
                source_bucket: "src".into(),
                source_key: "x".into(),
                target_bucket: "dst".into(),
                target_key: "y".into(),
            },
            source: RemoteError::new("CopyObject", None, "boom"),
        }
        .into();
        let payload = err.payload.expect("payload");
        assert_eq!(payload["moved"], 1);
        assert_eq!(payload["failedStage"], "copy");
        assert_eq!(payload["failedItem"]["sourceKey"], "x");
    }
}

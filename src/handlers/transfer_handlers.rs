//! Batch move and archive handlers.

use crate::{
    errors::AppError,
    handlers::object_handlers::{MessageResponse, required},
    models::transfer::{MoveFileSpec, MoveItem},
    services::gateway_service::GatewayService,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};

/// Body of `POST /move-files`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFilesReq {
    pub source_bucket: Option<String>,
    pub target_bucket: Option<String>,
    pub files: Option<Vec<MoveFileSpec>>,
}

/// Body of `POST /archive-file`.
#[derive(Debug, Deserialize)]
pub struct ArchiveFileReq {
    pub key: Option<String>,
    pub bucket: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveResponse {
    pub message: String,
    pub archived_key: String,
}

/// POST `/move-files`: copy-then-delete every item, in order.
pub async fn move_files(
    State(service): State<GatewayService>,
    payload: Result<Json<MoveFilesReq>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(req) = payload?;
    let source_bucket = required(req.source_bucket, "sourceBucket")?;
    let target_bucket = required(req.target_bucket, "targetBucket")?;
    let files = req
        .files
        .filter(|files| !files.is_empty())
        .ok_or_else(|| AppError::bad_request("files is required"))?;

    let items = files
        .into_iter()
        .map(|spec| -> Result<MoveItem, AppError> {
            let (source_key, target_key) = match spec {
                MoveFileSpec::Key(key) => (key.clone(), Some(key)),
                MoveFileSpec::Pair {
                    source_key,
                    target_key,
                } => (required(source_key, "sourceKey")?, target_key),
            };
            Ok(MoveItem {
                source_bucket: source_bucket.clone(),
                target_bucket: target_bucket.clone(),
                target_key: target_key
                    .filter(|k| !k.is_empty())
                    .unwrap_or_else(|| source_key.clone()),
                source_key,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let moved = service.move_files(items).await?;
    Ok(MessageResponse::new(format!(
        "{moved} file(s) moved successfully"
    )))
}

/// POST `/archive-file`: move one object under `archive/` in the same bucket.
pub async fn archive_file(
    State(service): State<GatewayService>,
    payload: Result<Json<ArchiveFileReq>, JsonRejection>,
) -> Result<Json<ArchiveResponse>, AppError> {
    let Json(req) = payload?;
    let key = required(req.key, "key")?;
    let bucket = req
        .bucket
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| service.default_bucket().to_string());

    let archived_key = service.archive(&bucket, &key).await?;
    Ok(Json(ArchiveResponse {
        message: "File archived successfully".into(),
        archived_key,
    }))
}

//! Multipart upload handlers.
//!
//! Each file part is streamed into a spool file and handed to the store
//! before the next part is pulled off the request body.

use crate::{
    errors::AppError,
    models::transfer::UploadResult,
    services::{
        gateway_service::{GatewayService, UploadBatch},
        spool::{self, SpoolError},
    },
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State, multipart::{Field, MultipartRejection}},
};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFilesResponse {
    pub file_urls: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSingleResponse {
    pub file_url: String,
}

/// POST `/upload/{bucket}`: every `files` part becomes one object.
pub async fn upload_files(
    State(service): State<GatewayService>,
    Path(bucket): Path<String>,
    Query(q): Query<UploadQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadFilesResponse>, AppError> {
    let mut batch = service.begin_upload(&bucket, q.prefix.as_deref())?;
    let mut multipart = multipart?;

    let mut file_urls = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("files") {
            continue;
        }
        let uploaded = store_field(&service, &mut batch, field).await?;
        file_urls.push(uploaded.url);
    }

    if file_urls.is_empty() {
        return Err(AppError::bad_request("No files uploaded"));
    }
    Ok(Json(UploadFilesResponse { file_urls }))
}

/// POST `/upload-single/{bucket}`: stores the first `file` part.
pub async fn upload_single(
    State(service): State<GatewayService>,
    Path(bucket): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadSingleResponse>, AppError> {
    let mut batch = service.begin_upload(&bucket, None)?;
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let uploaded = store_field(&service, &mut batch, field).await?;
            return Ok(Json(UploadSingleResponse {
                file_url: uploaded.url,
            }));
        }
    }
    Err(AppError::bad_request("No file uploaded"))
}

async fn store_field(
    service: &GatewayService,
    batch: &mut UploadBatch,
    field: Field<'_>,
) -> Result<UploadResult, AppError> {
    let filename = field
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| AppError::bad_request("uploaded part has no filename"))?;
    let content_type = field.content_type().map(str::to_string);

    let file = spool::spool(service.spool_dir(), field)
        .await
        .map_err(|err| match err {
            SpoolError::Source(err) => AppError::from(err),
            SpoolError::Io(err) => {
                error!(filename = %filename, error = %err, "failed to spool upload");
                AppError::internal(format!("failed to buffer upload: {err}"))
            }
        })?;

    Ok(service
        .upload_file(batch, &filename, content_type, &file)
        .await?)
}

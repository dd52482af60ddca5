//! HTTP handlers for bucket listing and single-object operations.
//! Object bodies are streamed through without buffering; everything else is
//! delegated to `GatewayService`.

use crate::{
    errors::AppError,
    models::object::{BucketObjectEntry, ListingPage, ObjectEntry, PresignedUrl},
    services::{
        gateway_service::{GatewayService, ListFilesParams},
        store::ObjectStream,
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// Query params accepted by `GET /list-files/{bucket}`.
#[derive(Debug, Default, Deserialize)]
pub struct ListFilesQuery {
    pub prefix: Option<String>,
    pub token: Option<String>,
    #[serde(rename = "lastFetchTime")]
    pub last_fetch_time: Option<String>,
}

/// Query params accepted by the search endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub prefix: Option<String>,
    #[serde(rename = "fileName")]
    pub file_name: Option<String>,
}

/// Body of `POST /create-folder/{bucket}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderReq {
    pub folder_name: Option<String>,
}

/// Body of `POST /copy-file/{bucket}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyFileReq {
    pub source_key: Option<String>,
    pub target_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// GET `/generate-presigned-url/{bucket}/{*key}`
pub async fn generate_presigned_url(
    State(service): State<GatewayService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Json<PresignedUrl>, AppError> {
    Ok(Json(service.presign(&bucket, &key).await?))
}

/// GET `/list-buckets`
pub async fn list_buckets(
    State(service): State<GatewayService>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(service.list_buckets().await?))
}

/// GET `/list-files/{bucket}`: one page, supports ?prefix=&token=&lastFetchTime=
pub async fn list_files(
    State(service): State<GatewayService>,
    Path(bucket): Path<String>,
    Query(q): Query<ListFilesQuery>,
) -> Result<Json<ListingPage>, AppError> {
    let modified_after = q
        .last_fetch_time
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .map(parse_last_fetch_time)
        .transpose()?;

    let params = ListFilesParams {
        prefix: q.prefix,
        token: q.token,
        modified_after,
    };
    Ok(Json(service.list_files(&bucket, params).await?))
}

/// GET `/search-files/{bucket}`: ?prefix=&fileName=
pub async fn search_files(
    State(service): State<GatewayService>,
    Path(bucket): Path<String>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<ObjectEntry>>, AppError> {
    let hits = service
        .search_files(&bucket, q.prefix.as_deref(), q.file_name.as_deref())
        .await?;
    Ok(Json(hits))
}

/// GET `/search-all-files`: same filters as `search_files`, across all buckets.
pub async fn search_all_files(
    State(service): State<GatewayService>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<BucketObjectEntry>>, AppError> {
    let hits = service
        .search_all_buckets(q.prefix.as_deref(), q.file_name.as_deref())
        .await?;
    Ok(Json(hits))
}

/// POST `/create-folder/{bucket}`
pub async fn create_folder(
    State(service): State<GatewayService>,
    Path(bucket): Path<String>,
    payload: Result<Json<CreateFolderReq>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(req) = payload?;
    let folder_name = required(req.folder_name, "folderName")?;
    let key = service.create_folder(&bucket, &folder_name).await?;
    Ok(MessageResponse::new(format!("Folder {key} created successfully")))
}

/// GET `/download/{bucket}/{*key}`: stream the object as an attachment.
pub async fn download_file(
    State(service): State<GatewayService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let ObjectStream {
        content_type,
        content_length,
        body,
    } = service.download(&bucket, &key).await?;

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = StatusCode::OK;
    set_download_headers(
        response.headers_mut(),
        &key,
        content_type.as_deref(),
        content_length,
    );
    Ok(response)
}

/// DELETE `/delete-file/{bucket}/{*key}`
pub async fn delete_file(
    State(service): State<GatewayService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, AppError> {
    service.delete(&bucket, &key).await?;
    Ok(MessageResponse::new("File deleted successfully"))
}

/// POST `/copy-file/{bucket}`
pub async fn copy_file(
    State(service): State<GatewayService>,
    Path(bucket): Path<String>,
    payload: Result<Json<CopyFileReq>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(req) = payload?;
    let source_key = required(req.source_key, "sourceKey")?;
    let target_key = required(req.target_key, "targetKey")?;
    service.copy(&bucket, &source_key, &target_key).await?;
    Ok(MessageResponse::new("File copied successfully"))
}

/// Object routes hit without a key (`/download/{bucket}` and friends).
pub async fn missing_key() -> impl IntoResponse {
    AppError::bad_request("key is required")
}

/// Unwrap a required body field, treating empty strings as absent.
pub(crate) fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(format!("{field} is required")))
}

/// `lastFetchTime` is either RFC 3339 or Unix epoch milliseconds.
fn parse_last_fetch_time(raw: &str) -> Result<DateTime<Utc>, AppError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| {
            AppError::bad_request(format!(
                "lastFetchTime `{raw}` is neither RFC 3339 nor epoch milliseconds"
            ))
        })
}

fn set_download_headers(
    headers: &mut HeaderMap,
    key: &str,
    content_type: Option<&str>,
    content_length: Option<i64>,
) {
    headers.insert(
        header::CONTENT_TYPE,
        content_type
            .and_then(|ct| HeaderValue::from_str(ct).ok())
            .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream")),
    );

    if let Some(length) = content_length.filter(|len| *len >= 0) {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length as u64));
    }

    headers.insert(header::CONTENT_DISPOSITION, content_disposition(key));
}

/// `attachment` with the key as filename; non-ASCII keys use the RFC 5987 form.
fn content_disposition(key: &str) -> HeaderValue {
    let plain = key.is_ascii() && !key.chars().any(|c| c.is_ascii_control());
    let value = if plain {
        let escaped = key.replace('\\', "\\\\").replace('"', "\\\"");
        format!("attachment; filename=\"{escaped}\"")
    } else {
        format!(
            "attachment; filename*=UTF-8''{}",
            utf8_percent_encode(key, NON_ALPHANUMERIC)
        )
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn last_fetch_time_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            parse_last_fetch_time("2025-03-01T12:00:00Z").unwrap(),
            expected
        );
        assert_eq!(
            parse_last_fetch_time("2025-03-01T13:00:00+01:00").unwrap(),
            expected
        );
        assert_eq!(
            parse_last_fetch_time(&expected.timestamp_millis().to_string()).unwrap(),
            expected
        );
        assert_eq!(
            parse_last_fetch_time("yesterday").unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn disposition_quotes_filename() {
        assert_eq!(
            content_disposition("docs/a \"b\".txt"),
            "attachment; filename=\"docs/a \\\"b\\\".txt\""
        );
        assert_eq!(
            content_disposition("é.txt"),
            "attachment; filename*=UTF-8''%C3%A9%2Etxt"
        );
    }
}

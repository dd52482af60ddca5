//! Defines routes for every gateway endpoint.
//!
//! ## Structure
//! - **Object endpoints** (`{*key}` captures the rest of the path, so nested
//!   keys like `photos/2025/img.jpg` work)
//!   - `GET    /generate-presigned-url/{bucket}/{*key}`
//!   - `GET    /download/{bucket}/{*key}`
//!   - `DELETE /delete-file/{bucket}/{*key}`
//!
//! - **Bucket endpoints**
//!   - `GET    /list-buckets`
//!   - `GET    /list-files/{bucket}`: `prefix`, `token`, `lastFetchTime`
//!   - `GET    /search-files/{bucket}`: `prefix`, `fileName`
//!   - `GET    /search-all-files`: `prefix`, `fileName`
//!   - `POST   /create-folder/{bucket}`
//!   - `POST   /copy-file/{bucket}`
//!
//! - **Uploads** (multipart)
//!   - `POST   /upload/{bucket}`: field `files`, query `prefix`
//!   - `POST   /upload-single/{bucket}`: field `file`
//!
//! - **Moves**
//!   - `POST   /move-files`
//!   - `POST   /archive-file`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{
            copy_file, create_folder, delete_file, download_file, generate_presigned_url,
            list_buckets, list_files, missing_key, search_all_files, search_files,
        },
        transfer_handlers::{archive_file, move_files},
        upload_handlers::{upload_files, upload_single},
    },
    services::gateway_service::GatewayService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

/// Build and return the router for all gateway routes.
///
/// Upload routes accept bodies up to `max_upload_bytes`; the router carries
/// `GatewayService` as shared state to all handlers.
pub fn routes(max_upload_bytes: usize) -> Router<GatewayService> {
    let uploads = Router::new()
        .route("/upload/{bucket}", post(upload_files))
        .route("/upload-single/{bucket}", post(upload_single))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Object-level routes
        .route(
            "/generate-presigned-url/{bucket}/{*key}",
            get(generate_presigned_url),
        )
        .route("/download/{bucket}/{*key}", get(download_file))
        .route("/delete-file/{bucket}/{*key}", delete(delete_file))
        // Same routes without a key
        .route("/generate-presigned-url/{bucket}", get(missing_key))
        .route("/download/{bucket}", get(missing_key))
        .route("/delete-file/{bucket}", delete(missing_key))
        // Bucket-level routes
        .route("/list-buckets", get(list_buckets))
        .route("/list-files/{bucket}", get(list_files))
        .route("/search-files/{bucket}", get(search_files))
        .route("/search-all-files", get(search_all_files))
        .route("/create-folder/{bucket}", post(create_folder))
        .route("/copy-file/{bucket}", post(copy_file))
        // Batch routes
        .route("/move-files", post(move_files))
        .route("/archive-file", post(archive_file))
        .merge(uploads)
}

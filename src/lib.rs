//! REST gateway over an S3-compatible object store.
//!
//! Every endpoint maps onto one object-store operation (or a short fixed
//! sequence of them, for moves). The gateway keeps no state of its own.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{
    config::{AppConfig, Backend},
    services::{
        gateway_service::{GatewayService, GatewaySettings},
        memory_store::MemoryStore,
        s3_store::S3Store,
        store::ObjectStore,
    },
};

/// Build the application router around an already constructed service.
pub fn create_router(service: GatewayService, max_upload_bytes: usize) -> Router {
    routes::routes::routes(max_upload_bytes)
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}

/// Construct the object store selected by `cfg` and wrap it in a service.
pub async fn build_service(cfg: &AppConfig) -> GatewayService {
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        Backend::S3 => Arc::new(S3Store::new(cfg).await),
        Backend::Memory => {
            // object URLs resolve to this gateway's own download route
            let base_url = cfg
                .endpoint_url
                .clone()
                .unwrap_or_else(|| format!("http://{}/download", cfg.addr()));
            let store = MemoryStore::new(base_url);
            store.create_bucket(cfg.default_bucket.clone()).await;
            Arc::new(store)
        }
    };

    GatewayService::new(
        store,
        GatewaySettings {
            default_bucket: cfg.default_bucket.clone(),
            presign_expiry: cfg.presign_expiry,
            page_size: cfg.page_size,
            spool_dir: cfg.spool_dir.clone(),
        },
    )
}

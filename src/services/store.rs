//! The object-store seam.
//!
//! Every remote call the gateway makes goes through [`ObjectStore`]. The
//! production implementation talks to S3 (`s3_store`); `memory_store`
//! provides the same listing semantics in-process.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use std::{fmt, io, path::Path, time::Duration};
use thiserror::Error;

use crate::models::object::{ObjectEntry, PresignedUrl};

/// A failed call against the object store, kept as close to the provider's
/// own error as possible so it can be returned to the caller verbatim.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{operation} failed: {message}")]
pub struct RemoteError {
    /// Provider operation name, e.g. `GetObject`.
    pub operation: &'static str,
    /// Provider error code (`NoSuchKey`, `AccessDenied`, ...) when one was returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl RemoteError {
    pub fn new(operation: &'static str, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            operation,
            code,
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, RemoteError>;

/// Parameters of one ListObjectsV2-style call.
#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub max_keys: Option<i32>,
    pub continuation_token: Option<String>,
}

/// One page of a listing as returned by the store.
#[derive(Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectEntry>,
    pub common_prefixes: Vec<String>,
    /// Opaque; `None` means the listing is exhausted.
    pub next_continuation_token: Option<String>,
}

/// An object body being pulled from the store.
pub struct ObjectStream {
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub body: BoxStream<'static, io::Result<Bytes>>,
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStream")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Object-store operations used by the gateway.
///
/// Implementations perform exactly one remote round-trip per call and never
/// retry on their own.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Time-limited read URL for one object. Does not check that the object exists.
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StoreResult<PresignedUrl>;

    /// Stable address of an object, as handed back after uploads.
    fn object_url(&self, bucket: &str, key: &str) -> String;

    async fn list_buckets(&self) -> StoreResult<Vec<String>>;

    async fn list_objects(&self, bucket: &str, request: ListRequest) -> StoreResult<ListPage>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<()>;

    /// Upload the contents of a local file of `len` bytes.
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        len: u64,
        content_type: Option<String>,
    ) -> StoreResult<()>;

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectStream>;

    /// Succeeds whether or not the key exists.
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Server-side copy; the target is overwritten unconditionally.
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
    ) -> StoreResult<()>;
}

/// Characters left as-is when a key is placed in a URL path or `x-amz-copy-source`.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode an object key, keeping `/` as the path separator.
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

/// Expiry instant for a URL issued at `issued_at`.
pub fn expiry_from(issued_at: DateTime<Utc>, expires_in: Duration) -> DateTime<Utc> {
    issued_at + chrono::Duration::seconds(expires_in.as_secs() as i64)
}

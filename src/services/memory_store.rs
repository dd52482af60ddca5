//! In-process [`ObjectStore`] with S3 listing semantics.
//!
//! Backs the `memory` backend and the test suites. Listing follows
//! ListObjectsV2: keys are returned in lexicographic order, keys sharing a
//! prefix up to the delimiter collapse into one common prefix, common
//! prefixes count towards `max_keys`, and continuation tokens are opaque.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::{
    collections::BTreeMap,
    io::Cursor,
    ops::Bound,
    path::Path,
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;
use tokio_util::io::ReaderStream;

use crate::{
    models::object::{ObjectEntry, PresignedUrl},
    services::store::{
        ListPage, ListRequest, ObjectStore, ObjectStream, RemoteError, StoreResult, encode_key,
        expiry_from,
    },
};

const DEFAULT_BASE_URL: &str = "memory://localhost";
const MAX_KEYS_LIMIT: i32 = 1000;

#[derive(Clone, Debug)]
struct StoredObject {
    body: Bytes,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

type Buckets = BTreeMap<String, BTreeMap<String, StoredObject>>;

#[derive(Clone)]
pub struct MemoryStore {
    buckets: Arc<RwLock<Buckets>>,
    base_url: String,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl MemoryStore {
    /// `base_url` prefixes the URLs handed out for uploads and presigns.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            buckets: Arc::new(RwLock::new(BTreeMap::new())),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Convenience constructor that pre-creates `names`.
    pub async fn with_buckets<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::default();
        for name in names {
            store.create_bucket(name).await;
        }
        store
    }

    pub async fn create_bucket(&self, name: impl Into<String>) {
        self.buckets.write().await.entry(name.into()).or_default();
    }

    /// Write an object with an explicit modification time.
    pub async fn insert_at(
        &self,
        bucket: &str,
        key: &str,
        body: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket("PutObject", bucket))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                body: body.into(),
                content_type: None,
                last_modified,
            },
        );
        Ok(())
    }

    /// Current body of an object, if present.
    pub async fn read(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|obj| obj.body.clone())
    }

    pub async fn contains(&self, bucket: &str, key: &str) -> bool {
        self.read(bucket, key).await.is_some()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StoreResult<PresignedUrl> {
        let issued_at = Utc::now();
        let url = format!(
            "{}?X-Amz-Date={}&X-Amz-Expires={}",
            self.object_url(bucket, key),
            issued_at.format("%Y%m%dT%H%M%SZ"),
            expires_in.as_secs()
        );
        Ok(PresignedUrl {
            url,
            expires_at: expiry_from(issued_at, expires_in),
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, bucket, encode_key(key))
    }

    async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        Ok(self.buckets.read().await.keys().cloned().collect())
    }

    async fn list_objects(&self, bucket: &str, request: ListRequest) -> StoreResult<ListPage> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| no_such_bucket("ListObjectsV2", bucket))?;

        let max_keys = request
            .max_keys
            .unwrap_or(MAX_KEYS_LIMIT)
            .clamp(1, MAX_KEYS_LIMIT) as usize;
        let cursor = request
            .continuation_token
            .as_deref()
            .map(ListCursor::decode)
            .transpose()?;
        let prefix = request.prefix.as_deref().unwrap_or("");
        let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());

        let mut page = ListPage::default();
        let mut emitted = 0;
        let mut last = None;
        let mut truncated = false;

        let range = objects.range::<str, _>((Bound::Included(prefix), Bound::Unbounded));
        for (key, obj) in range {
            if !key.starts_with(prefix) {
                break;
            }
            if cursor.as_ref().is_some_and(|c| c.consumed(key)) {
                continue;
            }

            let grouped = delimiter.and_then(|d| compute_common_prefix(key, prefix, d));
            if let Some(group) = &grouped {
                if page.common_prefixes.last() == Some(group) {
                    continue;
                }
            }

            if emitted == max_keys {
                truncated = true;
                break;
            }
            emitted += 1;

            match grouped {
                Some(group) => {
                    last = Some(ListCursor::Prefix(group.clone()));
                    page.common_prefixes.push(group);
                }
                None => {
                    last = Some(ListCursor::Key(key.clone()));
                    page.objects.push(ObjectEntry {
                        key: key.clone(),
                        last_modified: obj.last_modified,
                        size: obj.body.len() as i64,
                    });
                }
            }
        }

        if truncated {
            page.next_continuation_token = last.map(|c| c.encode());
        }
        Ok(page)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<()> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket("PutObject", bucket))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        _len: u64,
        content_type: Option<String>,
    ) -> StoreResult<()> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| RemoteError::new("PutObject", None, e.to_string()))?;
        self.put_object(bucket, key, Bytes::from(body), content_type)
            .await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectStream> {
        let buckets = self.buckets.read().await;
        let obj = buckets
            .get(bucket)
            .ok_or_else(|| no_such_bucket("GetObject", bucket))?
            .get(key)
            .ok_or_else(|| no_such_key("GetObject", key))?
            .clone();

        Ok(ObjectStream {
            content_type: obj.content_type,
            content_length: Some(obj.body.len() as i64),
            body: ReaderStream::new(Cursor::new(obj.body)).boxed(),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket("DeleteObject", bucket))?;
        objects.remove(key);
        Ok(())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
    ) -> StoreResult<()> {
        if source_bucket == target_bucket && source_key == target_key {
            return Err(RemoteError::new(
                "CopyObject",
                Some("InvalidRequest".into()),
                "This copy request is illegal because it is trying to copy an object to itself",
            ));
        }
        let mut buckets = self.buckets.write().await;
        let source = buckets
            .get(source_bucket)
            .ok_or_else(|| no_such_bucket("CopyObject", source_bucket))?
            .get(source_key)
            .ok_or_else(|| no_such_key("CopyObject", source_key))?
            .clone();
        let target = buckets
            .get_mut(target_bucket)
            .ok_or_else(|| no_such_bucket("CopyObject", target_bucket))?;
        target.insert(
            target_key.to_string(),
            StoredObject {
                last_modified: Utc::now(),
                ..source
            },
        );
        Ok(())
    }
}

/// Position after the last entry of a page.
#[derive(Debug, PartialEq, Eq)]
enum ListCursor {
    Key(String),
    Prefix(String),
}

impl ListCursor {
    /// Whether `key` was already returned on an earlier page.
    fn consumed(&self, key: &str) -> bool {
        match self {
            Self::Key(last) => key <= last.as_str(),
            Self::Prefix(group) => key <= group.as_str() || key.starts_with(group.as_str()),
        }
    }

    fn encode(&self) -> String {
        let raw = match self {
            Self::Key(key) => format!("k:{key}"),
            Self::Prefix(group) => format!("p:{group}"),
        };
        general_purpose::STANDARD.encode(raw)
    }

    fn decode(token: &str) -> StoreResult<Self> {
        let invalid = || {
            RemoteError::new(
                "ListObjectsV2",
                Some("InvalidArgument".into()),
                "The continuation token provided is incorrect",
            )
        };
        let raw = general_purpose::STANDARD
            .decode(token)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(invalid)?;
        match raw.split_at_checked(2) {
            Some(("k:", key)) => Ok(Self::Key(key.to_string())),
            Some(("p:", group)) => Ok(Self::Prefix(group.to_string())),
            _ => Err(invalid()),
        }
    }
}

/// Compute the common prefix `key` rolls up into, if any.
///
/// Returns `Some(prefix)` when the remainder of `key` after `requested_prefix`
/// still contains `delimiter`.
fn compute_common_prefix(key: &str, requested_prefix: &str, delimiter: &str) -> Option<String> {
    let after_prefix = key.strip_prefix(requested_prefix)?;
    let pos = after_prefix.find(delimiter)?;
    Some(format!(
        "{}{}",
        requested_prefix,
        &after_prefix[..pos + delimiter.len()]
    ))
}

fn no_such_bucket(operation: &'static str, bucket: &str) -> RemoteError {
    RemoteError::new(
        operation,
        Some("NoSuchBucket".into()),
        format!("The specified bucket does not exist: {bucket}"),
    )
}

fn no_such_key(operation: &'static str, key: &str) -> RemoteError {
    RemoteError::new(
        operation,
        Some("NoSuchKey".into()),
        format!("The specified key does not exist: {key}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::collections::BTreeSet;

    async fn seeded(keys: &[&str]) -> MemoryStore {
        let store = MemoryStore::with_buckets(["files"]).await;
        for key in keys {
            store
                .put_object("files", key, Bytes::from(key.to_string()), None)
                .await
                .unwrap();
        }
        store
    }

    fn request(prefix: &str, delimiter: Option<&str>, max_keys: i32) -> ListRequest {
        ListRequest {
            prefix: Some(prefix.to_string()),
            delimiter: delimiter.map(str::to_string),
            max_keys: Some(max_keys),
            continuation_token: None,
        }
    }

    #[tokio::test]
    async fn delimiter_groups_nested_keys() {
        let store = seeded(&["a.txt", "docs/", "docs/x.txt", "docs/sub/y.txt", "img/z.png"]).await;

        let page = store
            .list_objects("files", request("", Some("/"), 100))
            .await
            .unwrap();
        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["a.txt"]);
        assert_eq!(page.common_prefixes, ["docs/", "img/"]);
        assert!(page.next_continuation_token.is_none());

        let page = store
            .list_objects("files", request("docs/", Some("/"), 100))
            .await
            .unwrap();
        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["docs/", "docs/x.txt"]);
        assert_eq!(page.common_prefixes, ["docs/sub/"]);
    }

    #[tokio::test]
    async fn pages_concatenate_to_full_listing() {
        let keys = [
            "a", "b/1", "b/2", "b/3", "c", "d/e/f", "d/g", "h", "i/", "j", "k/1", "l",
        ];
        let store = seeded(&keys).await;

        let full = store
            .list_objects("files", request("", Some("/"), 1000))
            .await
            .unwrap();
        let expected: Vec<String> = full
            .objects
            .iter()
            .map(|o| o.key.clone())
            .chain(full.common_prefixes.iter().cloned())
            .collect();

        for page_size in 1..=5 {
            let mut seen = Vec::new();
            let mut token = None;
            loop {
                let mut req = request("", Some("/"), page_size);
                req.continuation_token = token.take();
                let page = store.list_objects("files", req).await.unwrap();
                assert!(page.objects.len() + page.common_prefixes.len() <= page_size as usize);
                seen.extend(page.objects.into_iter().map(|o| o.key));
                seen.extend(page.common_prefixes);
                match page.next_continuation_token {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
            let unique: BTreeSet<_> = seen.iter().cloned().collect();
            assert_eq!(unique.len(), seen.len(), "duplicates at page size {page_size}");
            assert_eq!(
                unique,
                expected.iter().cloned().collect::<BTreeSet<_>>(),
                "page size {page_size}"
            );
        }
    }

    #[tokio::test]
    async fn rejects_garbage_token() {
        let store = seeded(&["a"]).await;
        let mut req = request("", None, 10);
        req.continuation_token = Some("not a token".into());
        let err = store.list_objects("files", req).await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("InvalidArgument"));
    }

    #[tokio::test]
    async fn get_missing_key_fails() {
        let store = seeded(&[]).await;
        let err = store.get_object("files", "nope").await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("NoSuchKey"));
    }

    #[tokio::test]
    async fn get_streams_body() {
        let store = seeded(&["greeting"]).await;
        let object = store.get_object("files", "greeting").await.unwrap();
        assert_eq!(object.content_length, Some(8));
        let chunks: Vec<Bytes> = object.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"greeting");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = seeded(&["a"]).await;
        store.delete_object("files", "a").await.unwrap();
        store.delete_object("files", "a").await.unwrap();
        assert!(!store.contains("files", "a").await);
    }

    #[tokio::test]
    async fn copy_overwrites_target() {
        let store = seeded(&["src", "dst"]).await;
        store.copy_object("files", "src", "files", "dst").await.unwrap();
        assert_eq!(store.read("files", "dst").await.unwrap(), "src");
        assert!(store.contains("files", "src").await);
    }

    #[tokio::test]
    async fn copy_onto_itself_is_rejected() {
        let store = seeded(&["same"]).await;
        let err = store
            .copy_object("files", "same", "files", "same")
            .await
            .unwrap_err();
        assert_eq!(err.code.as_deref(), Some("InvalidRequest"));
        assert_eq!(store.read("files", "same").await.unwrap(), "same");
    }

    #[tokio::test]
    async fn put_file_reads_local_file() {
        let store = seeded(&[]).await;
        let path = std::env::temp_dir().join(format!("memory-put-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"from disk").await.unwrap();

        store
            .put_file("files", "disk.txt", &path, 9, Some("text/plain".into()))
            .await
            .unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        let object = store.get_object("files", "disk.txt").await.unwrap();
        assert_eq!(object.content_type.as_deref(), Some("text/plain"));
        assert_eq!(store.read("files", "disk.txt").await.unwrap(), "from disk");
    }
}

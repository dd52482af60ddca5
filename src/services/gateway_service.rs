//! GatewayService: one method per endpoint, each a single remote call (or a
//! short fixed sequence of calls) against the configured [`ObjectStore`].
//!
//! Input is validated before anything is sent to the store. Remote failures
//! are logged here, at the call site, and returned unchanged.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, error, info};

use crate::{
    errors::{GatewayError, GatewayResult},
    models::{
        object::{BucketObjectEntry, ListingEntry, ListingPage, ObjectEntry, PresignedUrl},
        transfer::{MoveItem, UploadResult},
    },
    services::{
        keys::{self, DELIMITER},
        spool::SpooledFile,
        store::{ListRequest, ObjectStore, ObjectStream, RemoteError},
        transfer,
    },
};

/// Settings the service needs from the process configuration.
#[derive(Clone, Debug)]
pub struct GatewaySettings {
    pub default_bucket: String,
    pub presign_expiry: Duration,
    pub page_size: i32,
    /// Where upload parts are spooled before they are sent to the store.
    pub spool_dir: PathBuf,
}

/// Filters accepted by `list_files`.
#[derive(Clone, Debug, Default)]
pub struct ListFilesParams {
    pub prefix: Option<String>,
    pub token: Option<String>,
    /// Keep only objects modified strictly after this instant (within the page).
    pub modified_after: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct GatewayService {
    pub store: Arc<dyn ObjectStore>,
    pub settings: GatewaySettings,
}

impl GatewayService {
    pub fn new(store: Arc<dyn ObjectStore>, settings: GatewaySettings) -> Self {
        Self { store, settings }
    }

    pub fn default_bucket(&self) -> &str {
        &self.settings.default_bucket
    }

    pub fn spool_dir(&self) -> &Path {
        &self.settings.spool_dir
    }

    /// Read URL valid for the configured window. The object need not exist.
    pub async fn presign(&self, bucket: &str, key: &str) -> GatewayResult<PresignedUrl> {
        keys::ensure_bucket_name(bucket)?;
        keys::ensure_object_key(key)?;
        self.store
            .presign_get(bucket, key, self.settings.presign_expiry)
            .await
            .map_err(|e| remote_failure(e, bucket, key))
    }

    pub async fn list_buckets(&self) -> GatewayResult<Vec<String>> {
        self.store
            .list_buckets()
            .await
            .map_err(|e| remote_failure(e, "", ""))
    }

    /// One page of folder-style listing under `prefix`.
    ///
    /// The `modified_after` filter only applies to the objects of the page
    /// already fetched, so a page may hold fewer objects than the page size
    /// while later pages still have matches. Folders are never filtered.
    pub async fn list_files(
        &self,
        bucket: &str,
        params: ListFilesParams,
    ) -> GatewayResult<ListingPage> {
        keys::ensure_bucket_name(bucket)?;
        let prefix = params.prefix.filter(|p| !p.is_empty());
        if let Some(prefix) = &prefix {
            keys::ensure_prefix(prefix)?;
        }

        let request = ListRequest {
            prefix: prefix.clone(),
            delimiter: Some(DELIMITER.to_string()),
            max_keys: Some(self.settings.page_size),
            continuation_token: params.token.filter(|t| !t.is_empty()),
        };
        let page = self
            .store
            .list_objects(bucket, request)
            .await
            .map_err(|e| remote_failure(e, bucket, prefix.as_deref().unwrap_or("")))?;

        let folders = page.common_prefixes.into_iter().map(ListingEntry::folder);
        let objects = page
            .objects
            .into_iter()
            .filter(|obj| {
                params
                    .modified_after
                    .is_none_or(|after| obj.last_modified > after)
            })
            .map(ListingEntry::Object);

        Ok(ListingPage {
            files: folders.chain(objects).collect(),
            next_token: page.next_continuation_token,
        })
    }

    /// All objects under `prefix` whose key contains `needle` (case-sensitive).
    pub async fn search_files(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        needle: Option<&str>,
    ) -> GatewayResult<Vec<ObjectEntry>> {
        keys::ensure_bucket_name(bucket)?;
        let prefix = prefix.filter(|p| !p.is_empty());
        if let Some(prefix) = prefix {
            keys::ensure_prefix(prefix)?;
        }

        let mut hits = Vec::new();
        let mut token = None;
        loop {
            let request = ListRequest {
                prefix: prefix.map(str::to_string),
                delimiter: None,
                max_keys: None,
                continuation_token: token.take(),
            };
            let page = self
                .store
                .list_objects(bucket, request)
                .await
                .map_err(|e| remote_failure(e, bucket, prefix.unwrap_or("")))?;

            hits.extend(
                page.objects
                    .into_iter()
                    .filter(|obj| needle.is_none_or(|n| obj.key.contains(n))),
            );

            match page.next_continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!(bucket, hits = hits.len(), "search finished");
        Ok(hits)
    }

    /// `search_files` over every visible bucket, one bucket after another.
    pub async fn search_all_buckets(
        &self,
        prefix: Option<&str>,
        needle: Option<&str>,
    ) -> GatewayResult<Vec<BucketObjectEntry>> {
        let mut hits = Vec::new();
        for bucket in self.list_buckets().await? {
            let found = self.search_files(&bucket, prefix, needle).await?;
            hits.extend(found.into_iter().map(|object| BucketObjectEntry {
                bucket: bucket.clone(),
                object,
            }));
        }
        Ok(hits)
    }

    /// Write the zero-byte folder marker. Returns the marker key.
    pub async fn create_folder(&self, bucket: &str, folder_name: &str) -> GatewayResult<String> {
        keys::ensure_bucket_name(bucket)?;
        let key = keys::folder_key(folder_name)?;
        self.store
            .put_object(bucket, &key, Bytes::new(), None)
            .await
            .map_err(|e| remote_failure(e, bucket, &key))?;
        info!(bucket, key = %key, "created folder");
        Ok(key)
    }

    /// Start a multi-file upload into `bucket` under `prefix`.
    pub fn begin_upload(&self, bucket: &str, prefix: Option<&str>) -> GatewayResult<UploadBatch> {
        keys::ensure_bucket_name(bucket)?;
        let prefix = prefix.unwrap_or_default();
        keys::ensure_prefix(prefix)?;
        Ok(UploadBatch {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            last_millis: None,
        })
    }

    /// Store one spooled file under `{prefix}{millis}_{filename}`.
    pub async fn upload_file(
        &self,
        batch: &mut UploadBatch,
        filename: &str,
        content_type: Option<String>,
        file: &SpooledFile,
    ) -> GatewayResult<UploadResult> {
        let millis = batch.next_millis();
        let key = keys::upload_key(&batch.prefix, millis, filename)?;
        let size = file.len();
        self.store
            .put_file(&batch.bucket, &key, file.path(), size, content_type)
            .await
            .map_err(|e| remote_failure(e, &batch.bucket, &key))?;
        info!(bucket = %batch.bucket, key = %key, size, "uploaded file");

        Ok(UploadResult {
            url: self.store.object_url(&batch.bucket, &key),
            bucket: batch.bucket.clone(),
            key,
        })
    }

    pub async fn download(&self, bucket: &str, key: &str) -> GatewayResult<ObjectStream> {
        keys::ensure_bucket_name(bucket)?;
        keys::ensure_object_key(key)?;
        self.store
            .get_object(bucket, key)
            .await
            .map_err(|e| remote_failure(e, bucket, key))
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> GatewayResult<()> {
        keys::ensure_bucket_name(bucket)?;
        keys::ensure_object_key(key)?;
        self.store
            .delete_object(bucket, key)
            .await
            .map_err(|e| remote_failure(e, bucket, key))?;
        info!(bucket, key, "deleted object");
        Ok(())
    }

    /// Server-side copy inside one bucket; the target is overwritten.
    pub async fn copy(
        &self,
        bucket: &str,
        source_key: &str,
        target_key: &str,
    ) -> GatewayResult<()> {
        keys::ensure_bucket_name(bucket)?;
        keys::ensure_object_key(source_key)?;
        keys::ensure_object_key(target_key)?;
        self.store
            .copy_object(bucket, source_key, bucket, target_key)
            .await
            .map_err(|e| remote_failure(e, bucket, source_key))?;
        info!(bucket, source_key, target_key, "copied object");
        Ok(())
    }

    /// Validate every item, then move them one by one.
    ///
    /// An item whose target is its own source is rejected: copy-then-delete
    /// would remove the object.
    pub async fn move_files(&self, items: Vec<MoveItem>) -> GatewayResult<usize> {
        if items.is_empty() {
            return Err(GatewayError::missing("files"));
        }
        for item in &items {
            keys::ensure_bucket_name(&item.source_bucket)?;
            keys::ensure_bucket_name(&item.target_bucket)?;
            keys::ensure_object_key(&item.source_key)?;
            keys::ensure_object_key(&item.target_key)?;
            if item.source_bucket == item.target_bucket && item.source_key == item.target_key {
                return Err(GatewayError::InvalidRequest(format!(
                    "cannot move `{}/{}` onto itself",
                    item.source_bucket, item.source_key
                )));
            }
        }
        let moved = transfer::move_batch(self.store.as_ref(), &items).await?;
        info!(moved, "move batch complete");
        Ok(moved)
    }

    /// Move `key` to `archive/{key}` within `bucket`. Returns the archived key.
    pub async fn archive(&self, bucket: &str, key: &str) -> GatewayResult<String> {
        keys::ensure_bucket_name(bucket)?;
        let archived = keys::archive_key(key)?;
        let item = MoveItem {
            source_bucket: bucket.to_string(),
            source_key: key.to_string(),
            target_bucket: bucket.to_string(),
            target_key: archived.clone(),
        };
        transfer::move_batch(self.store.as_ref(), std::slice::from_ref(&item)).await?;
        info!(bucket, key, archived = %archived, "archived object");
        Ok(archived)
    }
}

/// Key-generation state for one multi-file upload request.
///
/// Timestamps are strictly increasing inside a batch so two files with the
/// same name uploaded in the same millisecond still get distinct keys.
#[derive(Debug)]
pub struct UploadBatch {
    bucket: String,
    prefix: String,
    last_millis: Option<i64>,
}

impl UploadBatch {
    fn next_millis(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let next = match self.last_millis {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_millis = Some(next);
        next
    }
}

fn remote_failure(err: RemoteError, bucket: &str, key: &str) -> GatewayError {
    error!(
        operation = err.operation,
        code = err.code.as_deref().unwrap_or("-"),
        bucket,
        key,
        error = %err.message,
        "object store call failed"
    );
    GatewayError::Remote(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::MemoryStore;
    use chrono::TimeZone;

    async fn service() -> (GatewayService, MemoryStore) {
        let store = MemoryStore::with_buckets(["files"]).await;
        let svc = GatewayService::new(
            Arc::new(store.clone()),
            GatewaySettings {
                default_bucket: "files".into(),
                presign_expiry: Duration::from_secs(3600),
                page_size: 2,
                spool_dir: std::env::temp_dir(),
            },
        );
        (svc, store)
    }

    #[test]
    fn upload_batch_timestamps_increase() {
        let mut batch = UploadBatch {
            bucket: "files".into(),
            prefix: String::new(),
            last_millis: Some(i64::MAX - 10),
        };
        let first = batch.next_millis();
        let second = batch.next_millis();
        assert_eq!(first, i64::MAX - 9);
        assert_eq!(second, i64::MAX - 8);
    }

    #[tokio::test]
    async fn list_filter_is_per_page() {
        let (svc, store) = service().await;
        let old = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        store.insert_at("files", "a", "1", old).await.unwrap();
        store.insert_at("files", "b", "2", old).await.unwrap();
        store.insert_at("files", "c", "3", new).await.unwrap();

        let params = ListFilesParams {
            modified_after: Some(old),
            ..Default::default()
        };
        let first = svc.list_files("files", params.clone()).await.unwrap();
        assert!(first.files.is_empty());
        let token = first.next_token.expect("more pages");

        let second = svc
            .list_files(
                "files",
                ListFilesParams {
                    token: Some(token),
                    ..params
                },
            )
            .await
            .unwrap();
        let keys: Vec<_> = second.files.iter().map(ListingEntry::key).collect();
        assert_eq!(keys, ["c"]);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn search_follows_every_page() {
        let (svc, store) = service().await;
        let keys = [
            "logs/app.log",
            "logs/db.log",
            "logs/app.txt",
            "img/app.png",
            "logs/x/app.log",
        ];
        for key in keys {
            store.insert_at("files", key, "", Utc::now()).await.unwrap();
        }

        let hits = svc
            .search_files("files", Some("logs/"), Some("app"))
            .await
            .unwrap();
        let keys: Vec<_> = hits.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, ["logs/app.log", "logs/app.txt", "logs/x/app.log"]);

        // case-sensitive containment
        let hits = svc.search_files("files", None, Some("APP")).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_store() {
        let (svc, store) = service().await;
        assert!(matches!(
            svc.create_folder("files", "/").await,
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(matches!(
            svc.delete("Bad_Bucket", "k").await,
            Err(GatewayError::InvalidBucketName { .. })
        ));
        assert!(matches!(
            svc.copy("files", "a", "../b").await,
            Err(GatewayError::InvalidKey { .. })
        ));
        let listing = store
            .list_objects("files", ListRequest::default())
            .await
            .unwrap();
        assert!(listing.objects.is_empty());
    }

    #[tokio::test]
    async fn archive_moves_under_archive_prefix() {
        let (svc, store) = service().await;
        store.insert_at("files", "reports/q1.pdf", "pdf", Utc::now()).await.unwrap();

        let archived = svc.archive("files", "reports/q1.pdf").await.unwrap();
        assert_eq!(archived, "archive/reports/q1.pdf");
        assert!(!store.contains("files", "reports/q1.pdf").await);
        assert_eq!(store.read("files", &archived).await.unwrap(), "pdf");
    }

    #[tokio::test]
    async fn move_onto_itself_is_rejected_before_any_call() {
        let (svc, store) = service().await;
        store.insert_at("files", "a", "keep", Utc::now()).await.unwrap();
        store.insert_at("files", "b", "B", Utc::now()).await.unwrap();

        let items = vec![
            MoveItem {
                source_bucket: "files".into(),
                source_key: "b".into(),
                target_bucket: "files".into(),
                target_key: "c".into(),
            },
            MoveItem {
                source_bucket: "files".into(),
                source_key: "a".into(),
                target_bucket: "files".into(),
                target_key: "a".into(),
            },
        ];
        assert!(matches!(
            svc.move_files(items).await,
            Err(GatewayError::InvalidRequest(_))
        ));
        assert_eq!(store.read("files", "a").await.unwrap(), "keep");
        assert!(store.contains("files", "b").await);
        assert!(!store.contains("files", "c").await);
    }

    #[tokio::test]
    async fn upload_sends_spooled_file() {
        let (svc, store) = service().await;
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"part one, ")),
            Ok(Bytes::from_static(b"part two")),
        ]);
        let file = crate::services::spool::spool(svc.spool_dir(), chunks)
            .await
            .unwrap();

        let mut batch = svc.begin_upload("files", Some("in/")).unwrap();
        let uploaded = svc
            .upload_file(&mut batch, "notes.txt", None, &file)
            .await
            .unwrap();
        assert!(uploaded.key.starts_with("in/"));
        assert!(uploaded.key.ends_with("_notes.txt"));
        assert_eq!(
            store.read("files", &uploaded.key).await.unwrap(),
            "part one, part two"
        );
    }
}

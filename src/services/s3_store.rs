//! [`ObjectStore`] backed by `aws-sdk-s3`.

use async_trait::async_trait;
use aws_sdk_s3::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::{ByteStream, DateTime as SmithyDateTime},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::{io, path::Path, time::Duration};
use tracing::debug;

use crate::{
    config::AppConfig,
    models::object::{ObjectEntry, PresignedUrl},
    services::store::{
        ListPage, ListRequest, ObjectStore, ObjectStream, RemoteError, StoreResult, encode_key,
        expiry_from,
    },
};

/// S3 client wrapper
#[derive(Clone)]
pub struct S3Store {
    inner: aws_sdk_s3::Client,
    region: String,
    endpoint_url: Option<String>,
    force_path_style: bool,
}

impl S3Store {
    /// Build a client from the process configuration.
    ///
    /// Credentials come from the SDK's default provider chain.
    pub async fn new(cfg: &AppConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(cfg.region.clone()));
        if let Some(endpoint) = &cfg.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(cfg.force_path_style)
            .build();

        Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            region: cfg.region.clone(),
            endpoint_url: cfg
                .endpoint_url
                .as_ref()
                .map(|e| e.trim_end_matches('/').to_string()),
            force_path_style: cfg.force_path_style,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StoreResult<PresignedUrl> {
        let issued_at = Utc::now();
        let config = PresigningConfig::builder()
            .start_time(issued_at.into())
            .expires_in(expires_in)
            .build()
            .map_err(|e| RemoteError::new("PresignGetObject", None, e.to_string()))?;

        let request = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| remote_error("PresignGetObject", e))?;

        Ok(PresignedUrl {
            url: request.uri().to_string(),
            expires_at: expiry_from(issued_at, expires_in),
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        let key = encode_key(key);
        match &self.endpoint_url {
            Some(endpoint) if self.force_path_style => format!("{endpoint}/{bucket}/{key}"),
            Some(endpoint) => match endpoint.split_once("://") {
                Some((scheme, host)) => format!("{scheme}://{bucket}.{host}/{key}"),
                None => format!("{endpoint}/{bucket}/{key}"),
            },
            None => format!("https://{bucket}.s3.{}.amazonaws.com/{key}", self.region),
        }
    }

    async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        let response = self
            .inner
            .list_buckets()
            .send()
            .await
            .map_err(|e| remote_error("ListBuckets", e))?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn list_objects(&self, bucket: &str, request: ListRequest) -> StoreResult<ListPage> {
        let response = self
            .inner
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(request.prefix)
            .set_delimiter(request.delimiter)
            .set_max_keys(request.max_keys)
            .set_continuation_token(request.continuation_token)
            .send()
            .await
            .map_err(|e| remote_error("ListObjectsV2", e))?;

        let objects = response
            .contents()
            .iter()
            .map(|object| ObjectEntry {
                key: object.key().unwrap_or_default().to_string(),
                last_modified: object
                    .last_modified()
                    .and_then(to_chrono)
                    .unwrap_or_default(),
                size: object.size().unwrap_or(0),
            })
            .collect();

        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        Ok(ListPage {
            objects,
            common_prefixes,
            next_continuation_token: response.next_continuation_token().map(str::to_string),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<()> {
        let size = body.len();
        self.inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(content_type)
            .send()
            .await
            .map_err(|e| remote_error("PutObject", e))?;

        debug!(bucket, key, size, "stored object");
        Ok(())
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        len: u64,
        content_type: Option<String>,
    ) -> StoreResult<()> {
        // the SDK reads the file in chunks as the request body is sent
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| RemoteError::new("PutObject", None, e.to_string()))?;

        self.inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(len as i64)
            .body(body)
            .set_content_type(content_type)
            .send()
            .await
            .map_err(|e| remote_error("PutObject", e))?;

        debug!(bucket, key, size = len, "stored object from spool");
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectStream> {
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| remote_error("GetObject", e))?;

        let content_type = response.content_type().map(str::to_string);
        let content_length = response.content_length();

        // Chunks are pulled from the remote body only as the consumer polls;
        // the first transport error ends the stream.
        let body = stream::unfold(Some(response.body), |state| async move {
            let mut body = state?;
            match body.try_next().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(body))),
                Ok(None) => None,
                Err(err) => Some((Err(io::Error::other(err)), None)),
            }
        })
        .boxed();

        Ok(ObjectStream {
            content_type,
            content_length,
            body,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| remote_error("DeleteObject", e))?;
        Ok(())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
    ) -> StoreResult<()> {
        // copy source: bucket/key, key percent-encoded
        let copy_source = format!("{}/{}", source_bucket, encode_key(source_key));

        self.inner
            .copy_object()
            .copy_source(copy_source)
            .bucket(target_bucket)
            .key(target_key)
            .send()
            .await
            .map_err(|e| remote_error("CopyObject", e))?;
        Ok(())
    }
}

/// Flatten an SDK error into the provider's code and full message chain.
fn remote_error<E>(operation: &'static str, err: SdkError<E>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let code = err.code().map(str::to_string);
    let message = match err.message() {
        Some(message) => message.to_string(),
        None => DisplayErrorContext(&err).to_string(),
    };
    RemoteError::new(operation, code, message)
}

fn to_chrono(dt: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

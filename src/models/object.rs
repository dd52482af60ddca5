//! Objects, listings and access URLs as the gateway reports them.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A plain object returned by a listing.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntry {
    /// Full object key within the bucket.
    pub key: String,

    /// When the object was last written.
    pub last_modified: DateTime<Utc>,

    /// Size in bytes.
    pub size: i64,
}

/// A listing row: either a real object or a common-prefix "folder".
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum ListingEntry {
    Folder {
        key: String,
        #[serde(rename = "isFolder")]
        is_folder: bool,
    },
    Object(ObjectEntry),
}

impl ListingEntry {
    pub fn folder(prefix: impl Into<String>) -> Self {
        Self::Folder {
            key: prefix.into(),
            is_folder: true,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Folder { key, .. } => key,
            Self::Object(entry) => &entry.key,
        }
    }
}

/// One page of `GET /list-files`.
///
/// `next_token` must be passed back verbatim to fetch the following page;
/// `None` marks the end of the listing.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    pub files: Vec<ListingEntry>,
    pub next_token: Option<String>,
}

/// A search hit from the all-buckets search.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BucketObjectEntry {
    pub bucket: String,
    #[serde(flatten)]
    pub object: ObjectEntry,
}

/// A time-limited read URL.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

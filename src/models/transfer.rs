//! Uploads and copy/move batch items.

use serde::{Deserialize, Serialize};

/// Where an uploaded part ended up.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub bucket: String,
    pub key: String,
    pub url: String,
}

/// One entry of a `/move-files` batch.
///
/// A bare string moves the key to the same key in the target bucket.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum MoveFileSpec {
    Key(String),
    #[serde(rename_all = "camelCase")]
    Pair {
        source_key: Option<String>,
        target_key: Option<String>,
    },
}

/// A validated copy-then-delete unit.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoveItem {
    pub source_bucket: String,
    pub source_key: String,
    pub target_bucket: String,
    pub target_key: String,
}

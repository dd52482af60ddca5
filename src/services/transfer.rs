//! Copy-then-delete moves.
//!
//! Items are processed strictly one after another: an item's delete is only
//! issued once its copy succeeded, and the next item only starts once the
//! previous one is fully moved. The first failing step aborts the batch.
//! There is no rollback, so items before the failure stay moved and a retry
//! of the whole batch will re-copy whatever is still at its source.

use std::fmt;
use tracing::{debug, warn};

use crate::{
    errors::{GatewayError, GatewayResult},
    models::transfer::MoveItem,
    services::store::{ObjectStore, RemoteError},
};

/// Step of a single item's move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveStage {
    Copy,
    Delete,
}

impl fmt::Display for MoveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => f.write_str("copy"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Move every item in order. Returns the number of items moved.
pub async fn move_batch(store: &dyn ObjectStore, items: &[MoveItem]) -> GatewayResult<usize> {
    for (moved, item) in items.iter().enumerate() {
        if let Err((stage, source)) = move_one(store, item).await {
            warn!(
                moved,
                %stage,
                source_bucket = %item.source_bucket,
                source_key = %item.source_key,
                target_bucket = %item.target_bucket,
                target_key = %item.target_key,
                error = %source,
                "move batch aborted"
            );
            return Err(GatewayError::MoveAborted {
                moved,
                stage,
                item: item.clone(),
                source,
            });
        }
    }
    Ok(items.len())
}

async fn move_one(
    store: &dyn ObjectStore,
    item: &MoveItem,
) -> Result<(), (MoveStage, RemoteError)> {
    store
        .copy_object(
            &item.source_bucket,
            &item.source_key,
            &item.target_bucket,
            &item.target_key,
        )
        .await
        .map_err(|e| (MoveStage::Copy, e))?;

    store
        .delete_object(&item.source_bucket, &item.source_key)
        .await
        .map_err(|e| (MoveStage::Delete, e))?;

    debug!(
        source_bucket = %item.source_bucket,
        source_key = %item.source_key,
        target_bucket = %item.target_bucket,
        target_key = %item.target_key,
        "moved object"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::MemoryStore;
    use bytes::Bytes;

    fn item(source_key: &str, target_key: &str) -> MoveItem {
        MoveItem {
            source_bucket: "src-bucket".into(),
            source_key: source_key.into(),
            target_bucket: "dst-bucket".into(),
            target_key: target_key.into(),
        }
    }

    async fn store_with(keys: &[&str]) -> MemoryStore {
        let store = MemoryStore::with_buckets(["src-bucket", "dst-bucket"]).await;
        for key in keys {
            store
                .put_object("src-bucket", key, Bytes::from(format!("body of {key}")), None)
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn moves_single_item() {
        let store = store_with(&["a"]).await;
        let moved = move_batch(&store, &[item("a", "b")]).await.unwrap();

        assert_eq!(moved, 1);
        assert!(!store.contains("src-bucket", "a").await);
        assert_eq!(store.read("dst-bucket", "b").await.unwrap(), "body of a");
    }

    #[tokio::test]
    async fn first_failure_stops_the_batch() {
        // `missing` has no source object so its copy fails
        let store = store_with(&["a", "x"]).await;
        let items = [item("a", "b"), item("missing", "m"), item("x", "y")];

        let err = move_batch(&store, &items).await.unwrap_err();
        match err {
            GatewayError::MoveAborted {
                moved, stage, item, ..
            } => {
                assert_eq!(moved, 1);
                assert_eq!(stage, MoveStage::Copy);
                assert_eq!(item.source_key, "missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(!store.contains("src-bucket", "a").await);
        assert!(store.contains("dst-bucket", "b").await);
        assert!(!store.contains("dst-bucket", "m").await);
        assert!(store.contains("src-bucket", "x").await);
        assert!(!store.contains("dst-bucket", "y").await);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = store_with(&[]).await;
        assert_eq!(move_batch(&store, &[]).await.unwrap(), 0);
    }
}

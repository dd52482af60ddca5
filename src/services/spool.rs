//! Spools upload parts through local temp files.
//!
//! A multipart field is written to disk chunk by chunk as it arrives, then
//! handed to the store as a file, so a part is never held in memory whole.

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SpoolError<E> {
    /// The incoming stream failed.
    #[error("reading upload failed: {0}")]
    Source(E),
    #[error("writing spool file failed: {0}")]
    Io(#[from] io::Error),
}

/// A fully written spool file. Removed from disk when dropped.
#[derive(Debug)]
pub struct SpooledFile {
    path: PathBuf,
    len: u64,
}

impl SpooledFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for SpooledFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove spool file");
            }
        }
    }
}

/// Write `stream` to a new temp file under `dir`.
///
/// On any error the partial file is removed before returning.
pub async fn spool<S, E>(dir: &Path, stream: S) -> Result<SpooledFile, SpoolError<E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    fs::create_dir_all(dir).await?;

    let mut spooled = SpooledFile {
        path: dir.join(format!(".upload-{}", Uuid::new_v4())),
        len: 0,
    };
    let mut file = File::create(&spooled.path).await?;

    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(SpoolError::Source)?;
        file.write_all(&chunk).await?;
        spooled.len += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    Ok(spooled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn test_dir() -> PathBuf {
        std::env::temp_dir().join(format!("gateway-spool-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn spools_every_chunk() {
        let dir = test_dir();
        let chunks = stream::iter(vec![
            Ok::<_, io::Error>(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]);

        let spooled = spool(&dir, chunks).await.unwrap();
        assert_eq!(spooled.len(), 11);
        assert_eq!(fs::read(spooled.path()).await.unwrap(), b"hello world");

        let path = spooled.path().to_path_buf();
        drop(spooled);
        assert!(!path.exists());
        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn source_error_leaves_no_file() {
        let dir = test_dir();
        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err("connection reset"),
        ]);

        let err = spool(&dir, chunks).await.unwrap_err();
        assert!(matches!(err, SpoolError::Source("connection reset")));

        let mut entries = fs::read_dir(&dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        fs::remove_dir_all(&dir).await.unwrap();
    }
}

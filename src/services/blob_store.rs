//! src/services/blob_store.rs
//!
//! BlobStore — on-disk payload storage for uploaded images. Payloads are
//! sharded beneath `base_path/{shard}/{shard}/{id}` so no single directory
//! grows unbounded. Metadata lives elsewhere (see `GalleryService`).

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Result of a completed payload write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub size_bytes: i64,
    /// Lowercase hex MD5 of the payload.
    pub etag: String,
}

#[derive(Clone, Debug)]
pub struct BlobStore {
    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,
}

impl BlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Two-level shard identifiers for a blob id: the first two bytes of
    /// MD5(id) as lowercase hex (00–ff).
    fn shards(id: &Uuid) -> (String, String) {
        let digest = md5::compute(id.as_bytes());
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Fully-qualified payload path. Parent directories may not exist yet.
    pub fn blob_path(&self, id: &Uuid) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(id);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(id.simple().to_string());
        path
    }

    /// Stream a payload to disk.
    ///
    /// Bytes go to a temp file next to the final location, which is fsynced
    /// and renamed into place once the stream ends. The temp file is removed
    /// on any error.
    pub async fn write_stream<S>(&self, id: &Uuid, stream: S) -> io::Result<StoredBlob>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let file_path = self.blob_path(id);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::new(ErrorKind::Other, "blob path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(err);
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        debug!("stored blob {} ({} bytes)", id, size_bytes);
        Ok(StoredBlob {
            size_bytes,
            etag: format!("{:x}", digest.compute()),
        })
    }

    /// Convenience wrapper for payloads already held in memory.
    pub async fn write_bytes(&self, id: &Uuid, data: Bytes) -> io::Result<StoredBlob> {
        self.write_stream(id, futures::stream::once(async move { Ok(data) }))
            .await
    }

    /// Open a payload for streaming out. `Ok(None)` when it does not exist.
    pub async fn open(&self, id: &Uuid) -> io::Result<Option<File>> {
        match File::open(self.blob_path(id)).await {
            Ok(file) => Ok(Some(file)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Remove a payload and prune the shard directories it leaves empty.
    /// Missing payloads are not an error.
    pub async fn remove(&self, id: &Uuid) -> io::Result<()> {
        let file_path = self.blob_path(id);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed blob {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", file_path.display());
            }
            Err(err) => return Err(err),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
        Ok(())
    }

    /// Remove empty directories from `start` up to, but not including, `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let id = Uuid::new_v4();

        let stored = store
            .write_bytes(&id, Bytes::from_static(b"jpeg bytes"))
            .await
            .unwrap();
        assert_eq!(stored.size_bytes, 10);
        assert_eq!(stored.etag, format!("{:x}", md5::compute(b"jpeg bytes")));

        let mut file = store.open(&id).await.unwrap().expect("blob present");
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"jpeg bytes");
    }

    #[tokio::test]
    async fn chunked_stream_is_reassembled() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let id = Uuid::new_v4();

        let chunks = vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
            Ok(Bytes::from_static(b"e")),
        ];
        let stored = store
            .write_stream(&id, futures::stream::iter(chunks))
            .await
            .unwrap();
        assert_eq!(stored.size_bytes, 5);
        assert_eq!(fs::read(store.blob_path(&id)).await.unwrap(), b"abcde");
    }

    #[tokio::test]
    async fn failed_stream_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let id = Uuid::new_v4();

        let chunks = vec![
            Ok(Bytes::from_static(b"ab")),
            Err(io::Error::new(ErrorKind::BrokenPipe, "client went away")),
        ];
        let err = store
            .write_stream(&id, futures::stream::iter(chunks))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
        assert!(store.open(&id).await.unwrap().is_none());

        let parent = store.blob_path(&id).parent().unwrap().to_path_buf();
        let mut entries = fs::read_dir(&parent).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_prunes_shard_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let id = Uuid::new_v4();

        store
            .write_bytes(&id, Bytes::from_static(b"x"))
            .await
            .unwrap();
        store.remove(&id).await.unwrap();

        assert!(store.open(&id).await.unwrap().is_none());
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());

        // Second removal is a no-op.
        store.remove(&id).await.unwrap();
    }
}

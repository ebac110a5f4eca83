//! Object store seam and its filesystem implementation.
//!
//! The engine only ever talks to the store through the [`ObjectStore`] trait:
//! existence checks, streamed puts, copies with explicit content type,
//! idempotent deletes, and paginated listing. [`FsObjectStore`] maps keys to
//! paths beneath a configured root directory. Payload durability follows the
//! temp-file, fsync, atomic-rename pattern.

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use futures::{StreamExt, pin_mut, stream::BoxStream};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const MAX_LIST_PAGE: usize = 1000;

/// Byte stream handed to [`ObjectStore::put_object`].
pub type BodyStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a `head_object` or `put_object` call.
#[derive(Clone, Debug)]
pub struct ObjectStat {
    /// Payload size in bytes.
    pub size_bytes: i64,
    /// Hex MD5 of the payload; only populated by `put_object`, which digests
    /// the stream as it writes.
    pub etag: Option<String>,
}

/// One page of a key listing, lexicographically ordered.
#[derive(Debug)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Storage service abstraction the engine moves objects through.
///
/// `delete_object` must be idempotent (deleting an absent key is success) and
/// `copy_object` must apply the given content type rather than inheriting the
/// source's, where the backend records one. Both properties are what make a
/// crashed relocate safe to re-run.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Existence check. `Ok(None)` means the key is absent.
    async fn head_object(&self, key: &str) -> StoreResult<Option<ObjectStat>>;

    /// Stream a payload into the store under `key`, replacing any previous
    /// object there.
    async fn put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: BodyStream,
    ) -> StoreResult<ObjectStat>;

    /// Copy `source_key` to `destination_key`, setting `content_type`
    /// explicitly on the destination.
    async fn copy_object(
        &self,
        source_key: &str,
        destination_key: &str,
        content_type: Option<&str>,
    ) -> StoreResult<()>;

    /// Remove `key`. Removing an absent key is success.
    async fn delete_object(&self, key: &str) -> StoreResult<()>;

    /// List keys under `prefix` (all keys when `None`), lexicographically,
    /// `max_keys` per page, resuming from an opaque continuation token.
    async fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ObjectPage>;
}

/// Reject keys that could escape the store root or confuse the filesystem.
///
/// Disallows empty and oversized keys, absolute paths, `..` traversal, and
/// control characters. Keys produced by the sanitizer always pass; this
/// guards direct callers.
pub fn ensure_key_safe(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StoreError::InvalidObjectKey(key.to_string()));
    }
    if key.starts_with('/') || key.contains("..") {
        return Err(StoreError::InvalidObjectKey(key.to_string()));
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(StoreError::InvalidObjectKey(key.to_string()));
    }
    Ok(())
}

/// Object store backed by a local directory.
///
/// Keys map one-to-one onto relative paths beneath `base_path`. The
/// filesystem carries no media-type metadata, so content types on put/copy
/// are accepted and ignored here; the catalog remains their system of
/// record.
#[derive(Clone)]
pub struct FsObjectStore {
    base_path: PathBuf,
}

impl FsObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        for segment in key.split('/') {
            path.push(segment);
        }
        path
    }

    fn key_for_path(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.base_path).ok()?;
        let segments: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(seg) => Some(seg.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if segments.is_empty() {
            None
        } else {
            Some(segments.join("/"))
        }
    }

    /// Walk the root and collect every object key, sorted.
    async fn collect_keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut stack = vec![self.base_path.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(StoreError::Io(err)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if file_type.is_file() {
                    let name = entry.file_name();
                    if name.to_string_lossy().starts_with(".tmp-") {
                        continue;
                    }
                    if let Some(key) = self.key_for_path(&entry.path()) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Recursively remove empty directories up to the store root.
    ///
    /// Stops on the first non-empty or missing directory.
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = self.base_path.as_path();
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

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    async fn head_object(&self, key: &str) -> StoreResult<Option<ObjectStat>> {
        ensure_key_safe(key)?;
        match fs::metadata(self.object_path(key)).await {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectStat {
                size_bytes: meta.len() as i64,
                etag: None,
            })),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn put_object(
        &self,
        key: &str,
        _content_type: Option<&str>,
        body: BodyStream,
    ) -> StoreResult<ObjectStat> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(body);
        while let Some(chunk_res) = body.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        Ok(ObjectStat {
            size_bytes,
            etag: Some(format!("{:x}", digest.compute())),
        })
    }

    async fn copy_object(
        &self,
        source_key: &str,
        destination_key: &str,
        _content_type: Option<&str>,
    ) -> StoreResult<()> {
        ensure_key_safe(source_key)?;
        ensure_key_safe(destination_key)?;
        let source = self.object_path(source_key);
        let destination = self.object_path(destination_key);

        match fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) | Err(_) => return Err(StoreError::ObjectNotFound(source_key.to_string())),
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&source, &destination).await?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed object {}", key),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("object {} already missing", key);
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ObjectPage> {
        let max_keys = max_keys.clamp(1, MAX_LIST_PAGE);
        let after = continuation_token.map(decode_continuation_token);

        let mut keys: Vec<String> = self
            .collect_keys()
            .await?
            .into_iter()
            .filter(|key| prefix.is_none_or(|p| key.starts_with(p)))
            .filter(|key| after.as_deref().is_none_or(|a| key.as_str() > a))
            .collect();

        let mut is_truncated = false;
        let mut next_continuation_token = None;
        if keys.len() > max_keys {
            keys.truncate(max_keys);
            if let Some(last) = keys.last() {
                next_continuation_token = Some(encode_continuation_token(last));
            }
            is_truncated = true;
        }

        Ok(ObjectPage {
            keys,
            is_truncated,
            next_continuation_token,
        })
    }
}

/// Continuation tokens are opaque to callers; base64 keeps arbitrary key
/// bytes safe to round-trip through reports and CLIs.
fn encode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD.encode(token)
}

fn decode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| token.to_string())
}

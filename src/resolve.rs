//! Current-key resolution for stored objects.
//!
//! Where an object actually lives can disagree with what the catalog says,
//! especially for legacy records. [`KeyResolver`] runs an ordered chain of
//! independent [`ResolveStrategy`] implementations and returns the first
//! candidate that is confirmed to exist in the store. A candidate that can be
//! constructed but does not exist is never returned. Exhausting the chain
//! yields `None`; callers treat that as "cannot relocate, skip and flag",
//! never as fatal.

use crate::models::object::StoredObject;
use crate::services::object_store::{ObjectStore, StoreResult};
use tracing::debug;

/// Default cap on how many store entries the listing fallback may examine.
pub const DEFAULT_SCAN_CAP: usize = 10_000;

const SCAN_PAGE_SIZE: usize = 1000;

/// One way of locating an object's current key.
///
/// Strategies are independent and individually testable; the resolver only
/// relies on `try_resolve` returning a confirmed-existing key or `None`.
#[async_trait::async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn try_resolve(
        &self,
        store: &dyn ObjectStore,
        object: &StoredObject,
    ) -> StoreResult<Option<String>>;
}

/// Strategy 1: the key the catalog already records, if it still exists.
struct RecordedKey;

#[async_trait::async_trait]
impl ResolveStrategy for RecordedKey {
    fn name(&self) -> &'static str {
        "recorded-key"
    }

    async fn try_resolve(
        &self,
        store: &dyn ObjectStore,
        object: &StoredObject,
    ) -> StoreResult<Option<String>> {
        let key = object.current_key.as_str();
        if key.is_empty() {
            return Ok(None);
        }
        Ok(store.head_object(key).await?.map(|_| key.to_string()))
    }
}

/// Strategy 2: a key recovered from the object's public URL, when the URL is
/// under the configured base and therefore encodes the key unambiguously.
struct PublicUrl {
    base: Option<String>,
}

#[async_trait::async_trait]
impl ResolveStrategy for PublicUrl {
    fn name(&self) -> &'static str {
        "public-url"
    }

    async fn try_resolve(
        &self,
        store: &dyn ObjectStore,
        object: &StoredObject,
    ) -> StoreResult<Option<String>> {
        let (Some(base), Some(url)) = (self.base.as_deref(), object.url.as_deref()) else {
            return Ok(None);
        };
        let Some(rest) = url.strip_prefix(base.trim_end_matches('/')) else {
            return Ok(None);
        };
        let key = rest.trim_start_matches('/');
        if key.is_empty() {
            return Ok(None);
        }
        Ok(store.head_object(key).await?.map(|_| key.to_string()))
    }
}

/// Strategy 3: the legacy flat naming convention `{content_hash}.{ext}`,
/// which initial placements without an established context still use.
struct HashConvention;

#[async_trait::async_trait]
impl ResolveStrategy for HashConvention {
    fn name(&self) -> &'static str {
        "hash-convention"
    }

    async fn try_resolve(
        &self,
        store: &dyn ObjectStore,
        object: &StoredObject,
    ) -> StoreResult<Option<String>> {
        if object.content_hash.is_empty() {
            return Ok(None);
        }
        let key = if object.extension.is_empty() {
            object.content_hash.clone()
        } else {
            format!("{}.{}", object.content_hash, object.extension)
        };
        Ok(store.head_object(&key).await?.map(|_| key))
    }
}

/// Strategy 4: bounded paginated search of the store for a key containing the
/// object's content hash. Last resort; capped so a huge store cannot turn one
/// unresolvable object into a full scan.
struct BoundedScan {
    cap: usize,
}

#[async_trait::async_trait]
impl ResolveStrategy for BoundedScan {
    fn name(&self) -> &'static str {
        "bounded-scan"
    }

    async fn try_resolve(
        &self,
        store: &dyn ObjectStore,
        object: &StoredObject,
    ) -> StoreResult<Option<String>> {
        if object.content_hash.is_empty() {
            return Ok(None);
        }
        let mut scanned = 0usize;
        let mut token: Option<String> = None;
        loop {
            let page = store
                .list_objects(None, token.as_deref(), SCAN_PAGE_SIZE)
                .await?;
            for key in &page.keys {
                if key.contains(&object.content_hash) {
                    return Ok(Some(key.clone()));
                }
            }
            scanned += page.keys.len();
            match page.next_continuation_token {
                Some(next) if scanned < self.cap => token = Some(next),
                _ => return Ok(None),
            }
        }
    }
}

/// Ordered chain of resolve strategies.
pub struct KeyResolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl KeyResolver {
    /// Standard chain: recorded key, then public URL (when a base URL is
    /// configured), then the hash naming convention, then the bounded scan.
    pub fn new(public_base_url: Option<String>, scan_cap: usize) -> Self {
        Self {
            strategies: vec![
                Box::new(RecordedKey),
                Box::new(PublicUrl {
                    base: public_base_url,
                }),
                Box::new(HashConvention),
                Box::new(BoundedScan { cap: scan_cap }),
            ],
        }
    }

    /// Resolve where `object` currently lives, or `None` when every strategy
    /// is exhausted.
    pub async fn resolve_current_key(
        &self,
        store: &dyn ObjectStore,
        object: &StoredObject,
    ) -> StoreResult<Option<String>> {
        for strategy in &self.strategies {
            if let Some(key) = strategy.try_resolve(store, object).await? {
                debug!("resolved object {} via {}: {}", object.id, strategy.name(), key);
                return Ok(Some(key));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::object_store::{BodyStream, FsObjectStore};
    use bytes::Bytes;
    use chrono::Utc;
    use futures::{StreamExt, stream};
    use uuid::Uuid;

    fn body(bytes: &'static [u8]) -> BodyStream {
        stream::iter(vec![Ok(Bytes::from_static(bytes))]).boxed()
    }

    fn object(key: &str, url: Option<&str>, hash: &str) -> StoredObject {
        StoredObject {
            id: Uuid::new_v4(),
            logical_name: "notes".into(),
            extension: "pdf".into(),
            content_type: None,
            content_hash: hash.into(),
            current_key: key.into(),
            url: url.map(String::from),
            size_bytes: 1,
            last_modified: Utc::now(),
        }
    }

    async fn store_with(keys: &[&str]) -> (tempfile::TempDir, FsObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        for key in keys {
            store.put_object(key, None, body(b"x")).await.unwrap();
        }
        (dir, store)
    }

    #[tokio::test]
    async fn recorded_key_wins_when_it_exists() {
        let (_dir, store) = store_with(&["a/b/notes.pdf"]).await;
        let resolver = KeyResolver::new(None, DEFAULT_SCAN_CAP);
        let obj = object("a/b/notes.pdf", None, "deadbeef");

        let key = resolver.resolve_current_key(&store, &obj).await.unwrap();
        assert_eq!(key.as_deref(), Some("a/b/notes.pdf"));
    }

    #[tokio::test]
    async fn stale_recorded_key_falls_through_to_url() {
        let (_dir, store) = store_with(&["real/place/notes.pdf"]).await;
        let resolver = KeyResolver::new(Some("http://cdn".into()), DEFAULT_SCAN_CAP);
        let obj = object(
            "gone/notes.pdf",
            Some("http://cdn/real/place/notes.pdf"),
            "deadbeef",
        );

        let key = resolver.resolve_current_key(&store, &obj).await.unwrap();
        assert_eq!(key.as_deref(), Some("real/place/notes.pdf"));
    }

    #[tokio::test]
    async fn url_outside_the_base_is_ignored() {
        let (_dir, store) = store_with(&["deadbeef.pdf"]).await;
        let resolver = KeyResolver::new(Some("http://cdn".into()), DEFAULT_SCAN_CAP);
        let obj = object("", Some("http://elsewhere/notes.pdf"), "deadbeef");

        // Falls through to the hash convention.
        let key = resolver.resolve_current_key(&store, &obj).await.unwrap();
        assert_eq!(key.as_deref(), Some("deadbeef.pdf"));
    }

    #[tokio::test]
    async fn bounded_scan_finds_hash_embedded_keys() {
        let (_dir, store) = store_with(&["archive/2019/deadbeef-notes.pdf", "other.pdf"]).await;
        let resolver = KeyResolver::new(None, DEFAULT_SCAN_CAP);
        let obj = object("", None, "deadbeef");

        let key = resolver.resolve_current_key(&store, &obj).await.unwrap();
        assert_eq!(key.as_deref(), Some("archive/2019/deadbeef-notes.pdf"));
    }

    #[tokio::test]
    async fn exhausted_chain_reports_none() {
        let (_dir, store) = store_with(&["unrelated.bin"]).await;
        let resolver = KeyResolver::new(Some("http://cdn".into()), DEFAULT_SCAN_CAP);
        let obj = object("gone.pdf", Some("http://cdn/also-gone.pdf"), "deadbeef");

        let key = resolver.resolve_current_key(&store, &obj).await.unwrap();
        assert!(key.is_none());
    }

    #[tokio::test]
    async fn empty_hash_never_matches_everything() {
        let (_dir, store) = store_with(&["anything.pdf"]).await;
        let resolver = KeyResolver::new(None, DEFAULT_SCAN_CAP);
        let obj = object("", None, "");

        let key = resolver.resolve_current_key(&store, &obj).await.unwrap();
        assert!(key.is_none());
    }
}

//! Content-addressed image cache.
//!
//! Resolves a candidate image URL to either the untouched original URL
//! (small images are served from their origin), a cache key naming a
//! size-normalized padded rendition, or a clean failure. The cache key is
//! the sha256 of the source URL, so a given URL maps to exactly one key
//! for the lifetime of the cache and concurrent writers are idempotent.
//!
//! Lookup order: local cache file, then (optionally) the remote blob
//! store, then a genuine recompute through the sandboxed codec. The local
//! hit path performs no fetch at all.

use crate::error::{CacheError, FetchError};
use crate::fetch::HttpFetcher;
use crate::images::thumbnail::{pad_path, PadCodec};
use crate::models::sha256_hex;
use crate::store::BlobStore;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

/// Hard ceiling on source image downloads; anything bigger is unusable.
const IMAGE_FETCH_CEILING: usize = 5_000_000;

/// Fetch seam so tests can feed bytes without a network.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.get_with_max_size(url, IMAGE_FETCH_CEILING).await
    }
}

/// Outcome of a successful cache resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedImage {
    /// Image was small enough to serve from its origin; URL unchanged.
    Original(String),
    /// Cache key of the padded rendition; the caller joins it onto the
    /// delivery base URL.
    Key(String),
}

/// Service object owning one cache namespace.
///
/// The article pipeline and the cover resolver each construct their own
/// with a different namespace and `force_upload` policy.
pub struct ImageCache {
    fetcher: Arc<dyn ImageFetcher>,
    codec: Arc<dyn PadCodec>,
    store: Option<Arc<dyn BlobStore>>,
    cache_dir: PathBuf,
    namespace: String,
    /// Cache even images under the size threshold. The cover path sets
    /// this: covers must always resolve to a stable CDN key, so the
    /// small-image pass-through is explicitly bypassed.
    force_upload: bool,
    cache_threshold_bytes: usize,
}

impl ImageCache {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        codec: Arc<dyn PadCodec>,
        store: Option<Arc<dyn BlobStore>>,
        cache_dir: impl Into<PathBuf>,
        namespace: impl Into<String>,
        force_upload: bool,
        cache_threshold_bytes: usize,
    ) -> Self {
        Self {
            fetcher,
            codec,
            store,
            cache_dir: cache_dir.into(),
            namespace: namespace.into(),
            force_upload,
            cache_threshold_bytes,
        }
    }

    /// Cache key for a source URL: `sha256(url).jpg`.
    pub fn cache_key(url: &str) -> String {
        format!("{}.jpg", sha256_hex(url))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn remote_key(&self, cache_key: &str) -> String {
        format!("{}/{}.pad", self.namespace, cache_key)
    }

    /// Resolve a source image URL.
    ///
    /// # Returns
    ///
    /// [`CachedImage::Original`] when the image is under the threshold and
    /// caching is not forced; [`CachedImage::Key`] when a padded rendition
    /// exists (or was just produced) under the content-addressed key.
    ///
    /// # Errors
    ///
    /// Fetch failures, codec faults, and store failures. The caller treats
    /// any error as "this article has no image"; it never retries inline.
    pub async fn cache_image(&self, url: &str) -> Result<CachedImage, CacheError> {
        let cache_key = Self::cache_key(url);
        let cache_path = self.cache_dir.join(&cache_key);

        // Local hit: no fetch, no encode.
        if fs::try_exists(pad_path(&cache_path)).await? {
            debug!(url, cache_key, "Image cache local hit");
            return Ok(CachedImage::Key(cache_key));
        }

        let bytes = self.fetcher.fetch(url).await?;
        if bytes.len() <= self.cache_threshold_bytes && !self.force_upload {
            return Ok(CachedImage::Original(url.to_string()));
        }

        // Remote hit: some other run already encoded this key.
        if let Some(store) = &self.store {
            match store.exists(&self.remote_key(&cache_key)).await {
                Ok(true) => {
                    debug!(url, cache_key, "Image cache remote hit");
                    return Ok(CachedImage::Key(cache_key));
                }
                Ok(false) => {}
                Err(e) => return Err(CacheError::Remote(e)),
            }
        }

        self.codec.resize_and_pad(bytes, &cache_path).await?;

        if let Some(store) = &self.store {
            let encoded = fs::read(pad_path(&cache_path)).await?;
            store
                .put(&self.remote_key(&cache_key), encoded, "image/jpeg")
                .await
                .map_err(CacheError::Remote)?;
        }

        Ok(CachedImage::Key(cache_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsBlobStore;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        bytes: Vec<u8>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ImageFetcher for StubFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.bytes.clone())
        }
    }

    struct StubCodec {
        encodes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PadCodec for StubCodec {
        async fn resize_and_pad(
            &self,
            image_bytes: Vec<u8>,
            cache_path: &Path,
        ) -> Result<(), CacheError> {
            self.encodes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CacheError::Codec {
                    url: cache_path.display().to_string(),
                });
            }
            if let Some(parent) = cache_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(pad_path(cache_path), image_bytes).await?;
            Ok(())
        }
    }

    fn cache_with(
        bytes: Vec<u8>,
        fail_codec: bool,
        store: Option<Arc<dyn BlobStore>>,
        dir: &Path,
        force_upload: bool,
    ) -> (ImageCache, Arc<StubFetcher>, Arc<StubCodec>) {
        let fetcher = Arc::new(StubFetcher {
            bytes,
            fetches: AtomicUsize::new(0),
        });
        let codec = Arc::new(StubCodec {
            encodes: AtomicUsize::new(0),
            fail: fail_codec,
        });
        let cache = ImageCache::new(
            fetcher.clone(),
            codec.clone(),
            store,
            dir,
            "brave-today/cache",
            force_upload,
            1_000,
        );
        (cache, fetcher, codec)
    }

    #[tokio::test]
    async fn test_small_image_passes_through_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _, codec) = cache_with(vec![0u8; 100], false, None, dir.path(), false);

        let resolved = cache.cache_image("https://example.com/tiny.png").await.unwrap();
        assert_eq!(
            resolved,
            CachedImage::Original("https://example.com/tiny.png".to_string())
        );
        assert_eq!(codec.encodes.load(Ordering::SeqCst), 0);
        // no cache file was created
        let key = ImageCache::cache_key("https://example.com/tiny.png");
        assert!(!dir.path().join(format!("{key}.pad")).exists());
    }

    #[tokio::test]
    async fn test_force_upload_caches_small_image() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _, codec) = cache_with(vec![0u8; 100], false, None, dir.path(), true);

        let resolved = cache.cache_image("https://example.com/icon.png").await.unwrap();
        let key = ImageCache::cache_key("https://example.com/icon.png");
        assert_eq!(resolved, CachedImage::Key(key));
        assert_eq!(codec.encodes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_call_hits_local_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, fetcher, codec) = cache_with(vec![0u8; 5_000], false, None, dir.path(), false);

        let first = cache.cache_image("https://example.com/big.jpg").await.unwrap();
        let second = cache.cache_image("https://example.com/big.jpg").await.unwrap();
        assert_eq!(first, second);
        // encode ran once, and the local hit skipped the second fetch
        assert_eq!(codec.encodes.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_hit_skips_encode() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(store_dir.path()));

        let key = ImageCache::cache_key("https://example.com/big.jpg");
        store
            .put(
                &format!("brave-today/cache/{key}.pad"),
                vec![1],
                "image/jpeg",
            )
            .await
            .unwrap();

        let (cache, _, codec) = cache_with(vec![0u8; 5_000], false, Some(store), dir.path(), false);
        let resolved = cache.cache_image("https://example.com/big.jpg").await.unwrap();
        assert_eq!(resolved, CachedImage::Key(key));
        assert_eq!(codec.encodes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_encode_result_is_uploaded() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(store_dir.path()));

        let (cache, _, _) =
            cache_with(vec![7u8; 5_000], false, Some(store.clone()), dir.path(), false);
        let resolved = cache.cache_image("https://example.com/big.jpg").await.unwrap();

        let CachedImage::Key(key) = resolved else {
            panic!("expected a cache key");
        };
        let uploaded = store
            .get(&format!("brave-today/cache/{key}.pad"))
            .await
            .unwrap();
        assert_eq!(uploaded, Some(vec![7u8; 5_000]));
    }

    #[tokio::test]
    async fn test_codec_fault_is_a_clean_error() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _, _) = cache_with(vec![0u8; 5_000], true, None, dir.path(), false);
        let err = cache.cache_image("https://example.com/bad.jpg").await;
        assert!(matches!(err, Err(CacheError::Codec { .. })));
    }

    #[test]
    fn test_cache_key_is_stable_and_content_addressed() {
        let a = ImageCache::cache_key("https://example.com/a.jpg");
        let b = ImageCache::cache_key("https://example.com/a.jpg");
        let c = ImageCache::cache_key("https://example.com/c.jpg");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with(".jpg"));
    }
}

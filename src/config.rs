//! Runtime configuration for the aggregation pipeline.
//!
//! Everything that used to be ambient (HTTP session defaults, cache
//! directories, CDN base URLs, concurrency limits) lives on one explicit
//! [`Config`] value constructed in `main` and passed by reference to the
//! services that need it.

use std::path::PathBuf;
use std::time::Duration;

/// Browser-like UA; several publishers reject obvious bot agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/107.0.0.0 Safari/537.36";

/// Pipeline-wide settings with env-overridable defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the private CDN that serves cached images.
    pub pcdn_url_base: String,
    /// Blob-store namespace for per-article cached images.
    pub cache_namespace: String,
    /// Blob-store namespace for cover images.
    pub cover_namespace: String,
    /// Local directory for encoded image cache files.
    pub img_cache_dir: PathBuf,
    /// Local directory for raw downloaded cover icon candidates.
    pub icon_cache_dir: PathBuf,
    /// Path to the `wasm_thumbnail` codec module.
    pub wasm_thumbnail_path: PathBuf,
    /// Root directory of the filesystem blob store.
    pub blob_store_dir: PathBuf,
    /// Skip all blob-store traffic (local runs, CI).
    pub no_upload: bool,
    /// Per-request timeout for all HTTP fetches.
    pub request_timeout: Duration,
    /// Timeout for the unshortening redirect-follow.
    pub unshorten_timeout: Duration,
    /// Byte ceiling for feed downloads.
    pub max_feed_bytes: usize,
    /// Byte threshold above which source images are re-encoded and cached.
    pub max_image_bytes: usize,
    /// Worker cap for network-bound stages.
    pub io_concurrency: usize,
    /// Worker cap for parse/codec stages.
    pub cpu_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            pcdn_url_base: env_or("PCDN_URL_BASE", "https://pcdn.brave.software"),
            cache_namespace: "brave-today/cache".to_string(),
            cover_namespace: "brave-today/cover_images".to_string(),
            img_cache_dir: PathBuf::from(env_or("IMG_CACHE_DIR", "output/feed/cache")),
            icon_cache_dir: PathBuf::from(env_or("ICON_CACHE_DIR", ".cache")),
            wasm_thumbnail_path: PathBuf::from(env_or(
                "WASM_THUMBNAIL_PATH",
                "wasm_thumbnail.wasm",
            )),
            blob_store_dir: PathBuf::from(env_or("BLOB_STORE_DIR", "output/blobs")),
            no_upload: std::env::var("NO_UPLOAD").is_ok(),
            request_timeout: Duration::from_secs(30),
            unshorten_timeout: Duration::from_secs(5),
            max_feed_bytes: 10_000_000,
            max_image_bytes: 1_000_000,
            io_concurrency: 64,
            cpu_concurrency: cpus,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Public delivery URL for a cached image key, e.g.
    /// `{pcdn_url_base}/{namespace}/{key}.pad`. The exact join is client
    /// ABI; do not change the separator or suffix.
    pub fn padded_image_url(&self, namespace: &str, cache_key: &str) -> String {
        format!("{}/{}/{}.pad", self.pcdn_url_base, namespace, cache_key)
    }
}

//! Data models for publishers, articles, and pipeline artifacts.
//!
//! This module defines the durable shapes flowing through the pipeline:
//! - [`Publisher`]: one configured feed source with its ingestion policy
//! - [`Article`]: one normalized unit of output content
//! - [`FeedStats`]: per-feed get/insert counters for the diagnostic report
//! - [`CoverInfo`]: per-domain cover image + background color enrichment
//!
//! `Article` is serialized verbatim into the output feed artifact, so its
//! field names and formats are client ABI.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content hash used for publisher ids, dedup keys, and cache keys.
///
/// # Arguments
///
/// * `input` - The string to hash (a canonical feed URL or a final article URL)
///
/// # Returns
///
/// Lowercase hex sha256 digest of the UTF-8 bytes.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// What kind of entries a publisher emits. Governs type-specific fields
/// and whether the recency window applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Article,
    Audio,
    Product,
}

/// A configured feed source and its ingestion policy.
///
/// Constructed once per run from the publisher list and never mutated.
/// `publisher_id` is the sha256 of the canonical feed URL (the original
/// feed when the visible URL is a rename), so it stays stable across
/// feed-URL changes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Publisher {
    pub feed_url: String,
    #[serde(default)]
    pub publisher_id: String,
    pub publisher_name: String,
    pub category: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub creative_instance_id: String,
    /// Hostnames an article's final URL must match. See
    /// [`crate::normalize::domain_allowed`] for the matching rule.
    pub destination_domains: Vec<String>,
    /// Primary site domain, used by the cover pass when set.
    #[serde(default)]
    pub publisher_domain: Option<String>,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Force an Open-Graph image lookup even when the feed supplied one.
    #[serde(default)]
    pub og_images: bool,
    /// Canonical feed URL before any rename; basis of `publisher_id`.
    #[serde(default)]
    pub original_feed: Option<String>,
    #[serde(default)]
    pub favicon_url: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub rank: Option<u32>,
}

fn default_max_entries() -> usize {
    20
}

impl Publisher {
    /// Fill in `publisher_id` when the source list omits it.
    pub fn ensure_publisher_id(&mut self) {
        if self.publisher_id.is_empty() {
            let canonical = self.original_feed.as_deref().unwrap_or(&self.feed_url);
            self.publisher_id = sha256_hex(canonical);
        }
    }
}

/// An audio enclosure carried through for `content_type == audio`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Enclosure {
    pub url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub length: Option<u64>,
}

/// One normalized article destined for the output feed.
///
/// Created by the normalizer, enriched by the image stages, finalized by
/// scoring; immutable after the final sort.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Article {
    pub title: String,
    pub description: String,
    /// Final, unshortened, percent-encoded URL. Holds the raw feed link
    /// until the unshorten stage replaces it.
    pub url: String,
    /// sha256 of `url`; the dedup key. Empty before unshortening.
    pub url_hash: String,
    pub img: Option<String>,
    pub padded_img: Option<String>,
    /// UTC, second precision, `%Y-%m-%d %H:%M:%S`.
    pub publish_time: String,
    pub category: String,
    pub content_type: ContentType,
    pub publisher_id: String,
    pub publisher_name: String,
    pub creative_instance_id: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosures: Option<Vec<Enclosure>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offers_category: Option<String>,
}

/// Per-feed counters for the diagnostic report.
///
/// `size_after_get` is how many raw entries the feed yielded;
/// `size_after_insert` is how many survived normalization. Insert can never
/// exceed get; the external consistency checker enforces it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FeedStats {
    pub size_after_get: usize,
    pub size_after_insert: usize,
}

/// Per-domain cover enrichment produced by the `covers` pass.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoverInfo {
    pub cover_url: Option<String>,
    pub background_color: Option<String>,
}

//! Feed download and parsing.
//!
//! Downloads one publisher feed with a byte ceiling and a plain-HTTP
//! fallback, parses it tolerantly with `feed-rs`, and flattens each entry
//! into a parser-agnostic [`RawEntry`] that the normalizer consumes.
//! A feed that fails to download, fails to parse, or parses to zero
//! entries is a per-feed failure: the publisher is skipped and the run
//! continues.

use crate::error::FeedError;
use crate::fetch::HttpFetcher;
use crate::models::Enclosure;
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use tracing::debug;

/// An image reference from a feed's media list.
#[derive(Debug, Clone)]
pub struct MediaRef {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// One feed item, flattened out of the parser's model.
///
/// Transient: discarded once the normalizer has produced (or rejected)
/// an article from it.
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    /// Summary HTML as-is; may contain `<img>` tags.
    pub summary: Option<String>,
    /// Body of the first content block, HTML as-is.
    pub content: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// Explicit entry-level image. feed-rs's unified model has no such
    /// slot — formats that declare one (JSON Feed's `image`) arrive
    /// through `media` instead — so [`flatten_entry`] leaves this `None`
    /// and it is only filled by ingest paths that carry one directly.
    pub image: Option<String>,
    pub media_content: Vec<MediaRef>,
    pub media_thumbnails: Vec<MediaRef>,
    pub enclosures: Vec<Enclosure>,
    pub categories: Vec<String>,
}

/// The parsed result of one feed download.
#[derive(Debug)]
pub struct ParsedFeed {
    pub entries: Vec<RawEntry>,
}

/// Download and parse one publisher feed.
///
/// Applies the feed byte ceiling and the HTTPS→HTTP retry, then parses.
/// Zero parseable entries is treated as a failure so the report shows the
/// feed as broken rather than merely quiet.
pub async fn download_feed(
    fetcher: &HttpFetcher,
    feed_url: &str,
    max_bytes: usize,
) -> Result<ParsedFeed, FeedError> {
    let bytes = fetcher
        .get_with_scheme_fallback(feed_url, max_bytes)
        .await
        .map_err(FeedError::Download)?;

    let feed = feed_rs::parser::parse(&bytes[..])?;
    if feed.entries.is_empty() {
        return Err(FeedError::Empty {
            url: feed_url.to_string(),
        });
    }

    let entries: Vec<RawEntry> = feed.entries.into_iter().map(flatten_entry).collect();
    debug!(feed_url, entries = entries.len(), "Parsed feed");
    Ok(ParsedFeed { entries })
}

/// Flatten a `feed-rs` entry into a [`RawEntry`].
pub fn flatten_entry(entry: Entry) -> RawEntry {
    let link = pick_link(&entry);

    let mut media_content = Vec::new();
    let mut media_thumbnails = Vec::new();
    let mut enclosures = Vec::new();
    for media in &entry.media {
        for content in &media.content {
            let Some(url) = content.url.as_ref() else {
                continue;
            };
            let is_audio = content
                .content_type
                .as_ref()
                .map(|m| m.ty().as_str() == "audio")
                .unwrap_or(false);
            if is_audio {
                enclosures.push(Enclosure {
                    url: url.to_string(),
                    mime_type: content.content_type.as_ref().map(|m| m.to_string()),
                    length: content.size,
                });
            } else {
                media_content.push(MediaRef {
                    url: url.to_string(),
                    width: content.width,
                    height: content.height,
                });
            }
        }
        for thumbnail in &media.thumbnails {
            media_thumbnails.push(MediaRef {
                url: thumbnail.image.uri.clone(),
                width: thumbnail.image.width,
                height: thumbnail.image.height,
            });
        }
    }

    RawEntry {
        title: entry.title.map(|t| t.content),
        link,
        summary: entry.summary.map(|t| t.content),
        content: entry.content.and_then(|c| c.body),
        published: entry.published,
        updated: entry.updated,
        image: None,
        media_content,
        media_thumbnails,
        enclosures,
        categories: entry.categories.into_iter().map(|c| c.term).collect(),
    }
}

/// Pick the entry's article link: prefer an `alternate` (or untyped) link,
/// fall back to the first link, then to an http(s) entry id.
fn pick_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .find(|l| {
            l.rel.is_none() || l.rel.as_deref() == Some("alternate")
        })
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone())
        .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
}

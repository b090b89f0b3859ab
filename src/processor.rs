//! Pipeline orchestration.
//!
//! [`FeedProcessor`] drives one aggregation run end to end: bulk feed
//! download, per-entry normalization, URL unshortening, the image stages
//! (URL fixup, Open-Graph fallback, caching), text scrubbing, dedup and
//! scoring, and finally the output artifacts. Network-bound stages fan out
//! with `buffer_unordered` under the configured concurrency cap; a failure
//! anywhere below the artifact writers affects only the article or feed it
//! belongs to.

use crate::config::Config;
use crate::feeds::{self, ParsedFeed};
use crate::fetch::HttpFetcher;
use crate::images::cache::{CachedImage, ImageCache};
use crate::models::{sha256_hex, Article, FeedStats, Publisher};
use crate::normalize::process_entry;
use crate::outputs::json as json_out;
use crate::score::{dedup_by_url_hash, score_entries, sort_by_publish_time_desc};
use crate::scrub::scrub_article;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::error::Error;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Byte ceiling for article pages fetched for Open-Graph fallback.
const PAGE_CEILING: usize = 5_000_000;

/// Where one aggregation run writes its artifacts.
pub struct AggregateOutputs {
    pub feed_path: PathBuf,
    pub report_path: PathBuf,
    /// When set, per-category shards are written under this directory.
    pub shards_dir: Option<PathBuf>,
}

/// Repair the malformed image URLs feeds actually ship.
///
/// Protocol-relative URLs get `https:`, scheme-less ones get `https://`,
/// and URLs whose path is shorter than 4 characters (tracking pixels,
/// bare hostnames) are dropped.
pub fn fixup_image_url(img: &str) -> Option<String> {
    let img = img.trim();
    if img.is_empty() {
        return None;
    }
    let absolute = if img.starts_with("//") {
        format!("https:{img}")
    } else if !img.contains("://") {
        format!("https://{img}")
    } else {
        img.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;
    if parsed.path().len() < 4 {
        return None;
    }
    Some(absolute)
}

/// First `og:image` URL in an article page.
pub fn og_image_from_html(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"meta[property="og:image"]"#).expect("static selector");
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::to_string)
        .next()
}

pub struct FeedProcessor<'a> {
    config: &'a Config,
    fetcher: &'a HttpFetcher,
    image_cache: &'a ImageCache,
}

impl<'a> FeedProcessor<'a> {
    pub fn new(config: &'a Config, fetcher: &'a HttpFetcher, image_cache: &'a ImageCache) -> Self {
        Self {
            config,
            fetcher,
            image_cache,
        }
    }

    /// Download every publisher feed concurrently.
    ///
    /// A feed that fails to download or parse is reported with zeroed
    /// counters and skipped; the run never aborts on a single feed.
    #[instrument(level = "info", skip_all, fields(publishers = publishers.len()))]
    pub async fn download_feeds(
        &self,
        publishers: Vec<Publisher>,
    ) -> (Vec<(Publisher, ParsedFeed)>, HashMap<String, FeedStats>) {
        let max_bytes = self.config.max_feed_bytes;
        let results: Vec<(Publisher, Result<ParsedFeed, _>)> = stream::iter(publishers)
            .map(|publisher| async move {
                let parsed =
                    feeds::download_feed(self.fetcher, &publisher.feed_url, max_bytes).await;
                (publisher, parsed)
            })
            .buffer_unordered(self.config.io_concurrency)
            .collect()
            .await;

        let mut report = HashMap::new();
        let mut parsed_feeds = Vec::new();
        for (publisher, result) in results {
            match result {
                Ok(parsed) => {
                    report.insert(
                        publisher.feed_url.clone(),
                        FeedStats {
                            size_after_get: parsed.entries.len(),
                            size_after_insert: 0,
                        },
                    );
                    parsed_feeds.push((publisher, parsed));
                }
                Err(e) => {
                    warn!(feed_url = publisher.feed_url, error = %e, "Feed failed; skipping");
                    report.insert(publisher.feed_url.clone(), FeedStats::default());
                }
            }
        }
        info!(succeeded = parsed_feeds.len(), "Feed download finished");
        (parsed_feeds, report)
    }

    /// Normalize entries against their publisher's policy and record the
    /// insert counters. The `max_entries` cap applies to the raw entries,
    /// before validation: a feed whose head is all rejects inserts
    /// nothing, it does not back-fill from deeper in the feed.
    #[instrument(level = "info", skip_all)]
    pub fn normalize_feeds(
        &self,
        parsed_feeds: Vec<(Publisher, ParsedFeed)>,
        report: &mut HashMap<String, FeedStats>,
    ) -> Vec<(Publisher, Vec<Article>)> {
        let now = Utc::now();
        let mut normalized = Vec::new();
        for (publisher, parsed) in parsed_feeds {
            let articles: Vec<Article> = parsed
                .entries
                .iter()
                .take(publisher.max_entries)
                .filter_map(|entry| process_entry(entry, &publisher, now))
                .collect();
            if let Some(stats) = report.get_mut(&publisher.feed_url) {
                stats.size_after_insert = articles.len();
            }
            debug!(
                feed_url = publisher.feed_url,
                inserted = articles.len(),
                "Normalized feed"
            );
            normalized.push((publisher, articles));
        }
        normalized
    }

    /// Resolve every article URL through its redirect chain and derive the
    /// dedup hash from the final URL. Articles whose resolution fails are
    /// dropped: a dead link now will be a dead link for readers too.
    #[instrument(level = "info", skip_all, fields(articles = articles.len()))]
    pub async fn unshorten_articles(&self, articles: Vec<Article>) -> Vec<Article> {
        stream::iter(articles)
            .map(|mut article| async move {
                match self.fetcher.unshorten(&article.url).await {
                    Ok(final_url) => {
                        article.url = final_url.to_string();
                        article.url_hash = sha256_hex(&article.url);
                        Some(article)
                    }
                    Err(e) => {
                        debug!(url = article.url, error = %e, "Unshorten failed; dropping");
                        None
                    }
                }
            })
            .buffer_unordered(self.config.io_concurrency)
            .filter_map(|r| async move { r })
            .collect()
            .await
    }

    /// Repair image URLs and fill in missing ones from the article page's
    /// Open-Graph tags. Publishers flagged `og_images` always go to the
    /// page, since their feed images are known to be stale or generic.
    #[instrument(level = "info", skip_all, fields(articles = articles.len()))]
    pub async fn resolve_images(
        &self,
        articles: Vec<(Article, bool)>,
    ) -> Vec<Article> {
        stream::iter(articles)
            .map(|(mut article, og_images)| async move {
                article.img = article.img.as_deref().and_then(fixup_image_url);

                if article.img.is_none() || og_images {
                    if let Some(og) = self.fetch_og_image(&article.url).await {
                        article.img = fixup_image_url(&og);
                    }
                }
                article
            })
            .buffer_unordered(self.config.io_concurrency)
            .collect()
            .await
    }

    async fn fetch_og_image(&self, article_url: &str) -> Option<String> {
        match self
            .fetcher
            .get_with_max_size(article_url, PAGE_CEILING)
            .await
        {
            Ok(bytes) => og_image_from_html(&String::from_utf8_lossy(&bytes)),
            Err(e) if e.is_transient_status() => {
                debug!(url = article_url, error = %e, "Open-Graph fetch throttled");
                None
            }
            Err(e) => {
                debug!(url = article_url, error = %e, "Open-Graph fetch failed");
                None
            }
        }
    }

    /// Push every article image through the cache. Small images keep their
    /// origin URL as `padded_img`; cached ones get a delivery URL; an
    /// article whose image fails outright just loses its image.
    #[instrument(level = "info", skip_all, fields(articles = articles.len()))]
    pub async fn cache_images(&self, articles: Vec<Article>) -> Vec<Article> {
        stream::iter(articles)
            .map(|mut article| async move {
                let Some(img) = article.img.clone() else {
                    return article;
                };
                match self.image_cache.cache_image(&img).await {
                    Ok(CachedImage::Original(url)) => {
                        article.padded_img = Some(url);
                    }
                    Ok(CachedImage::Key(key)) => {
                        article.padded_img = Some(
                            self.config
                                .padded_image_url(self.image_cache.namespace(), &key),
                        );
                    }
                    Err(e) => {
                        debug!(url = img, error = %e, "Image caching failed; clearing image");
                        article.img = None;
                        article.padded_img = None;
                    }
                }
                article
            })
            .buffer_unordered(self.config.cpu_concurrency)
            .collect()
            .await
    }

    /// One full aggregation run: download, normalize, enrich, rank, write.
    #[instrument(level = "info", skip_all)]
    pub async fn aggregate(
        &self,
        publishers: Vec<Publisher>,
        outputs: &AggregateOutputs,
    ) -> Result<(), Box<dyn Error>> {
        let (parsed_feeds, mut report) = self.download_feeds(publishers).await;
        let normalized = self.normalize_feeds(parsed_feeds, &mut report);

        let mut articles = Vec::new();
        let mut og_flags = HashMap::new();
        for (publisher, feed_articles) in normalized {
            og_flags.insert(publisher.publisher_id.clone(), publisher.og_images);
            articles.extend(feed_articles);
        }

        let mut articles = self.unshorten_articles(articles).await;

        // Fixed processing order from here on: image work and scoring both
        // observe publish-time-descending order.
        sort_by_publish_time_desc(&mut articles);

        let with_flags: Vec<(Article, bool)> = articles
            .into_iter()
            .map(|a| {
                let og = og_flags.get(&a.publisher_id).copied().unwrap_or(false);
                (a, og)
            })
            .collect();
        let mut articles = self.resolve_images(with_flags).await;
        sort_by_publish_time_desc(&mut articles);

        let mut articles = self.cache_images(articles).await;
        sort_by_publish_time_desc(&mut articles);

        for article in &mut articles {
            scrub_article(article);
        }

        let articles = dedup_by_url_hash(articles);
        let articles = score_entries(articles, Utc::now());

        for (feed_url, stats) in &report {
            if stats.size_after_insert > stats.size_after_get {
                warn!(
                    feed_url,
                    get = stats.size_after_get,
                    insert = stats.size_after_insert,
                    "Report counters inconsistent"
                );
            }
        }

        json_out::write_feed(&articles, &outputs.feed_path).await?;
        json_out::write_report(&report, &outputs.report_path).await?;
        if let Some(shards_dir) = &outputs.shards_dir {
            json_out::write_category_shards(&articles, shards_dir).await?;
        }
        info!(articles = articles.len(), "Aggregation run complete");
        Ok(())
    }
}

//! Cover image discovery.
//!
//! For each publisher site this walks a waterfall of icon sources pulled
//! from the site's landing page, in strict priority order: the icons
//! array of a linked web-app manifest, then `<link>` icon relations, then
//! social-preview meta tags. The first source that yields any usable icon
//! wins outright — a lower source is only consulted when everything above
//! it came up empty. Within the winning source, candidates are downloaded
//! (through a local on-disk cache) and decoded, and the one with the
//! largest smaller dimension is kept. The winner is pushed through the
//! image cache with caching forced, so a cover always resolves to a
//! stable delivery key, and its dominant background color is extracted
//! for the client's placeholder chrome.

use crate::config::Config;
use crate::error::FetchError;
use crate::fetch::{ensure_scheme, HttpFetcher};
use crate::images::cache::{CachedImage, ImageCache};
use crate::images::color::background_color;
use crate::models::{CoverInfo, Publisher};
use futures::stream::{self, StreamExt};
use image::RgbaImage;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Byte ceiling for landing pages, manifests, and icon downloads.
const PAGE_CEILING: usize = 5_000_000;

/// Icon candidate URLs scraped from one landing page, in waterfall order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IconSources {
    pub manifest_href: Option<String>,
    pub link_icons: Vec<String>,
    pub meta_images: Vec<String>,
}

/// A linked web-app manifest; only the icon list matters here.
#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    icons: Vec<ManifestIcon>,
}

#[derive(Debug, Deserialize)]
struct ManifestIcon {
    src: String,
}

/// Scrape the icon source URLs out of a landing page.
///
/// Synchronous on purpose: the parsed DOM is not `Send`, so all candidate
/// URLs are pulled out as owned strings before any I/O happens.
pub fn extract_icon_sources(html: &str) -> IconSources {
    let document = Html::parse_document(html);
    let mut sources = IconSources::default();

    let manifest = Selector::parse(r#"link[rel="manifest"]"#).unwrap();
    sources.manifest_href = document
        .select(&manifest)
        .filter_map(|el| el.value().attr("href"))
        .map(str::to_string)
        .next();

    for selector in [
        r#"link[rel="apple-touch-icon"]"#,
        r#"link[rel="icon"]"#,
    ] {
        let selector = Selector::parse(selector).unwrap();
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                sources.link_icons.push(href.to_string());
            }
        }
    }

    for selector in [
        r#"meta[property="og:image"]"#,
        r#"meta[name="twitter:image"]"#,
        r#"meta[name="image"]"#,
    ] {
        let selector = Selector::parse(selector).unwrap();
        for element in document.select(&selector) {
            if let Some(content) = element.value().attr("content") {
                sources.meta_images.push(content.to_string());
            }
        }
    }

    sources
}

/// Vector icons and favicons are useless as covers.
fn is_unusable_format(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.to_ascii_lowercase();
    path.ends_with(".svg") || path.ends_with(".ico")
}

/// Resolve a possibly-relative candidate against the page URL, dropping
/// unusable formats and unparseable hrefs.
fn absolutize(base: &Url, href: &str) -> Option<String> {
    let joined = base.join(href).ok()?;
    let joined = joined.to_string();
    if is_unusable_format(&joined) {
        return None;
    }
    Some(joined)
}

/// The winning icon for one site: its source URL and the decoded pixels.
pub struct ResolvedIcon {
    pub url: String,
    pub image: RgbaImage,
}

/// Pick the candidate whose smaller dimension is largest.
///
/// A 1200x630 social card beats a 192x192 touch icon, and a 512x512 touch
/// icon beats a 1200x120 banner; min-dimension is a decent proxy for "will
/// survive a square-ish crop".
pub fn best_by_min_dimension(candidates: Vec<ResolvedIcon>) -> Option<ResolvedIcon> {
    candidates
        .into_iter()
        .max_by_key(|icon| std::cmp::min(icon.image.width(), icon.image.height()))
}

/// Downloads and decodes icon candidates for one site at a time.
pub struct CoverResolver<'a> {
    fetcher: &'a HttpFetcher,
    icon_cache_dir: PathBuf,
}

impl<'a> CoverResolver<'a> {
    pub fn new(fetcher: &'a HttpFetcher, icon_cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            icon_cache_dir: icon_cache_dir.into(),
        }
    }

    /// Fetch a candidate's bytes through the on-disk icon cache. The cache
    /// file name is the percent-encoded source URL, so re-runs against the
    /// same publisher list skip the network entirely.
    async fn fetch_cached(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let cache_file = self
            .icon_cache_dir
            .join(urlencoding::encode(url).into_owned());
        if let Ok(bytes) = fs::read(&cache_file).await {
            return Ok(bytes);
        }
        let bytes = self.fetcher.get_with_max_size(url, PAGE_CEILING).await?;
        if fs::create_dir_all(&self.icon_cache_dir).await.is_ok() {
            if let Err(e) = fs::write(&cache_file, &bytes).await {
                warn!(url, error = %e, "Failed to write icon cache file");
            }
        }
        Ok(bytes)
    }

    /// Absolute icon URLs from the linked manifest, or nothing when the
    /// manifest is absent, unreachable, unparseable, or iconless.
    async fn manifest_icons(&self, page_url: &Url, manifest_href: Option<&str>) -> Vec<String> {
        let Some(href) = manifest_href else {
            return Vec::new();
        };
        let Ok(manifest_url) = page_url.join(href) else {
            return Vec::new();
        };
        match self.fetch_cached(manifest_url.as_str()).await {
            Ok(bytes) => match serde_json::from_slice::<Manifest>(&bytes) {
                Ok(manifest) => manifest
                    .icons
                    .iter()
                    .filter_map(|icon| absolutize(&manifest_url, &icon.src))
                    .collect(),
                Err(e) => {
                    debug!(manifest = %manifest_url, error = %e, "Unparseable manifest");
                    Vec::new()
                }
            },
            Err(e) => {
                debug!(manifest = %manifest_url, error = %e, "Manifest fetch failed");
                Vec::new()
            }
        }
    }

    /// Download and decode one source's candidates.
    async fn decode_candidates(&self, candidates: Vec<String>) -> Vec<ResolvedIcon> {
        let mut decoded = Vec::new();
        for url in candidates {
            let bytes = match self.fetch_cached(&url).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(url, error = %e, "Icon candidate fetch failed");
                    continue;
                }
            };
            match image::load_from_memory(&bytes) {
                Ok(img) => decoded.push(ResolvedIcon {
                    url,
                    image: img.to_rgba8(),
                }),
                Err(e) => debug!(url, error = %e, "Icon candidate did not decode"),
            }
        }
        decoded
    }

    /// Resolve the best cover icon for one site domain.
    ///
    /// Walks the sources in priority order; the first one with a usable
    /// icon settles it. Returns `None` when the landing page is
    /// unreachable or no candidate anywhere downloads and decodes; a site
    /// without a cover is routine, not an error.
    #[instrument(skip(self))]
    pub async fn resolve_site(&self, domain: &str) -> Option<ResolvedIcon> {
        let site_url = ensure_scheme(domain);
        let page_url = Url::parse(&site_url).ok()?;

        let html_bytes = match self
            .fetcher
            .get_with_scheme_fallback(&site_url, PAGE_CEILING)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(domain, error = %e, "Landing page fetch failed");
                return None;
            }
        };
        let sources = extract_icon_sources(&String::from_utf8_lossy(&html_bytes));

        let manifest_icons = self
            .manifest_icons(&page_url, sources.manifest_href.as_deref())
            .await;
        for group in waterfall_groups(&page_url, &sources, manifest_icons) {
            let decoded = self.decode_candidates(group).await;
            if let Some(winner) = best_by_min_dimension(decoded) {
                return Some(winner);
            }
        }
        None
    }
}

/// Candidate URL groups in waterfall priority order: manifest icons, then
/// `<link>` icons, then meta images. Manifest icons arrive pre-resolved
/// (they are relative to the manifest URL, not the page).
fn waterfall_groups(
    page_url: &Url,
    sources: &IconSources,
    manifest_icons: Vec<String>,
) -> Vec<Vec<String>> {
    let link_icons = sources
        .link_icons
        .iter()
        .filter_map(|href| absolutize(page_url, href))
        .collect();
    let meta_images = sources
        .meta_images
        .iter()
        .filter_map(|href| absolutize(page_url, href))
        .collect();
    vec![manifest_icons, link_icons, meta_images]
}

/// Every distinct domain the publisher list names, insertion-ordered.
fn publisher_domains(publishers: &[Publisher]) -> Vec<String> {
    let mut seen = HashMap::new();
    let mut domains = Vec::new();
    for publisher in publishers {
        let domain = publisher
            .publisher_domain
            .clone()
            .or_else(|| publisher.destination_domains.first().cloned());
        if let Some(domain) = domain {
            if seen.insert(domain.clone(), ()).is_none() {
                domains.push(domain);
            }
        }
    }
    domains
}

/// Run the cover pass over a publisher list.
///
/// Produces one [`CoverInfo`] per domain that yielded an icon: the icon is
/// force-cached (covers never pass through as origin URLs unless even the
/// forced cache declines), its delivery URL is minted from the cover
/// namespace, and its background color extracted.
pub async fn resolve_covers(
    publishers: &[Publisher],
    resolver: &CoverResolver<'_>,
    cover_cache: &ImageCache,
    config: &Config,
) -> HashMap<String, CoverInfo> {
    let domains = publisher_domains(publishers);
    info!(domains = domains.len(), "Resolving cover images");

    let resolved: Vec<(String, ResolvedIcon)> = stream::iter(domains)
        .map(|domain| async move {
            let icon = resolver.resolve_site(&domain).await?;
            Some((domain, icon))
        })
        .buffer_unordered(config.io_concurrency)
        .filter_map(|r| async move { r })
        .collect()
        .await;

    let mut covers = HashMap::new();
    for (domain, icon) in resolved {
        covers.insert(domain, cover_info(&icon, cover_cache, config).await);
    }
    covers
}

/// Cache one winning icon and extract its background color. A caching
/// failure keeps the raw icon URL, so the domain still gets a usable
/// cover, just not a CDN-hosted one.
async fn cover_info(icon: &ResolvedIcon, cover_cache: &ImageCache, config: &Config) -> CoverInfo {
    let background_color = background_color(&icon.image);
    let cover_url = match cover_cache.cache_image(&icon.url).await {
        Ok(CachedImage::Key(key)) => Some(config.padded_image_url(cover_cache.namespace(), &key)),
        Ok(CachedImage::Original(url)) => Some(url),
        Err(e) => {
            warn!(url = icon.url, error = %e, "Cover caching failed; keeping source URL");
            Some(icon.url.clone())
        }
    };
    CoverInfo {
        cover_url,
        background_color,
    }
}

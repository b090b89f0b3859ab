//! Per-entry normalization: raw feed entries in, validated articles out.
//!
//! Each rejection returns `None`; the processor counts survivors so the
//! per-feed report exposes the get-vs-insert delta. Nothing here logs at
//! error level — a dropped entry is a validation outcome, not a fault.

use crate::feeds::{MediaRef, RawEntry};
use crate::models::{Article, ContentType, Publisher};
use crate::scrub::strip_html;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Articles older than this (relative to processing time) are dropped,
/// unless the publisher's content type is exempt.
pub const MAX_ARTICLE_AGE_DAYS: i64 = 60;

/// Description field cap in characters.
const MAX_DESCRIPTION_CHARS: usize = 500;

/// Terms that disqualify a title outright. Mirrors the hosted filter list
/// this pipeline used before, including its one custom addition.
static PROFANITY: Lazy<Regex> = Lazy::new(|| {
    let words = [
        "anal", "anus", "arse", "ass", "ballsack", "bastard", "bitch", "blowjob", "boner",
        "boob", "bugger", "clitoris", "cock", "cunt", "dick", "dildo", "dyke", "fag", "faggot",
        "fellatio", "fuck", "fucking", "handjob", "jizz", "labia", "masturbate", "masturbation",
        "milf", "nigga", "nigger", "penis", "porn", "pussy", "rimjob", "scrotum", "shit",
        "shitshow", "slut", "smegma", "spunk", "tit", "twat", "vagina", "vibrator", "wank",
        "whore",
    ];
    // Whole words only (plus trivial plurals); prefix matching would flag
    // "analysis" or "Scunthorpe".
    let pattern = format!(r"(?i)\b(?:{})(?:e?s)?\b", words.join("|"));
    Regex::new(&pattern).expect("profanity pattern is static")
});

/// True when a title contains a filtered term.
pub fn contains_profanity(text: &str) -> bool {
    PROFANITY.is_match(text)
}

/// Strip markup from a title and decode any remaining HTML entities.
pub fn clean_title(raw: &str) -> String {
    let stripped = strip_html(raw);
    html_escape::decode_html_entities(&stripped).trim().to_string()
}

/// Destination-domain allow-list check.
///
/// The containment test is deliberately bidirectional: the hostname may be
/// a substring of a configured domain, or a configured domain a substring
/// of the hostname. The intent for subdomain matching is ambiguous and
/// pending product clarification; both directions are preserved as shipped.
pub fn domain_allowed(link: &str, destination_domains: &[String]) -> bool {
    if destination_domains.is_empty() {
        return false;
    }
    let Some(host) = Url::parse(link).ok().and_then(|u| u.host_str().map(str::to_string))
    else {
        return false;
    };
    destination_domains
        .iter()
        .any(|domain| domain.contains(&host) || host.contains(domain.as_str()))
}

/// Pick the entry's publish time: `updated` wins over `published`.
pub fn pick_publish_time(entry: &RawEntry) -> Option<DateTime<Utc>> {
    entry.updated.or(entry.published)
}

/// Recency window check: publish time must not be in the future and not
/// older than [`MAX_ARTICLE_AGE_DAYS`]. Product feeds are exempt — offers
/// outlive the news window by design of the product, not of this pipeline.
pub fn within_recency_window(publish_time: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    publish_time <= now && publish_time >= now - Duration::days(MAX_ARTICLE_AGE_DAYS)
}

/// First `<img src>` inside an HTML fragment.
fn first_img_src(html: &str) -> Option<String> {
    static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").expect("static selector"));
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&IMG)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string)
}

/// Widest image in a media list.
///
/// When every item carries a width, take the widest; otherwise when every
/// item carries a height, take the tallest; otherwise take the first.
/// Width is preferred over height when both are present across the list.
fn widest(media: &[MediaRef]) -> Option<String> {
    if media.is_empty() {
        return None;
    }
    if media.iter().all(|m| m.width.is_some()) {
        return media
            .iter()
            .max_by_key(|m| m.width.unwrap_or(0))
            .map(|m| m.url.clone());
    }
    if media.iter().all(|m| m.height.is_some()) {
        return media
            .iter()
            .max_by_key(|m| m.height.unwrap_or(0))
            .map(|m| m.url.clone());
    }
    media.first().map(|m| m.url.clone())
}

/// Representative-image waterfall, in fixed priority order:
/// explicit entry image → widest media content → widest media thumbnail →
/// first `<img>` in the summary → first `<img>` in the first content block.
///
/// Returning `None` is not an error; the image cache stage may still find
/// one via Open-Graph.
pub fn select_image(entry: &RawEntry) -> Option<String> {
    if let Some(image) = &entry.image {
        return Some(image.clone());
    }
    if let Some(url) = widest(&entry.media_content) {
        return Some(url);
    }
    if let Some(url) = widest(&entry.media_thumbnails) {
        return Some(url);
    }
    if let Some(summary) = &entry.summary {
        if let Some(url) = first_img_src(summary) {
            return Some(url);
        }
    }
    if let Some(content) = &entry.content {
        if let Some(url) = first_img_src(content) {
            return Some(url);
        }
    }
    None
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Normalize one raw entry against its publisher's policy.
///
/// # Arguments
///
/// * `entry` - The flattened feed entry
/// * `publisher` - The owning publisher (policy source)
/// * `now` - Wall-clock processing time, passed in for testability
///
/// # Returns
///
/// `Some(Article)` when the entry passes every gate, `None` when it is
/// rejected (missing title/link/time, disallowed domain, stale or future
/// timestamp, profanity).
pub fn process_entry(
    entry: &RawEntry,
    publisher: &Publisher,
    now: DateTime<Utc>,
) -> Option<Article> {
    let title = clean_title(entry.title.as_deref()?);
    if title.is_empty() {
        return None;
    }
    if contains_profanity(&title) {
        return None;
    }

    let link = entry.link.clone()?;
    if !domain_allowed(&link, &publisher.destination_domains) {
        return None;
    }

    let publish_time = pick_publish_time(entry)?;
    if publisher.content_type != ContentType::Product
        && !within_recency_window(publish_time, now)
    {
        return None;
    }

    let description = entry
        .summary
        .as_deref()
        .map(|s| truncate_chars(strip_html(s).trim(), MAX_DESCRIPTION_CHARS))
        .unwrap_or_default();

    let enclosures = (publisher.content_type == ContentType::Audio)
        .then(|| entry.enclosures.clone())
        .filter(|e| !e.is_empty());
    let offers_category = (publisher.content_type == ContentType::Product)
        .then(|| entry.categories.first().cloned())
        .flatten();

    Some(Article {
        title,
        description,
        url: link,
        url_hash: String::new(),
        img: select_image(entry),
        padded_img: None,
        publish_time: publish_time.format("%Y-%m-%d %H:%M:%S").to_string(),
        category: publisher.category.clone(),
        content_type: publisher.content_type,
        publisher_id: publisher.publisher_id.clone(),
        publisher_name: publisher.publisher_name.clone(),
        creative_instance_id: publisher.creative_instance_id.clone(),
        score: 0.0,
        enclosures,
        offers_category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn publisher() -> Publisher {
        serde_json::from_value(serde_json::json!({
            "feed_url": "https://example.com/feed.xml",
            "publisher_id": "pub1",
            "publisher_name": "Example",
            "category": "Tech",
            "destination_domains": ["example.com"]
        }))
        .unwrap()
    }

    fn entry(title: &str, link: &str, published: DateTime<Utc>) -> RawEntry {
        RawEntry {
            title: Some(title.to_string()),
            link: Some(link.to_string()),
            published: Some(published),
            ..RawEntry::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_accepts_valid_entry() {
        let article = process_entry(
            &entry("A headline", "https://example.com/story", now() - Duration::hours(2)),
            &publisher(),
            now(),
        )
        .unwrap();
        assert_eq!(article.title, "A headline");
        assert_eq!(article.publish_time, "2024-03-01 10:00:00");
        assert_eq!(article.publisher_id, "pub1");
        assert!(article.url_hash.is_empty());
    }

    #[test]
    fn test_rejects_missing_title() {
        let mut e = entry("x", "https://example.com/story", now() - Duration::hours(1));
        e.title = None;
        assert!(process_entry(&e, &publisher(), now()).is_none());
    }

    #[test]
    fn test_rejects_markup_only_title() {
        let e = entry("<b></b>", "https://example.com/story", now() - Duration::hours(1));
        assert!(process_entry(&e, &publisher(), now()).is_none());
    }

    #[test]
    fn test_title_is_unescaped_and_stripped() {
        let e = entry(
            "<b>Tom &amp; Jerry</b>",
            "https://example.com/story",
            now() - Duration::hours(1),
        );
        let article = process_entry(&e, &publisher(), now()).unwrap();
        assert_eq!(article.title, "Tom & Jerry");
    }

    #[test]
    fn test_rejects_profane_title() {
        let e = entry(
            "Deals on vibrators this week",
            "https://example.com/story",
            now() - Duration::hours(1),
        );
        assert!(process_entry(&e, &publisher(), now()).is_none());
    }

    #[test]
    fn test_rejects_missing_link() {
        let mut e = entry("A headline", "x", now() - Duration::hours(1));
        e.link = None;
        assert!(process_entry(&e, &publisher(), now()).is_none());
    }

    #[test]
    fn test_rejects_disallowed_domain() {
        let e = entry("A headline", "https://other.org/story", now() - Duration::hours(1));
        assert!(process_entry(&e, &publisher(), now()).is_none());
    }

    #[test]
    fn test_domain_containment_both_directions() {
        // configured domain inside hostname (subdomain case)
        assert!(domain_allowed(
            "https://blog.example.com/a",
            &["example.com".to_string()]
        ));
        // hostname inside configured domain
        assert!(domain_allowed(
            "https://example.com/a",
            &["news.example.com".to_string()]
        ));
        assert!(!domain_allowed("https://other.org/a", &["example.com".to_string()]));
        assert!(!domain_allowed("https://example.com/a", &[]));
    }

    #[test]
    fn test_rejects_future_publish_time() {
        let e = entry("A headline", "https://example.com/story", now() + Duration::hours(1));
        assert!(process_entry(&e, &publisher(), now()).is_none());
    }

    #[test]
    fn test_rejects_stale_publish_time() {
        let e = entry(
            "A headline",
            "https://example.com/story",
            now() - Duration::days(MAX_ARTICLE_AGE_DAYS + 1),
        );
        assert!(process_entry(&e, &publisher(), now()).is_none());
    }

    #[test]
    fn test_product_exempt_from_recency_window() {
        let mut p = publisher();
        p.content_type = ContentType::Product;
        let mut e = entry(
            "An old offer",
            "https://example.com/offer",
            now() - Duration::days(365),
        );
        e.categories = vec!["gadgets".to_string()];
        let article = process_entry(&e, &p, now()).unwrap();
        assert_eq!(article.offers_category.as_deref(), Some("gadgets"));
    }

    #[test]
    fn test_updated_preferred_over_published() {
        let mut e = entry("A headline", "https://example.com/story", now() - Duration::days(2));
        e.updated = Some(now() - Duration::hours(3));
        let article = process_entry(&e, &publisher(), now()).unwrap();
        assert_eq!(article.publish_time, "2024-03-01 09:00:00");
    }

    #[test]
    fn test_audio_copies_enclosures() {
        let mut p = publisher();
        p.content_type = ContentType::Audio;
        let mut e = entry("Episode 1", "https://example.com/ep1", now() - Duration::hours(1));
        e.enclosures = vec![crate::models::Enclosure {
            url: "https://example.com/ep1.mp3".to_string(),
            mime_type: Some("audio/mpeg".to_string()),
            length: None,
        }];
        let article = process_entry(&e, &p, now()).unwrap();
        assert_eq!(article.enclosures.unwrap().len(), 1);
    }

    #[test]
    fn test_waterfall_explicit_image_wins() {
        let mut e = entry("A headline", "https://example.com/story", now());
        e.image = Some("https://example.com/explicit.jpg".to_string());
        e.media_content = vec![MediaRef {
            url: "https://example.com/media.jpg".to_string(),
            width: Some(999),
            height: None,
        }];
        assert_eq!(
            select_image(&e).as_deref(),
            Some("https://example.com/explicit.jpg")
        );
    }

    #[test]
    fn test_waterfall_widest_media_content() {
        let mut e = entry("A headline", "https://example.com/story", now());
        e.media_content = vec![
            MediaRef {
                url: "https://example.com/small.jpg".to_string(),
                width: Some(100),
                height: Some(100),
            },
            MediaRef {
                url: "https://example.com/large.jpg".to_string(),
                width: Some(800),
                height: Some(10),
            },
        ];
        assert_eq!(select_image(&e).as_deref(), Some("https://example.com/large.jpg"));
    }

    #[test]
    fn test_waterfall_height_only_fallback() {
        let media = vec![
            MediaRef {
                url: "https://example.com/short.jpg".to_string(),
                width: None,
                height: Some(50),
            },
            MediaRef {
                url: "https://example.com/tall.jpg".to_string(),
                width: None,
                height: Some(500),
            },
        ];
        assert_eq!(widest(&media).as_deref(), Some("https://example.com/tall.jpg"));
    }

    #[test]
    fn test_waterfall_no_dimensions_takes_first() {
        let media = vec![
            MediaRef {
                url: "https://example.com/a.jpg".to_string(),
                width: None,
                height: None,
            },
            MediaRef {
                url: "https://example.com/b.jpg".to_string(),
                width: Some(10),
                height: None,
            },
        ];
        assert_eq!(widest(&media).as_deref(), Some("https://example.com/a.jpg"));
    }

    #[test]
    fn test_waterfall_thumbnail_then_summary_then_content() {
        let mut e = entry("A headline", "https://example.com/story", now());
        e.media_thumbnails = vec![MediaRef {
            url: "https://example.com/thumb.jpg".to_string(),
            width: Some(64),
            height: Some(64),
        }];
        assert_eq!(select_image(&e).as_deref(), Some("https://example.com/thumb.jpg"));

        e.media_thumbnails.clear();
        e.summary = Some(r#"<p>text <img src="https://example.com/sum.jpg"></p>"#.to_string());
        assert_eq!(select_image(&e).as_deref(), Some("https://example.com/sum.jpg"));

        e.summary = Some("<p>no image</p>".to_string());
        e.content = Some(r#"<div><img src="https://example.com/body.jpg"></div>"#.to_string());
        assert_eq!(select_image(&e).as_deref(), Some("https://example.com/body.jpg"));

        e.content = None;
        assert_eq!(select_image(&e), None);
    }

    #[test]
    fn test_description_stripped_and_truncated() {
        let mut e = entry("A headline", "https://example.com/story", now() - Duration::hours(1));
        e.summary = Some(format!("<p>{}</p>", "x".repeat(600)));
        let article = process_entry(&e, &publisher(), now()).unwrap();
        assert_eq!(article.description.len(), 500);
        assert!(!article.description.contains('<'));
    }

    #[test]
    fn test_profanity_is_word_boundary_anchored() {
        assert!(contains_profanity("Total shitshow in parliament"));
        // "Scunthorpe problem": embedded matches must not fire
        assert!(!contains_profanity("Scunthorpe council meets"));
        assert!(!contains_profanity("Market analysis for today"));
    }
}

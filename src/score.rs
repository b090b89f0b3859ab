//! Dedup, scoring, and final ordering.
//!
//! Runs after scrubbing, over entries already sorted by publish time
//! descending — variety growth is defined along that order. The `score`
//! field is stored on every article but the output stays ordered by
//! publish time; downstream consumers re-rank if their surface wants to.

use crate::models::Article;
use chrono::{DateTime, NaiveDateTime, Utc};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;

/// Sort newest-first. `publish_time` is `%Y-%m-%d %H:%M:%S`, so the
/// lexicographic order is the chronological order.
pub fn sort_by_publish_time_desc(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.publish_time.cmp(&a.publish_time));
}

/// Collapse to one article per `url_hash`, keeping the first occurrence
/// in the incoming (publish-time-descending) order.
pub fn dedup_by_url_hash(articles: Vec<Article>) -> Vec<Article> {
    let before = articles.len();
    let deduped: Vec<Article> = articles
        .into_iter()
        .unique_by(|a| a.url_hash.clone())
        .collect();
    debug!(before, after = deduped.len(), "Deduplicated by url_hash");
    deduped
}

fn parse_publish_time(publish_time: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(publish_time, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Attach a score to every article: `recency × variety`.
///
/// Recency is `ln(seconds since publish)`, clamped to `0.1` for
/// non-positive ages (future or exactly-now timestamps). Variety is a
/// per-publisher multiplier that starts at 1.0 on the publisher's first
/// appearance and doubles on each subsequent one, penalizing runs of
/// same-source content in the consumption order.
pub fn score_entries(mut articles: Vec<Article>, now: DateTime<Utc>) -> Vec<Article> {
    let mut variety_by_source: HashMap<String, f64> = HashMap::new();
    for article in &mut articles {
        let seconds_ago = parse_publish_time(&article.publish_time)
            .map(|t| (now - t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        let recency = if seconds_ago > 0.0 {
            seconds_ago.ln()
        } else {
            0.1
        };
        let variety = variety_by_source
            .entry(article.publisher_id.clone())
            .and_modify(|v| *v *= 2.0)
            .or_insert(1.0);
        article.score = recency * *variety;
    }
    articles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sha256_hex, ContentType};
    use chrono::{Duration, TimeZone};

    fn article(url: &str, publisher_id: &str, publish_time: &str) -> Article {
        Article {
            title: "t".to_string(),
            description: String::new(),
            url: url.to_string(),
            url_hash: sha256_hex(url),
            img: None,
            padded_img: None,
            publish_time: publish_time.to_string(),
            category: "Tech".to_string(),
            content_type: ContentType::Article,
            publisher_id: publisher_id.to_string(),
            publisher_name: "Example".to_string(),
            creative_instance_id: String::new(),
            score: 0.0,
            enclosures: None,
            offers_category: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let a = article("https://example.com/same", "p1", "2024-03-01 10:00:00");
        let mut b = article("https://example.com/same", "p2", "2024-03-01 09:00:00");
        b.title = "duplicate".to_string();
        let deduped = dedup_by_url_hash(vec![a, b]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].publisher_id, "p1");
    }

    #[test]
    fn test_no_two_outputs_share_url_hash() {
        let articles = vec![
            article("https://example.com/a", "p1", "2024-03-01 10:00:00"),
            article("https://example.com/b", "p1", "2024-03-01 09:00:00"),
            article("https://example.com/a", "p2", "2024-03-01 08:00:00"),
        ];
        let deduped = dedup_by_url_hash(articles);
        let hashes: Vec<&str> = deduped.iter().map(|a| a.url_hash.as_str()).collect();
        let mut unique = hashes.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(hashes.len(), unique.len());
    }

    #[test]
    fn test_variety_doubles_per_publisher() {
        let articles = vec![
            article("https://example.com/1", "p1", "2024-03-01 11:00:00"),
            article("https://example.com/2", "p1", "2024-03-01 10:00:00"),
            article("https://example.com/3", "p2", "2024-03-01 09:00:00"),
            article("https://example.com/4", "p1", "2024-03-01 08:00:00"),
        ];
        let scored = score_entries(articles, now());

        let recency = |hours: f64| (hours * 3600.0_f64).ln();
        assert!((scored[0].score - recency(1.0)).abs() < 1e-9); // p1, variety 1
        assert!((scored[1].score - recency(2.0) * 2.0).abs() < 1e-9); // p1, variety 2
        assert!((scored[2].score - recency(3.0)).abs() < 1e-9); // p2, variety 1
        assert!((scored[3].score - recency(4.0) * 4.0).abs() < 1e-9); // p1, variety 4
    }

    #[test]
    fn test_recency_clamped_for_future_publish_time() {
        let articles = vec![article("https://example.com/1", "p1", "2024-03-01 13:00:00")];
        let scored = score_entries(articles, now());
        assert!((scored[0].score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_recency_clamped_for_exactly_now() {
        let articles = vec![article("https://example.com/1", "p1", "2024-03-01 12:00:00")];
        let scored = score_entries(articles, now());
        assert!((scored[0].score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_sort_is_publish_time_descending_not_score() {
        let old = article("https://example.com/old", "p1", "2024-02-28 10:00:00");
        let new = article("https://example.com/new", "p2", "2024-03-01 10:00:00");
        let mut articles = vec![old, new];
        sort_by_publish_time_desc(&mut articles);
        let scored = score_entries(articles, now());
        assert_eq!(scored[0].url, "https://example.com/new");
        // older article scores higher (bigger ln age) yet stays second
        assert!(scored[1].score > scored[0].score);
        assert_eq!(scored[1].url, "https://example.com/old");
    }

    #[test]
    fn test_scoring_twice_is_stable_in_count_and_order() {
        let articles = vec![
            article("https://example.com/1", "p1", "2024-03-01 11:00:00"),
            article("https://example.com/2", "p2", "2024-03-01 10:00:00"),
        ];
        let scored = score_entries(articles, now());
        let urls: Vec<String> = scored.iter().map(|a| a.url.clone()).collect();
        let rescored = score_entries(scored, now());
        let urls_after: Vec<String> = rescored.iter().map(|a| a.url.clone()).collect();
        assert_eq!(urls, urls_after);
    }

    #[test]
    fn test_duration_sanity() {
        // Guard the helper used throughout: chrono Duration math in hours
        let t = now() - Duration::hours(2);
        assert_eq!(t.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-01 10:00:00");
    }
}

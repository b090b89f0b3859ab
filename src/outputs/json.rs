//! JSON artifact writers.
//!
//! Every artifact is written atomically: serialize, write to a `.tmp`
//! sibling, then rename into place. Downstream consumers poll these files,
//! so they must never observe a half-written artifact.

use crate::models::{Article, CoverInfo, FeedStats};
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Serialize `value` and atomically replace the file at `path`.
///
/// Parent directories are created as needed. The rename is atomic on the
/// same filesystem, so a crash mid-write leaves either the old artifact or
/// the new one, never a torn file.
pub async fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_vec(value)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Write the aggregated feed artifact: a flat JSON array of articles in
/// their final order.
#[instrument(level = "info", skip(articles), fields(count = articles.len()))]
pub async fn write_feed(articles: &[Article], path: &Path) -> Result<(), Box<dyn Error>> {
    write_json_atomic(path, &articles).await?;
    info!(path = %path.display(), "Wrote feed artifact");
    Ok(())
}

/// Write the per-feed diagnostic report, keyed by feed URL.
#[instrument(level = "info", skip(report), fields(feeds = report.len()))]
pub async fn write_report(
    report: &HashMap<String, FeedStats>,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    write_json_atomic(path, report).await?;
    info!(path = %path.display(), "Wrote feed report");
    Ok(())
}

/// Write one shard per category under `dir`, preserving each article's
/// position from the full feed.
///
/// Category names come from the publisher list and can contain spaces or
/// slashes, so file names are percent-encoded.
#[instrument(level = "info", skip(articles))]
pub async fn write_category_shards(
    articles: &[Article],
    dir: &Path,
) -> Result<(), Box<dyn Error>> {
    let categories: Vec<String> = articles
        .iter()
        .map(|a| a.category.clone())
        .unique()
        .collect();

    for category in categories {
        let shard: Vec<&Article> = articles
            .iter()
            .filter(|a| a.category == category)
            .collect();
        let file = dir.join(format!("{}.json", urlencoding::encode(&category)));
        write_json_atomic(&file, &shard).await?;
        info!(category, count = shard.len(), path = %file.display(), "Wrote category shard");
    }
    Ok(())
}

/// Write the cover map produced by the cover pass, keyed by domain.
pub async fn write_covers(
    covers: &HashMap<String, CoverInfo>,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    write_json_atomic(path, covers).await?;
    info!(path = %path.display(), domains = covers.len(), "Wrote cover map");
    Ok(())
}

//! # newsflow
//!
//! A content-aggregation pipeline that ingests publisher RSS/Atom feeds,
//! normalizes entries into a uniform article schema, resolves and caches
//! representative images through a sandboxed resize-and-pad codec, and
//! emits a ranked JSON feed plus a per-feed diagnostic report.
//!
//! ## Usage
//!
//! ```sh
//! newsflow aggregate --sources sources.json
//! newsflow covers --sources sources.json
//! ```
//!
//! ## Architecture
//!
//! The `aggregate` pass is a pipeline:
//! 1. **Download**: Fetch every publisher feed (concurrent, size-capped)
//! 2. **Normalize**: Validate entries against publisher policy
//! 3. **Enrich**: Unshorten URLs, resolve and cache images
//! 4. **Rank**: Dedup by final URL, score, order by publish time
//! 5. **Output**: Write the feed, report, and optional category shards
//!
//! The `covers` pass walks each publisher site for a representative icon
//! and extracts its background color.

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod error;
mod feeds;
mod fetch;
mod images;
mod models;
mod normalize;
mod outputs;
mod processor;
mod score;
mod scrub;
mod store;

use cli::{Cli, Command};
use config::Config;
use fetch::HttpFetcher;
use images::cache::ImageCache;
use images::cover::{resolve_covers, CoverResolver};
use images::thumbnail::Thumbnailer;
use models::Publisher;
use processor::{AggregateOutputs, FeedProcessor};
use store::{BlobStore, FsBlobStore};

/// Load and validate the publisher list, filling in derived ids.
async fn load_publishers(path: &std::path::Path) -> Result<Vec<Publisher>, Box<dyn Error>> {
    let bytes = tokio::fs::read(path).await?;
    let mut publishers: Vec<Publisher> = serde_json::from_slice(&bytes)?;
    for publisher in &mut publishers {
        publisher.ensure_publisher_id();
    }
    info!(path = %path.display(), publishers = publishers.len(), "Loaded publisher list");
    Ok(publishers)
}

/// Blob store for uploads, unless uploads are disabled.
fn blob_store(config: &Config) -> Option<Arc<dyn BlobStore>> {
    if config.no_upload {
        info!("Uploads disabled; skipping blob store");
        return None;
    }
    debug!(root = %config.blob_store_dir.display(), "Using filesystem blob store");
    Some(Arc::new(FsBlobStore::new(&config.blob_store_dir)))
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newsflow starting up");

    let args = Cli::parse();
    debug!(?args.command, "Parsed CLI arguments");

    let config = Config::default();
    let fetcher = Arc::new(HttpFetcher::new(&config)?);
    let store = blob_store(&config);

    match args.command {
        Command::Aggregate {
            sources,
            output,
            report,
            shards_dir,
        } => {
            let publishers = load_publishers(&sources).await?;

            let thumbnailer = Arc::new(Thumbnailer::from_file(&config.wasm_thumbnail_path)?);
            let image_cache = ImageCache::new(
                fetcher.clone(),
                thumbnailer,
                store,
                &config.img_cache_dir,
                config.cache_namespace.clone(),
                false,
                config.max_image_bytes,
            );

            let processor = FeedProcessor::new(&config, &fetcher, &image_cache);
            let outputs = AggregateOutputs {
                feed_path: output,
                report_path: report,
                shards_dir,
            };
            processor.aggregate(publishers, &outputs).await?;
        }

        Command::Covers { sources, output } => {
            let publishers = load_publishers(&sources).await?;

            let thumbnailer = Arc::new(Thumbnailer::from_file(&config.wasm_thumbnail_path)?);
            // Covers always cache: a cover must resolve to a stable key.
            let cover_cache = ImageCache::new(
                fetcher.clone(),
                thumbnailer,
                store,
                &config.img_cache_dir,
                config.cover_namespace.clone(),
                true,
                config.max_image_bytes,
            );

            let resolver = CoverResolver::new(&fetcher, &config.icon_cache_dir);
            let covers = resolve_covers(&publishers, &resolver, &cover_cache, &config).await;
            if covers.is_empty() {
                warn!("Cover pass resolved no domains");
            }
            outputs::json::write_covers(&covers, &output).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

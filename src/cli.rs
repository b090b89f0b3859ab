//! Command-line interface definitions for the newsflow aggregator.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! The binary has two passes, exposed as subcommands: the main `aggregate`
//! run and the slower `covers` enrichment run.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the newsflow aggregator.
///
/// # Examples
///
/// ```sh
/// # One aggregation pass with default output paths
/// newsflow aggregate --sources sources.json
///
/// # With per-category shards
/// newsflow aggregate --sources sources.json --shards-dir output/category
///
/// # Cover image enrichment
/// newsflow covers --sources sources.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one aggregation pass: download feeds, normalize, enrich images,
    /// rank, and write the feed and report artifacts
    Aggregate {
        /// Path to the publisher list JSON file
        #[arg(short, long, env = "SOURCES_FILE", default_value = "sources.json")]
        sources: PathBuf,

        /// Output path for the aggregated feed artifact
        #[arg(short, long, default_value = "output/feed.json")]
        output: PathBuf,

        /// Output path for the per-feed diagnostic report
        #[arg(short, long, default_value = "output/report.json")]
        report: PathBuf,

        /// Directory for per-category shard files (omitted: no shards)
        #[arg(long)]
        shards_dir: Option<PathBuf>,
    },

    /// Resolve a cover image and background color for every publisher domain
    Covers {
        /// Path to the publisher list JSON file
        #[arg(short, long, env = "SOURCES_FILE", default_value = "sources.json")]
        sources: PathBuf,

        /// Output path for the domain -> cover map
        #[arg(short, long, default_value = "output/cover_info.json")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_defaults() {
        let cli = Cli::parse_from(["newsflow", "aggregate", "--sources", "pubs.json"]);
        let Command::Aggregate {
            sources,
            output,
            report,
            shards_dir,
        } = cli.command
        else {
            panic!("expected aggregate");
        };
        assert_eq!(sources, PathBuf::from("pubs.json"));
        assert_eq!(output, PathBuf::from("output/feed.json"));
        assert_eq!(report, PathBuf::from("output/report.json"));
        assert!(shards_dir.is_none());
    }

    #[test]
    fn test_aggregate_with_shards() {
        let cli = Cli::parse_from([
            "newsflow",
            "aggregate",
            "-s",
            "pubs.json",
            "--shards-dir",
            "output/category",
        ]);
        let Command::Aggregate { shards_dir, .. } = cli.command else {
            panic!("expected aggregate");
        };
        assert_eq!(shards_dir, Some(PathBuf::from("output/category")));
    }

    #[test]
    fn test_covers_subcommand() {
        let cli = Cli::parse_from(["newsflow", "covers", "-s", "pubs.json", "-o", "covers.json"]);
        let Command::Covers { sources, output } = cli.command else {
            panic!("expected covers");
        };
        assert_eq!(sources, PathBuf::from("pubs.json"));
        assert_eq!(output, PathBuf::from("covers.json"));
    }
}

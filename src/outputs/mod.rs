//! Output artifact writers.
//!
//! # Submodules
//!
//! - [`json`]: Writes the aggregated feed, per-category shards, the
//!   per-feed diagnostic report, and the cover map as JSON files
//!
//! # Output Structure
//!
//! ```text
//! output/
//! ├── feed.json              # Full aggregated feed
//! ├── report.json            # Per-feed get/insert counters
//! ├── category/
//! │   ├── Top%20News.json    # Per-category shards
//! │   └── Technology.json
//! └── cover_info.json        # Domain -> cover image + color
//! ```

pub mod json;

//! Image subsystem: content-addressed caching, the sandboxed
//! resize-and-pad codec, cover-image discovery, and background color
//! extraction.
//!
//! # Submodules
//!
//! - [`cache`]: resolves a candidate image URL to a cached, padded
//!   representation (or passes the original URL through)
//! - [`thumbnail`]: hosts the wasm thumbnail codec behind a
//!   crash-isolating boundary
//! - [`cover`]: per-site waterfall discovery of a representative icon
//! - [`color`]: dominant edge/background color of a decoded icon

pub mod cache;
pub mod color;
pub mod cover;
pub mod thumbnail;

// Copyright 2026 Otterverse Contributors
// SPDX-License-Identifier: MIT

//! otter-harvest — browser-driven image harvester.
//!
//! Crawls a paginated image search in a real browser, downloads the
//! highest-resolution assets it finds, and catalogs the asset directory in a
//! JSON manifest for the gallery front end.

pub mod cli;
pub mod config;
pub mod download;
pub mod extract;
pub mod manifest;
pub mod paginate;
pub mod pipeline;
pub mod renderer;

pub use config::{ConfigError, HarvestConfig, ManifestMode};
pub use download::{DownloadError, DownloadOutcome, Downloader};
pub use extract::{BrowserExtractor, PageSource};
pub use manifest::{Manifest, ManifestEntry, ManifestError};
pub use paginate::{collect_urls, CrawlOutcome, UniqueUrlSet};
pub use pipeline::RunReport;

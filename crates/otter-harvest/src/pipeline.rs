// Copyright 2026 Otterverse Contributors
// SPDX-License-Identifier: MIT

//! End-to-end harvest run: crawl, download, catalog.
//!
//! Nothing in here fails the run. Page, download and manifest problems are
//! logged and counted in the [`RunReport`].

use crate::config::{HarvestConfig, ManifestMode};
use crate::download::{asset_filename, DownloadOutcome, Downloader};
use crate::extract::{BrowserExtractor, PageSource};
use crate::manifest::{self, BuildOptions, Manifest, ManifestEntry};
use crate::paginate;
use crate::renderer::chromium::{BrowserOptions, ChromiumRenderer};
use crate::renderer::{NoopRenderer, Renderer};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Counters describing one crawl run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Unique image URLs accepted by the pagination loop.
    pub discovered: usize,
    pub pages_visited: u32,
    /// Assets newly written to the output directory.
    pub downloaded: usize,
    /// Assets whose destination file already existed.
    pub skipped: usize,
    pub failed: usize,
    /// Entries in the written manifest; `None` if no manifest was written.
    pub manifest_entries: Option<usize>,
    pub elapsed_ms: u64,
}

/// Run the whole pipeline with a real browser.
///
/// If Chromium cannot be launched the crawl finds nothing, and the manifest
/// step still runs against whatever is already on disk.
pub async fn run(config: &HarvestConfig) -> RunReport {
    let renderer: Arc<dyn Renderer> =
        match ChromiumRenderer::launch(&BrowserOptions::from_config(config)).await {
            Ok(renderer) => Arc::new(renderer),
            Err(e) => {
                tracing::error!("browser unavailable, nothing will be crawled: {e:#}");
                Arc::new(NoopRenderer)
            }
        };

    let extractor = BrowserExtractor::new(Arc::clone(&renderer), config.clone());
    let downloader = Downloader::new(
        &config.output_dir,
        &config.user_agent,
        config.download_timeout_ms,
    );

    run_with(&extractor, &downloader, config, Some(&*renderer)).await
}

/// Run the pipeline against any page source.
///
/// When `renderer` is given it is shut down as soon as crawling ends, before
/// any download starts.
pub async fn run_with(
    source: &dyn PageSource,
    downloader: &Downloader,
    config: &HarvestConfig,
    renderer: Option<&dyn Renderer>,
) -> RunReport {
    let start = Instant::now();
    let mut report = RunReport::default();

    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        tracing::error!(
            "cannot create output directory {}: {e}",
            config.output_dir.display()
        );
    }

    tracing::info!(
        "crawling for up to {} image(s) from {}",
        config.target_count,
        config.search_url
    );
    let crawl = paginate::collect_urls(source, config.target_count, config.max_pages).await;
    if let Some(renderer) = renderer {
        let open = renderer.active_contexts();
        if open > 0 {
            tracing::warn!("{open} browser tab(s) still open at shutdown");
        }
        if let Err(e) = renderer.shutdown().await {
            tracing::warn!("browser shutdown failed: {e:#}");
        }
    }
    report.discovered = crawl.urls.len();
    report.pages_visited = crawl.pages_visited;
    tracing::info!(
        "found {} unique image(s) over {} page(s) ({:?})",
        crawl.urls.len(),
        crawl.pages_visited,
        crawl.stop
    );

    let timestamp_ms = chrono::Utc::now().timestamp_millis();
    let mut provenance = HashMap::new();
    let mut batch = Vec::new();

    for (index, url) in crawl.urls.iter().enumerate() {
        let filename = asset_filename(&config.file_prefix, timestamp_ms, index);
        tracing::info!("downloading {url} to {filename}");

        match downloader.download(url, &filename).await {
            Ok(DownloadOutcome::Written { bytes }) => {
                tracing::debug!("{filename}: {bytes} bytes");
                report.downloaded += 1;
                let src = manifest::src_for(&config.src_prefix, &filename);
                provenance.insert(src.clone(), url.clone());
                batch.push(ManifestEntry::new(src, config.fetch_tags.clone(), url.clone()));
            }
            Ok(DownloadOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                tracing::error!("failed to download {url}: {e}");
                report.failed += 1;
            }
        }
    }

    report.manifest_entries = match config.manifest_mode {
        ManifestMode::Rebuild => rebuild_manifest(config, &provenance),
        ManifestMode::Merge => merge_manifest(config, batch),
    };

    report.elapsed_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        "harvest finished: {} downloaded, {} skipped, {} failed",
        report.downloaded,
        report.skipped,
        report.failed
    );
    report
}

/// Rewrite the manifest from the output directory listing.
///
/// Returns the number of entries written, or `None` when the directory is
/// missing or an I/O error occurred (both logged).
pub fn rebuild_manifest(config: &HarvestConfig, provenance: &HashMap<String, String>) -> Option<usize> {
    let prior = match Manifest::load(&config.manifest_path) {
        Ok(prior) => Some(prior),
        Err(e) => {
            tracing::warn!("ignoring unreadable prior manifest: {e}");
            None
        }
    };

    let options = BuildOptions {
        src_prefix: &config.src_prefix,
        default_tags: &config.default_tags,
        provenance,
        prior: prior.as_ref(),
    };

    let manifest = match manifest::build_from_dir(&config.output_dir, &options) {
        Ok(Some(manifest)) => manifest,
        Ok(None) => {
            tracing::error!(
                "{} does not exist, no images to catalog",
                config.output_dir.display()
            );
            return None;
        }
        Err(e) => {
            tracing::error!("manifest generation abandoned: {e}");
            return None;
        }
    };

    write_manifest(config, &manifest)
}

/// Merge this run's new entries into the existing manifest.
pub fn merge_manifest(config: &HarvestConfig, batch: Vec<ManifestEntry>) -> Option<usize> {
    if batch.is_empty() {
        tracing::info!("no new images were fetched, manifest left as is");
        return None;
    }

    let prior = match Manifest::load(&config.manifest_path) {
        Ok(prior) => prior,
        Err(e) => {
            tracing::error!("cannot merge into existing manifest: {e}");
            return None;
        }
    };

    write_manifest(config, &prior.merge(batch))
}

fn write_manifest(config: &HarvestConfig, manifest: &Manifest) -> Option<usize> {
    match manifest.write(&config.manifest_path) {
        Ok(()) => {
            tracing::info!(
                "manifest written with {} image(s) at {}",
                manifest.len(),
                config.manifest_path.display()
            );
            Some(manifest.len())
        }
        Err(e) => {
            tracing::error!("failed to write manifest: {e}");
            None
        }
    }
}

//! Rendered-page image extraction.
//!
//! A gallery page is loaded in a browser tab, allowed to settle, scrolled to
//! the bottom so lazy images materialize, and then read for the highest
//! resolution URL each gallery image advertises.

use crate::config::HarvestConfig;
use crate::renderer::{self, RenderContext, Renderer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

/// Something that yields the image URLs of one gallery page.
///
/// An empty result means the page had nothing to offer, which the pagination
/// loop treats as end of content. Implementations never fail: errors are
/// logged and reported as an empty page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn extract(&self, page: u32) -> Vec<String>;
}

/// Raw attributes of one gallery image as read from the DOM.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageAttrs {
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub srcset: String,
}

/// Pick the URL to download for one image: the `2x` candidate of `srcset`
/// when there is one, otherwise `src`.
pub fn select_image_url(src: &str, srcset: &str) -> Option<String> {
    let two_x = srcset.split(',').find_map(|candidate| {
        let mut parts = candidate.split_whitespace();
        let url = parts.next()?;
        (parts.next() == Some("2x")).then_some(url)
    });

    let chosen = two_x.unwrap_or(src).trim();
    (!chosen.is_empty()).then(|| chosen.to_string())
}

/// Resolve `candidate` against the page URL, keeping only absolute http(s)
/// URLs. Placeholders such as `data:` URIs are dropped.
pub fn normalize_image_url(candidate: &str, page_url: Option<&Url>) -> Option<String> {
    let parsed = match Url::parse(candidate) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => page_url?.join(candidate).ok()?,
        Err(_) => return None,
    };
    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

/// Turn DOM attributes into the page's URL list, dropping page-local
/// duplicates while keeping document order.
pub fn collect_page_urls(images: &[ImageAttrs], page_url: Option<&Url>) -> Vec<String> {
    let mut seen = HashSet::new();
    images
        .iter()
        .filter_map(|img| select_image_url(&img.src, &img.srcset))
        .filter_map(|candidate| normalize_image_url(&candidate, page_url))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn image_attrs_script(selector: &str) -> Result<String> {
    let selector = serde_json::to_string(selector).context("failed to encode selector")?;
    Ok(format!(
        "Array.from(document.querySelectorAll({selector})).map((img) => ({{ \
         src: img.getAttribute('src') || img.src || '', \
         srcset: img.getAttribute('srcset') || img.srcset || '' }}))"
    ))
}

/// Extractor that renders each page in a fresh Chromium tab.
pub struct BrowserExtractor {
    renderer: Arc<dyn Renderer>,
    config: HarvestConfig,
}

impl BrowserExtractor {
    pub fn new(renderer: Arc<dyn Renderer>, config: HarvestConfig) -> Self {
        Self { renderer, config }
    }

    async fn extract_in(&self, ctx: &mut dyn RenderContext, url: &str) -> Result<Vec<String>> {
        let nav = ctx
            .navigate(url, self.config.navigation_timeout_ms)
            .await
            .with_context(|| format!("failed to load {url}"))?;
        tracing::debug!("loaded {} in {}ms", nav.final_url, nav.load_time_ms);

        let settled = renderer::settle(
            &*ctx,
            self.config.settle_quiet_ms,
            self.config.settle_max_ms,
        )
        .await?;
        if !settled {
            tracing::debug!("{url}: network still busy, reading DOM anyway");
        }

        let scroll = renderer::scroll_to_bottom(
            &*ctx,
            self.config.scroll_step_px,
            self.config.scroll_interval_ms,
            self.config.scroll_max_steps,
        )
        .await?;
        tracing::debug!("{url}: scrolled {} steps to height {}", scroll.steps, scroll.height);

        let raw = ctx
            .execute_js(&image_attrs_script(&self.config.cell_selector)?)
            .await?;
        let images: Vec<ImageAttrs> =
            serde_json::from_value(raw).context("unexpected image attribute payload")?;

        let base = Url::parse(&nav.final_url).ok();
        Ok(collect_page_urls(&images, base.as_ref()))
    }
}

#[async_trait]
impl PageSource for BrowserExtractor {
    async fn extract(&self, page: u32) -> Vec<String> {
        let url = self.config.page_url(page);
        tracing::info!("page {page}: navigating to {url}");

        let mut ctx = match self.renderer.new_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!("page {page}: no browser context: {e:#}");
                return Vec::new();
            }
        };

        let result = self.extract_in(ctx.as_mut(), &url).await;

        if let Err(e) = ctx.close().await {
            tracing::debug!("page {page}: failed to close tab: {e:#}");
        }

        match result {
            Ok(urls) => {
                tracing::info!("page {page}: found {} image(s)", urls.len());
                urls
            }
            Err(e) => {
                tracing::warn!("page {page}: extraction failed: {e:#}");
                Vec::new()
            }
        }
    }
}

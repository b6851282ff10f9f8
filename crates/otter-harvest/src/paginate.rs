//! Pagination loop: walk gallery pages until enough unique URLs are known.

use crate::extract::PageSource;
use std::collections::HashSet;

/// Insertion-ordered set of image URLs.
#[derive(Debug, Clone, Default)]
pub struct UniqueUrlSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl UniqueUrlSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a URL; returns `false` if it was already present.
    pub fn insert(&mut self, url: String) -> bool {
        if self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.order.push(url);
        true
    }

    /// Add every URL, returning how many were new.
    pub fn extend<I: IntoIterator<Item = String>>(&mut self, urls: I) -> usize {
        urls.into_iter().filter(|url| self.insert(url.clone())).count()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Keep only the first `len` URLs in discovery order.
    pub fn truncate(&mut self, len: usize) {
        for dropped in self.order.drain(len.min(self.order.len())..) {
            self.seen.remove(&dropped);
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        self.order
    }
}

/// Why the pagination loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The target count was reached.
    TargetReached,
    /// A page contributed no new URLs.
    Exhausted,
    /// The page index guard was hit.
    PageLimit,
}

/// Result of one pagination run.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Unique URLs in discovery order, at most the target count.
    pub urls: Vec<String>,
    /// Number of extractor calls made.
    pub pages_visited: u32,
    pub stop: StopReason,
}

/// Call `source` for pages 1, 2, ... until `target` unique URLs are known,
/// a page yields nothing new, or `max_pages` pages have been visited.
pub async fn collect_urls(source: &dyn PageSource, target: usize, max_pages: u32) -> CrawlOutcome {
    let mut set = UniqueUrlSet::new();
    let mut pages_visited = 0;

    let stop = loop {
        if set.len() >= target {
            break StopReason::TargetReached;
        }
        if pages_visited >= max_pages {
            tracing::warn!("stopping after {max_pages} pages with {} URLs", set.len());
            break StopReason::PageLimit;
        }

        let page = pages_visited + 1;
        let found = source.extract(page).await;
        pages_visited = page;

        let offered = found.len();
        let added = set.extend(found);
        tracing::debug!("page {page}: {added} new of {offered} URL(s), {} total", set.len());

        if added == 0 {
            tracing::info!("page {page} had no new images, stopping");
            break StopReason::Exhausted;
        }
    };

    set.truncate(target);
    CrawlOutcome {
        urls: set.into_vec(),
        pages_visited,
        stop,
    }
}

//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide), plus the
//! settle and lazy-load scroll routines that run against any context.

pub mod chromium;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A no-op renderer used when Chromium is unavailable.
///
/// Every context request fails, so extraction reports empty pages and the
/// rest of the pipeline (manifest rebuild) still runs.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}

/// Resource count plus document readiness.
///
/// Chrome stops buffering resource-timing entries at 250, so the first call
/// raises the buffer size and installs an observer that keeps counting past
/// it. Later calls only read the counter.
const SETTLE_STATE_JS: &str = "(() => { \
    if (window.__otterResourceCount === undefined) { \
        window.__otterResourceCount = 0; \
        performance.setResourceTimingBufferSize(1000000); \
        new PerformanceObserver((list) => { \
            window.__otterResourceCount += list.getEntries().length; \
        }).observe({ type: 'resource', buffered: true }); \
    } \
    return { \
        resources: Math.max(window.__otterResourceCount, \
                            performance.getEntriesByType('resource').length), \
        ready: document.readyState === 'complete' \
    }; \
})()";

/// Wait until the page stops issuing requests.
///
/// The page counts as settled once the document is complete and the number of
/// loaded resources has not changed for `quiet_ms`. Gives up after
/// `max_ms` and returns `false`; the caller decides whether that matters.
pub async fn settle(ctx: &dyn RenderContext, quiet_ms: u64, max_ms: u64) -> Result<bool> {
    let poll = Duration::from_millis(quiet_ms.clamp(1, 100));
    let quiet = Duration::from_millis(quiet_ms);
    let max = Duration::from_millis(max_ms);
    let start = Instant::now();

    let mut last_count: Option<u64> = None;
    let mut stable_since = Instant::now();

    loop {
        let state = ctx
            .execute_js(SETTLE_STATE_JS)
            .await
            .context("settle check failed")?;
        let count = state.get("resources").and_then(|v| v.as_u64()).unwrap_or(0);
        let ready = state.get("ready").and_then(|v| v.as_bool()).unwrap_or(false);

        if last_count != Some(count) {
            last_count = Some(count);
            stable_since = Instant::now();
        } else if ready && stable_since.elapsed() >= quiet {
            return Ok(true);
        }

        if start.elapsed() >= max {
            tracing::debug!("page did not settle within {max_ms}ms ({count} resources)");
            return Ok(false);
        }
        tokio::time::sleep(poll).await;
    }
}

/// Outcome of a lazy-load scroll pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    /// Scroll steps performed.
    pub steps: u32,
    /// Document height when scrolling stopped.
    pub height: u64,
    /// Whether the bottom was reached with a stable height.
    pub reached_bottom: bool,
}

/// Scroll to the bottom of the page in `step_px` increments.
///
/// Stops once the viewport bottom has reached the document height and the
/// height did not grow during the last step, or after `max_steps` steps.
pub async fn scroll_to_bottom(
    ctx: &dyn RenderContext,
    step_px: u32,
    interval_ms: u64,
    max_steps: u32,
) -> Result<ScrollOutcome> {
    let script = format!(
        "(() => {{ window.scrollBy(0, {step_px}); \
         return {{ offset: Math.ceil(window.scrollY + window.innerHeight), \
         height: document.body.scrollHeight }}; }})()"
    );

    let mut previous_height: Option<u64> = None;
    let mut height = 0;

    for step in 1..=max_steps {
        let pos = ctx.execute_js(&script).await.context("scroll step failed")?;
        let offset = pos.get("offset").and_then(|v| v.as_u64()).unwrap_or(0);
        height = pos.get("height").and_then(|v| v.as_u64()).unwrap_or(0);

        if offset >= height && previous_height == Some(height) {
            return Ok(ScrollOutcome {
                steps: step,
                height,
                reached_bottom: true,
            });
        }
        previous_height = Some(height);

        if interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }

    tracing::warn!("scroll stopped after {max_steps} steps without a stable bottom (height {height})");
    Ok(ScrollOutcome {
        steps: max_steps,
        height,
        reached_bottom: false,
    })
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedContext;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scroll_stops_at_stable_bottom() {
        let ctx = ScriptedContext::new(vec![
            json!({"offset": 1080, "height": 3000}),
            json!({"offset": 2000, "height": 3000}),
            json!({"offset": 3000, "height": 3000}),
        ]);
        let outcome = scroll_to_bottom(&ctx, 1000, 0, 50).await.unwrap();
        assert!(outcome.reached_bottom);
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.height, 3000);
    }

    #[tokio::test]
    async fn test_scroll_keeps_going_while_height_grows() {
        let ctx = ScriptedContext::new(vec![
            json!({"offset": 1000, "height": 1000}),
            json!({"offset": 1000, "height": 2000}),
            json!({"offset": 2000, "height": 2000}),
        ]);
        let outcome = scroll_to_bottom(&ctx, 1000, 0, 50).await.unwrap();
        assert!(outcome.reached_bottom);
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.height, 2000);
    }

    #[tokio::test]
    async fn test_scroll_is_bounded_when_height_oscillates() {
        let responses = (0..10)
            .map(|i| json!({"offset": 1000, "height": if i % 2 == 0 { 1000 } else { 1500 }}))
            .collect();
        let ctx = ScriptedContext::new(responses);
        let outcome = scroll_to_bottom(&ctx, 100, 0, 10).await.unwrap();
        assert!(!outcome.reached_bottom);
        assert_eq!(outcome.steps, 10);
        assert_eq!(ctx.calls(), 10);
    }

    #[tokio::test]
    async fn test_settle_waits_for_stable_resource_count() {
        let ctx = ScriptedContext::new(vec![
            json!({"resources": 3, "ready": false}),
            json!({"resources": 7, "ready": true}),
            json!({"resources": 7, "ready": true}),
        ]);
        let settled = settle(&ctx, 0, 5_000).await.unwrap();
        assert!(settled);
        assert_eq!(ctx.calls(), 3);
    }

    #[tokio::test]
    async fn test_settle_counts_past_resource_buffer_limit() {
        // A gallery page keeps loading thumbnails after the 250th entry; a
        // count pinned at the buffer limit would look settled here.
        let ctx = ScriptedContext::new(vec![
            json!({"resources": 250, "ready": true}),
            json!({"resources": 251, "ready": true}),
            json!({"resources": 400, "ready": true}),
            json!({"resources": 400, "ready": true}),
        ]);
        let settled = settle(&ctx, 0, 5_000).await.unwrap();
        assert!(settled);
        assert_eq!(ctx.calls(), 4);

        let scripts = ctx.scripts.lock().unwrap();
        assert!(scripts[0].contains("setResourceTimingBufferSize"));
        assert!(scripts[0].contains("PerformanceObserver"));
        assert!(scripts.iter().all(|s| s == &scripts[0]));
    }

    #[tokio::test]
    async fn test_settle_gives_up_after_max() {
        let responses = (0..1000)
            .map(|i| json!({"resources": i, "ready": true}))
            .collect();
        let ctx = ScriptedContext::new(responses);
        let settled = settle(&ctx, 1, 20).await.unwrap();
        assert!(!settled);
    }

    #[tokio::test]
    async fn test_noop_renderer_refuses_contexts() {
        let renderer = NoopRenderer;
        assert!(renderer.new_context().await.is_err());
        assert_eq!(renderer.active_contexts(), 0);
        renderer.shutdown().await.unwrap();
    }
}

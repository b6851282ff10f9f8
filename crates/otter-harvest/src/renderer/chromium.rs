//! Chromium-based renderer using chromiumoxide.

use super::{NavigationResult, RenderContext, Renderer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Launch settings for the browser process.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub chromium_path: Option<PathBuf>,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
}

impl BrowserOptions {
    pub fn from_config(config: &crate::config::HarvestConfig) -> Self {
        Self {
            chromium_path: config.chromium_path.clone(),
            headless: config.headless,
            viewport_width: config.viewport_width,
            viewport_height: config.viewport_height,
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Explicit path from config or CLI
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    // 2. OTTER_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("OTTER_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance with the given viewport, user agent and
    /// head mode.
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let chrome_path = find_chromium(options.chromium_path.as_deref()).context(
            "Chromium not found. Set OTTER_CHROMIUM_PATH or pass --chromium-path.",
        )?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(options.viewport_width, options.viewport_height)
            .viewport(Viewport {
                width: options.viewport_width,
                height: options.viewport_height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .arg(format!("--user-agent={}", options.user_agent))
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {e}");
                }
            }
        });

        tracing::info!(
            "Chromium launched ({}, {}x{})",
            if options.headless { "headless" } else { "headful" },
            options.viewport_width,
            options.viewport_height
        );

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await;
        match &closed {
            Ok(_) => {
                let _ = browser.wait().await;
            }
            Err(e) => {
                tracing::warn!("Chromium did not close cleanly, killing it: {e}");
                let _ = browser.kill().await;
            }
        }
        // The handler loop must not outlive the browser, whatever close returned.
        self.handler_task.abort();
        tracing::debug!("Chromium closed");
        closed.map(|_| ()).context("failed to close Chromium")
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                let load_time_ms = start.elapsed().as_millis() as u64;

                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_chromium_ignores_missing_explicit_path() {
        // Falls through to the other lookups instead of returning a bogus path.
        let found = find_chromium(Some(Path::new("/definitely/not/a/chrome")));
        assert_ne!(found, Some(PathBuf::from("/definitely/not/a/chrome")));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_navigate_and_execute_js() {
        let options = BrowserOptions::from_config(&crate::config::HarvestConfig::default());
        let renderer = ChromiumRenderer::launch(&options)
            .await
            .expect("failed to launch renderer");
        let mut ctx = renderer
            .new_context()
            .await
            .expect("failed to create context");

        ctx.navigate("data:text/html,<h1>Hello</h1>", 10000)
            .await
            .expect("navigation failed");

        let result = ctx
            .execute_js("document.querySelector('h1').textContent")
            .await
            .expect("JS execution failed");
        assert_eq!(result.as_str().unwrap(), "Hello");

        let width = ctx
            .execute_js("window.innerWidth")
            .await
            .expect("JS execution failed");
        assert_eq!(width.as_u64(), Some(1920));

        ctx.close().await.expect("close failed");
        assert_eq!(renderer.active_contexts(), 0);

        renderer.shutdown().await.expect("shutdown failed");
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_shutdown_stops_handler_even_when_close_fails() {
        let options = BrowserOptions::from_config(&crate::config::HarvestConfig::default());
        let renderer = ChromiumRenderer::launch(&options)
            .await
            .expect("failed to launch renderer");

        renderer.shutdown().await.expect("first shutdown failed");
        // The browser is already gone, so closing again can only fail.
        let _ = renderer.shutdown().await;

        for _ in 0..50 {
            if renderer.handler_task.is_finished() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(renderer.handler_task.is_finished());
    }
}

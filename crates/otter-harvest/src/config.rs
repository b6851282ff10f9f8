//! Harvest configuration: defaults, JSON file, environment, CLI overrides.
//!
//! Every tunable of a crawl run lives in [`HarvestConfig`], which is built once
//! at startup and passed by reference into the pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "OTTER_HARVEST_CONFIG";

/// Config file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "otter-harvest.json";

/// Placeholder replaced by the 1-based page index in `search_url`.
pub const PAGE_PLACEHOLDER: &str = "{page}";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                  AppleWebKit/537.36 (KHTML, like Gecko) \
                                  Chrome/131.0.0.0 Safari/537.36";

/// How the manifest is produced at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestMode {
    /// List the output directory and rewrite the manifest from scratch.
    Rebuild,
    /// Union the prior manifest with this run's downloads, later entries win.
    Merge,
}

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// All recognized options of a crawl run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarvestConfig {
    pub output_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub target_count: usize,
    pub headless: bool,
    pub search_url: String,
    pub cell_selector: String,
    pub src_prefix: String,
    pub file_prefix: String,
    pub default_tags: Vec<String>,
    pub fetch_tags: Vec<String>,
    pub manifest_mode: ManifestMode,
    pub max_pages: u32,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub navigation_timeout_ms: u64,
    pub settle_quiet_ms: u64,
    pub settle_max_ms: u64,
    pub scroll_step_px: u32,
    pub scroll_interval_ms: u64,
    pub scroll_max_steps: u32,
    pub download_timeout_ms: u64,
    pub chromium_path: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("public/otters"),
            manifest_path: PathBuf::from("src/lib/images.json"),
            target_count: 300,
            headless: true,
            search_url: "https://pixabay.com/images/search/otter/?pagi={page}".to_string(),
            cell_selector: r#"div[class*="cell--"] a img"#.to_string(),
            src_prefix: "/otters".to_string(),
            file_prefix: "otter".to_string(),
            default_tags: vec!["otter".to_string()],
            fetch_tags: vec!["otter".to_string(), "pixabay".to_string()],
            manifest_mode: ManifestMode::Rebuild,
            max_pages: 50,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport_width: 1920,
            viewport_height: 1080,
            navigation_timeout_ms: 30_000,
            settle_quiet_ms: 500,
            settle_max_ms: 10_000,
            scroll_step_px: 100,
            scroll_interval_ms: 100,
            scroll_max_steps: 600,
            download_timeout_ms: 60_000,
            chromium_path: None,
        }
    }
}

impl HarvestConfig {
    /// Resolve the configuration: defaults, then the config file (explicit
    /// path, `OTTER_HARVEST_CONFIG`, or `./otter-harvest.json`), then
    /// environment overrides. CLI overrides are applied by the caller.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_in(explicit, Path::new(""))
    }

    /// [`HarvestConfig::load`] with the default config file looked up in `cwd`.
    fn load_in(explicit: Option<&Path>, cwd: &Path) -> Result<Self, ConfigError> {
        let mut config = match resolve_config_path(explicit, cwd) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Read a JSON config file; absent keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `OTTER_*` environment overrides. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        if let Some(v) = read_env_string("OTTER_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = read_env_string("OTTER_MANIFEST_PATH") {
            self.manifest_path = PathBuf::from(v);
        }
        self.target_count = read_env_usize("OTTER_TARGET_COUNT", self.target_count);
        if let Some(v) = read_env_bool("OTTER_HEADLESS") {
            self.headless = v;
        }
        if let Some(v) = read_env_string("OTTER_CHROMIUM_PATH") {
            self.chromium_path = Some(PathBuf::from(v));
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_count == 0 {
            return Err(ConfigError::Invalid("targetCount must be at least 1".into()));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid("maxPages must be at least 1".into()));
        }
        if self.scroll_max_steps == 0 {
            return Err(ConfigError::Invalid(
                "scrollMaxSteps must be at least 1".into(),
            ));
        }
        if !self.search_url.contains(PAGE_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "searchUrl must contain the {PAGE_PLACEHOLDER} placeholder"
            )));
        }
        if self.cell_selector.trim().is_empty() {
            return Err(ConfigError::Invalid("cellSelector must not be empty".into()));
        }
        Ok(())
    }

    /// The search URL for a 1-based page index.
    pub fn page_url(&self, page: u32) -> String {
        self.search_url.replace(PAGE_PLACEHOLDER, &page.to_string())
    }
}

fn resolve_config_path(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(env_path) = read_env_string(CONFIG_ENV) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let cwd_config = cwd.join(DEFAULT_CONFIG_FILE);
    cwd_config.exists().then_some(cwd_config)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string())
}

fn read_env_usize(name: &str, default_value: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default_value)
}

fn read_env_bool(name: &str) -> Option<bool> {
    match read_env_string(name)?.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

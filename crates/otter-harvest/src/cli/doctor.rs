//! Environment readiness check.

use crate::config::HarvestConfig;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;

/// Check browser availability and the configured locations.
pub async fn run(config: &HarvestConfig) -> Result<()> {
    let chromium_path = find_chromium(config.chromium_path.as_deref());

    if crate::cli::output::is_json() {
        crate::cli::output::print_json(&serde_json::json!({
            "chromium": chromium_path.as_ref().map(|p| p.display().to_string()),
            "output_dir": config.output_dir.display().to_string(),
            "output_dir_exists": config.output_dir.is_dir(),
            "manifest_path": config.manifest_path.display().to_string(),
            "manifest_exists": config.manifest_path.is_file(),
            "ready": chromium_path.is_some(),
        }));
        return Ok(());
    }

    println!("otter-harvest doctor");
    println!("====================");
    println!();

    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found. Set OTTER_CHROMIUM_PATH or install Chrome."),
    }

    if config.output_dir.is_dir() {
        println!("[OK] Output directory: {}", config.output_dir.display());
    } else {
        println!(
            "[..] Output directory will be created: {}",
            config.output_dir.display()
        );
    }

    if config.manifest_path.is_file() {
        println!("[OK] Manifest: {}", config.manifest_path.display());
    } else {
        println!(
            "[..] Manifest not written yet: {}",
            config.manifest_path.display()
        );
    }

    println!(
        "     Target: {} image(s), {} mode, {}",
        config.target_count,
        if config.headless { "headless" } else { "headful" },
        config.search_url
    );

    println!();
    if chromium_path.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}

//! `otter-harvest manifest` — rebuild the manifest from the asset directory.

use crate::cli::output;
use crate::config::HarvestConfig;
use crate::pipeline;
use anyhow::Result;
use std::collections::HashMap;

/// Run the manifest command.
pub async fn run(config: &HarvestConfig) -> Result<()> {
    let entries = pipeline::rebuild_manifest(config, &HashMap::new());

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "manifest_path": config.manifest_path.display().to_string(),
            "entries": entries,
        }));
    } else if !output::is_quiet() {
        match entries {
            Some(n) => println!(
                "Image manifest generated with {n} images at {}",
                config.manifest_path.display()
            ),
            None => println!("No manifest written (see log)."),
        }
    }
    Ok(())
}

//! `otter-harvest harvest` — crawl, download and catalog in one run.

use crate::cli::output;
use crate::config::HarvestConfig;
use crate::pipeline;
use anyhow::Result;

/// Run the harvest command.
///
/// Partial failures only show up in the counters; the command itself
/// always succeeds once the pipeline has started.
pub async fn run(config: &HarvestConfig) -> Result<()> {
    let report = pipeline::run(config).await;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&report)?);
        return Ok(());
    }
    if output::is_quiet() {
        return Ok(());
    }

    println!("Harvest finished in {:.1}s", report.elapsed_ms as f64 / 1000.0);
    println!("  pages visited:   {}", report.pages_visited);
    println!("  images found:    {}", report.discovered);
    println!("  downloaded:      {}", report.downloaded);
    println!("  already present: {}", report.skipped);
    println!("  failed:          {}", report.failed);
    match report.manifest_entries {
        Some(n) => println!(
            "  manifest:        {n} entries at {}",
            config.manifest_path.display()
        ),
        None => println!("  manifest:        not written (see log)"),
    }
    Ok(())
}

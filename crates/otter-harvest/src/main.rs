// Copyright 2026 Otterverse Contributors
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use otter_harvest::cli;
use otter_harvest::config::{HarvestConfig, ManifestMode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "otter-harvest",
    about = "otter-harvest — crawl an image gallery, download the images, write a manifest",
    version,
    after_help = "Run 'otter-harvest <command> --help' for details on each command.\nRun 'otter-harvest' with no command to harvest with the configured defaults."
)]
struct Cli {
    /// Config file (JSON); defaults to $OTTER_HARVEST_CONFIG or ./otter-harvest.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results and logs as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the gallery, download new images and update the manifest
    Harvest(HarvestArgs),
    /// Rebuild the manifest from the images already on disk
    Manifest {
        /// Directory holding the images
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Where to write the manifest
        #[arg(long)]
        manifest_path: Option<PathBuf>,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[derive(Args, Default)]
struct HarvestArgs {
    /// Directory the images are downloaded into
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Where to write the manifest
    #[arg(long)]
    manifest_path: Option<PathBuf>,
    /// Stop once this many unique images are found
    #[arg(long)]
    target_count: Option<usize>,
    /// Never visit more than this many result pages
    #[arg(long)]
    max_pages: Option<u32>,
    /// Show the browser window
    #[arg(long)]
    headful: bool,
    /// Merge new images into the existing manifest instead of rebuilding it
    #[arg(long)]
    merge: bool,
    /// Path to the Chrome/Chromium binary
    #[arg(long)]
    chromium_path: Option<PathBuf>,
}

impl HarvestArgs {
    fn apply(self, config: &mut HarvestConfig) {
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(path) = self.manifest_path {
            config.manifest_path = path;
        }
        if let Some(count) = self.target_count {
            config.target_count = count;
        }
        if let Some(pages) = self.max_pages {
            config.max_pages = pages;
        }
        if self.headful {
            config.headless = false;
        }
        if self.merge {
            config.manifest_mode = ManifestMode::Merge;
        }
        if let Some(path) = self.chromium_path {
            config.chromium_path = Some(path);
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool, json: bool) {
    let default_directive = if verbose {
        "otter_harvest=debug"
    } else if quiet {
        "otter_harvest=warn"
    } else {
        "otter_harvest=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("OTTER_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("OTTER_QUIET", "1");
    }
    init_tracing(cli.verbose, cli.quiet, cli.json);

    let mut config = match HarvestConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("  Error: {e}");
            std::process::exit(1);
        }
    };

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Harvest(HarvestArgs::default()));

    let result = match command {
        Commands::Harvest(args) => {
            args.apply(&mut config);
            validated(&config);
            cli::harvest_cmd::run(&config).await
        }
        Commands::Manifest {
            output_dir,
            manifest_path,
        } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(path) = manifest_path {
                config.manifest_path = path;
            }
            cli::manifest_cmd::run(&config).await
        }
        Commands::Doctor => cli::doctor::run(&config).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "otter-harvest", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = &result {
        if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}

/// Exit with status 1 on a configuration the harvest cannot run with.
fn validated(config: &HarvestConfig) {
    if let Err(e) = config.validate() {
        eprintln!("  Error: {e}");
        std::process::exit(1);
    }
}

//! Residue - deep uninstall for leftover application artifacts
//!
//! Usage:
//!   residue uninstall <APP_ID> --auto-select-all --dry-run
//!   residue discover <APP_ID>       # read-only preview as JSON
//!   residue sign <SELECTION_FILE>   # write <file>.sha256

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use residue_core::cancel::CancellationToken;
use residue_core::config::{ConfigStore, ResidueConfig};
use residue_core::context::RunContext;
use residue_core::discovery::DiscoveryEngine;
use residue_core::error::{PipelineError, ValidationError};
use residue_core::events::JsonLinesSink;
use residue_core::inventory::{InventoryProvider, JsonInventory, default_inventory_path};
use residue_core::pipeline::{DeepUninstall, UninstallRequest, report_fatal};
use residue_core::selection::{SelectionRequest, sign_file};

/// Exit status for validation and integrity failures.
const EXIT_FATAL: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "residue")]
#[command(about = "Find and remove what an uninstaller left behind", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: discover, select, remove, verify
    ///
    /// Progress is written to stdout as newline-delimited JSON events.
    Uninstall(UninstallArgs),

    /// Discover artifacts without touching anything
    Discover {
        /// Application id as listed in the inventory
        app_id: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Write the .sha256 signature next to a selection file
    Sign {
        /// Selection file to sign
        selection_file: PathBuf,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Inventory document (defaults to the bundled catalog location)
    #[arg(long)]
    inventory: Option<PathBuf>,

    /// Path to residue.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct UninstallArgs {
    /// Application id as listed in the inventory
    app_id: String,

    #[command(flatten)]
    common: CommonArgs,

    /// Signed selection file written by the host
    #[arg(long)]
    selection: Option<PathBuf>,

    /// Approve every discovered artifact (used when no selection file exists)
    #[arg(long)]
    auto_select_all: bool,

    /// Poll for the selection file instead of failing when it is absent
    #[arg(long)]
    wait_for_selection: bool,

    /// Seconds to wait for the selection file [default: selection.timeout_secs, 600]
    #[arg(long)]
    selection_timeout: Option<u64>,

    /// Report what would be removed without removing anything
    #[arg(long)]
    dry_run: bool,

    /// Do not write the per-run JSON log
    #[arg(long)]
    no_run_log: bool,
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only events.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "residue=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Uninstall(args) => run_uninstall(args),
        Commands::Discover { app_id, common } => run_discover(&app_id, &common),
        Commands::Sign { selection_file } => {
            let sig_path = sign_file(&selection_file)?;
            println!("{}", sig_path.display());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ResidueConfig> {
    let store = match path {
        Some(path) => ConfigStore::from_path(path.to_path_buf()),
        None => ConfigStore::from_default_location()?,
    };
    store.load()
}

fn load_inventory(path: Option<&Path>) -> Result<JsonInventory, ValidationError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_inventory_path().map_err(|err| ValidationError::Inventory {
            path: PathBuf::new(),
            reason: err.to_string(),
        })?,
    };
    JsonInventory::load(&path).map_err(|err| ValidationError::Inventory {
        reason: format!("{:#}", err),
        path,
    })
}

fn run_uninstall(args: UninstallArgs) -> Result<()> {
    let config = load_config(args.common.config.as_deref())?;
    let mut sink = JsonLinesSink::new(io::stdout().lock());

    let inventory = match load_inventory(args.common.inventory.as_deref()) {
        Ok(inventory) => inventory,
        Err(err) => {
            report_fatal(&mut sink, &PipelineError::from(err))?;
            std::process::exit(EXIT_FATAL);
        }
    };

    let selection = SelectionRequest {
        auto_select_all: args.auto_select_all,
        file: args.selection,
        wait: args.wait_for_selection,
        timeout: args
            .selection_timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.selection.timeout()),
        poll_interval: config.selection.poll_interval(),
    };
    let request = UninstallRequest::new(args.app_id, selection)
        .dry_run(args.dry_run)
        .write_run_log(!args.no_run_log);

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    // First Ctrl+C stops the run before removal starts; a second one exits.
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(EXIT_INTERRUPTED);
        }
        tracing::warn!("interrupt received, cancelling (press Ctrl+C again to exit)");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    let ctx = RunContext::for_host(config);
    let pipeline = DeepUninstall::new(&ctx, &inventory).with_cancellation(cancel);
    match pipeline.run(&request, &mut sink) {
        Ok(_) => Ok(()),
        Err(PipelineError::Sink(err)) => Err(err),
        Err(_) => std::process::exit(EXIT_FATAL),
    }
}

fn run_discover(app_id: &str, common: &CommonArgs) -> Result<()> {
    let config = load_config(common.config.as_deref())?;
    let inventory = load_inventory(common.inventory.as_deref())?;
    let app = inventory
        .application(app_id)?
        .ok_or_else(|| ValidationError::UnknownApplication(app_id.to_string()))?;

    let ctx = RunContext::for_host(config);
    let discovery = DiscoveryEngine::new(&ctx).discover(&app);
    let output = serde_json::json!({
        "application": app,
        "artifacts": discovery.artifacts,
        "report": discovery.report,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

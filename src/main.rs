//! cardsync - Trello work-item extraction
//!
//! Main entry point for the cardsync CLI.

use anyhow::Context;
use cardsync::config::{validate_config_result, ExtractorConfig};
use cardsync::extraction::{list_sync_units, Extractor, ExtractorSettings, RateLimitGuard};
use cardsync::model::{Credentials, Outcome, SyncEvent};
use cardsync::sink::JsonlSink;
use cardsync::source::TrelloClient;
use cardsync::store::{SqliteStateStore, StateStore};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

/// cardsync - Trello board extraction with resumable phases
#[derive(Parser, Debug)]
#[command(name = "cardsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/cardsync/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Handle one sync event and print its outcome as JSON
    Run {
        /// Path to the event JSON ("-" for stdin)
        #[arg(short, long)]
        event: PathBuf,

        /// Print Prometheus metrics to stderr afterwards
        #[arg(long)]
        metrics: bool,
    },

    /// List the boards the connection key can extract from
    Units {
        /// Connection key ("key=<api key>&token=<token>")
        #[arg(short, long, env = "TRELLO_CONNECTION_KEY")]
        key: String,

        /// Organization id
        #[arg(long)]
        org_id: Option<String>,
    },

    /// Inspect or reset the saved extraction state
    #[command(subcommand)]
    State(StateCommands),
}

#[derive(Subcommand, Debug)]
enum StateCommands {
    /// Print the saved state and run markers of a sync unit
    Show {
        /// Sync unit (board) id
        unit: String,
    },

    /// Forget the saved state and run markers of a sync unit
    Clear {
        /// Sync unit (board) id
        unit: String,
    },
}

fn main() {
    // Initialize logging
    if let Err(e) = cardsync::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Returns `false` when the command ran but reported a failure
fn run(cli: Cli) -> anyhow::Result<bool> {
    // Init writes the config, so it must not require one
    if let Commands::Init = cli.command {
        handle_init_command(cli.config.as_deref())?;
        return Ok(true);
    }

    let config = ExtractorConfig::load_or_default(cli.config.as_deref())?;
    validate_config_result(&config)?;

    match cli.command {
        Commands::Init => Ok(true),
        Commands::Run { event, metrics } => handle_run_command(&config, &event, metrics),
        Commands::Units { key, org_id } => {
            handle_units_command(&config, key, org_id)?;
            Ok(true)
        }
        Commands::State(cmd) => {
            handle_state_command(&config, cmd)?;
            Ok(true)
        }
    }
}

fn handle_init_command(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config_file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(ExtractorConfig::default_path);

    if config_file.exists() {
        println!("Configuration already exists at {}", config_file.display());
        return Ok(());
    }

    let config = ExtractorConfig::new();
    config
        .save(&config_file)
        .with_context(|| format!("Failed to write {}", config_file.display()))?;

    println!("✓ Created configuration at {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  1. List the boards you can extract:");
    println!("     TRELLO_CONNECTION_KEY='key=...&token=...' cardsync units");
    println!();
    println!("  2. Run a sync event:");
    println!("     cardsync run --event start.json");

    Ok(())
}

fn read_event(path: &Path) -> anyhow::Result<SyncEvent> {
    let content = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read event from stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))?
    };
    serde_json::from_str(&content).context("Invalid sync event JSON")
}

fn handle_run_command(config: &ExtractorConfig, event: &Path, metrics: bool) -> anyhow::Result<bool> {
    let outcome = run_event(config, event);

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if metrics {
        eprintln!("{}", cardsync::metrics::gather_metrics());
    }

    Ok(!outcome.is_error())
}

/// Handle one event file. Setup failures become an ERROR outcome too.
fn run_event(config: &ExtractorConfig, event: &Path) -> Outcome {
    let prepared = read_event(event).and_then(|event| {
        let extractor = build_extractor(config, &event)?;
        let runtime = tokio::runtime::Runtime::new()?;
        Ok((extractor, event, runtime))
    });

    match prepared {
        Ok((extractor, event, runtime)) => runtime.block_on(extractor.handle(event)),
        Err(e) => {
            tracing::error!("Run setup failed: {:#}", e);
            cardsync::metrics::record_outcome("error");
            Outcome::Error {
                message: format!("{:#}", e),
            }
        }
    }
}

fn build_extractor(config: &ExtractorConfig, event: &SyncEvent) -> anyhow::Result<Extractor> {
    let source = TrelloClient::new(&event.credentials, &config.source)?;
    let sink = JsonlSink::new(config.storage.artifact_dir.clone());
    let store = SqliteStateStore::open(&config.storage.state_db)?;

    Ok(Extractor::with_settings(
        Arc::new(source),
        Arc::new(sink),
        Arc::new(store),
        ExtractorSettings::from(config),
    ))
}

fn handle_units_command(
    config: &ExtractorConfig,
    key: String,
    org_id: Option<String>,
) -> anyhow::Result<()> {
    let credentials = Credentials { key, org_id };
    let source = TrelloClient::new(&credentials, &config.source)?;
    let guard = RateLimitGuard::new(config.rate_limit.default_delay_secs);

    let runtime = tokio::runtime::Runtime::new()?;
    let units = runtime.block_on(list_sync_units(&source, &guard, config.source.page_size))?;

    println!("{}", serde_json::to_string_pretty(&units)?);
    Ok(())
}

fn handle_state_command(config: &ExtractorConfig, cmd: StateCommands) -> anyhow::Result<()> {
    let store = SqliteStateStore::open(&config.storage.state_db)?;

    match cmd {
        StateCommands::Show { unit } => {
            let state = store.load(&unit)?;
            let last_start = store.last_successful_start(&unit)?;
            let report = serde_json::json!({
                "unit": unit,
                "lastSuccessfulStart": last_start,
                "state": state,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        StateCommands::Clear { unit } => {
            store.clear(&unit)?;
            println!("✓ Cleared state for {}", unit);
        }
    }
    Ok(())
}

//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use adventuremap_core::{Pipeline, PipelineRun, ProgressReporter, Stage, StageReport};
use adventuremap_places::GoogleMapsClient;
use adventuremap_shared::{AppConfig, SessionId, init_config, load_config};
use adventuremap_storage::{ArtifactPublisher, InMemoryArtifactStore};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// AdventureMap: describe a trip, get a map.
#[derive(Parser)]
#[command(
    name = "adventuremap",
    version,
    about = "Turn an adventure description into a KML map of matching places.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build a map for an adventure description.
    Create {
        /// What to map, e.g. "waterfalls in Vermont".
        description: String,

        /// Session id scoping stored files (defaults to a fresh id).
        #[arg(short, long)]
        session: Option<String>,

        /// Directory to write the map file to when it was kept locally.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the final run state as JSON.
        #[arg(long)]
        dump_state: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "adventuremap=info",
        1 => "adventuremap=debug",
        _ => "adventuremap=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Create {
            description,
            session,
            out,
            dump_state,
        } => cmd_create(&description, session.as_deref(), out.as_deref(), dump_state).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_create(
    description: &str,
    session: Option<&str>,
    out: Option<&Path>,
    dump_state: bool,
) -> Result<()> {
    let config = load_config()?;

    let session = match session {
        Some(id) => id.parse::<SessionId>()?,
        None => SessionId::new(),
    };

    let api_key = config.maps_api_key();
    if api_key.is_none() {
        warn!(
            env = %config.maps.api_key_env,
            "Google Maps API key not set; place search will report an error"
        );
    }
    let maps = Arc::new(GoogleMapsClient::new(&config.maps, api_key)?);

    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let publisher = Arc::new(ArtifactPublisher::from_config(
        &config.storage,
        artifacts.clone(),
    )?);

    info!(
        %session,
        durable = publisher.durable_enabled(),
        "creating adventure map"
    );

    let pipeline = Pipeline::new(maps.clone(), maps, publisher);
    let reporter = CliProgress::new();
    let run = pipeline.run(description, &session, &reporter).await?;

    println!();
    println!("  {}", run.message);
    println!();
    println!("  Session: {}", run.session);
    for report in &run.stages {
        let mark = if report.status.ok { "ok" } else { "!!" };
        println!("  [{mark}] {}", report.status);
    }
    println!("  Time:    {:.1}s", run.elapsed.as_secs_f64());
    println!();

    if let Some(dir) = out {
        export_artifact(&run, &artifacts, dir).await?;
    }

    if dump_state {
        let snapshot = run.state.snapshot()?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    Ok(())
}

/// Copy the run's map file out of the in-memory store into `dir`.
async fn export_artifact(
    run: &PipelineRun,
    artifacts: &InMemoryArtifactStore,
    dir: &Path,
) -> Result<()> {
    let Some(name) = run.artifact_name() else {
        warn!("no local map file to export");
        return Ok(());
    };

    let content = artifacts
        .get(&run.session, name)
        .await
        .ok_or_else(|| eyre!("artifact {name} missing from session {}", run.session))?;

    std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("cannot create {}: {e}", dir.display()))?;
    let path = dir.join(name);
    std::fs::write(&path, content).map_err(|e| eyre!("cannot write {}: {e}", path.display()))?;

    println!("  Saved:   {}", path.display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: Stage) {
        self.spinner.set_message(stage.label());
    }

    fn stage_finished(&self, report: &StageReport) {
        if !report.status.ok {
            self.spinner
                .println(format!("  {}: {}", report.stage.label(), report.status));
        }
    }

    fn done(&self, _run: &PipelineRun) {
        self.spinner.finish_and_clear();
    }
}

//! Subagent Hub CLI
//!
//! # Usage
//!
//! ```bash
//! # Pick the best executor for a task from a directory of manifests
//! subagent-hub route "fix database migration" --tool git --manifests ./executors
//!
//! # Show registrations and statistics
//! subagent-hub inspect --manifests ./executors --format json
//!
//! # Show or validate the effective configuration
//! subagent-hub config show
//! subagent-hub --config hub.toml config validate
//! ```

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use subagent_hub::discovery::ManifestProvider;
use subagent_hub::{CapabilityRouter, ExecutorRegistry, HubConfig};

#[derive(Parser)]
#[command(name = "subagent-hub")]
#[command(about = "Subagent Hub - route tasks to specialized executors", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: .subagent-hub/config.toml if present)
    #[arg(short, long, global = true, env = "SUBAGENT_HUB_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    format: OutputFormatArg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Select the best executor for a task
    Route {
        /// Task description
        task: String,

        /// Required tool (repeatable)
        #[arg(short, long = "tool")]
        tools: Vec<String>,

        /// Directory of executor manifests (*.toml)
        #[arg(short, long)]
        manifests: PathBuf,
    },

    /// Show registered executors and statistics
    Inspect {
        /// Directory of executor manifests (*.toml)
        #[arg(short, long)]
        manifests: PathBuf,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Route {
            task,
            tools,
            manifests,
        } => route(&config, &task, &tools, &manifests, cli.format).await,
        Commands::Inspect { manifests } => inspect(&config, &manifests, cli.format).await,
        Commands::Config(ConfigCommands::Show) => {
            match cli.format {
                OutputFormatArg::Human => print!("{}", config.to_toml()?),
                OutputFormatArg::Json => println!("{}", serde_json::to_string_pretty(&config)?),
            }
            Ok(())
        }
        // loading already validated it
        Commands::Config(ConfigCommands::Validate) => {
            println!("Configuration is valid");
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<HubConfig> {
    let config = match path {
        Some(path) => HubConfig::load_from_path(path)?,
        None => HubConfig::load()?,
    };
    Ok(config)
}

async fn load_registry(config: &HubConfig, manifests: &Path) -> Result<Arc<ExecutorRegistry>> {
    let registry = Arc::new(ExecutorRegistry::from_config(config));
    let descriptors = ManifestProvider::new(manifests)
        .load()
        .await
        .context("Failed to load executor manifests")?;

    for descriptor in descriptors {
        registry.register(descriptor).await;
    }

    Ok(registry)
}

async fn route(
    config: &HubConfig,
    task: &str,
    tools: &[String],
    manifests: &Path,
    format: OutputFormatArg,
) -> Result<()> {
    let registry = load_registry(config, manifests).await?;
    let router = CapabilityRouter::new(registry);

    let ranking = router.rank(task, tools).await;
    let selected = router.find_best_executor(task, tools).await;

    match format {
        OutputFormatArg::Json => {
            let output = serde_json::json!({
                "task": task,
                "required_tools": tools,
                "selected": selected.as_ref().map(|r| r.id()),
                "candidates": ranking,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormatArg::Human => match selected {
            Some(registration) => {
                println!(
                    "{} ({}, {})",
                    registration.id(),
                    registration.descriptor.name,
                    registration.descriptor.role
                );
                for score in &ranking {
                    println!("  {:<24} {:>6.2}", score.executor_id, score.total());
                }
            }
            None => println!("no executor available"),
        },
    }

    Ok(())
}

async fn inspect(config: &HubConfig, manifests: &Path, format: OutputFormatArg) -> Result<()> {
    let registry = load_registry(config, manifests).await?;
    let registrations = registry.snapshot().await;
    let statistics = registry.statistics().await;

    match format {
        OutputFormatArg::Json => {
            let output = serde_json::json!({
                "executors": registrations,
                "statistics": statistics,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormatArg::Human => {
            for registration in &registrations {
                println!(
                    "{:<20} {:<16} {:<12} tools: {}",
                    registration.id(),
                    registration.descriptor.role,
                    registration.status,
                    registration.capabilities.tools.join(", ")
                );
            }
            println!();
            println!("Executors: {}", statistics.total_executors);
            for (status, count) in &statistics.totals_by_status {
                println!("  {:<12} {}", status, count);
            }
            println!(
                "Average success rate: {:.1}%",
                statistics.averages.average_success_rate
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("subagent_hub=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("subagent_hub=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

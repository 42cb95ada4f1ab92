//! Storelens - storage unit browser
//!
//! Single binary over the key-value adapter:
//! - connectivity and database discovery
//! - storage unit listing with shape and size
//! - paged, filtered row reads
//! - JSON-lines export

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use storelens_common::config::LoggingConfig;
use storelens_common::DatabaseType;
use storelens_engine::Engine;
use storelens_redis::RedisPlugin;

mod cli;
mod config;

#[derive(Parser)]
#[command(name = "storelens")]
#[command(author, version, about = "Storelens - browse key-value storage units", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (TOML or JSON)
    #[arg(short, long, default_value = "storelens.toml", env = "STORELENS_CONFIG")]
    config: String,

    #[command(flatten)]
    target: TargetArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Where to connect: a saved profile, or explicit flags
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Saved profile alias (config file or STORELENS_REDIS environment)
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    #[arg(long, global = true, default_value = "localhost", env = "STORELENS_HOST")]
    pub host: String,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[arg(long, global = true, default_value = "")]
    pub username: String,

    #[arg(long, global = true, default_value = "", env = "STORELENS_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Logical database number
    #[arg(short, long, global = true, default_value = "0")]
    pub database: String,

    /// disabled, enabled or insecure
    #[arg(long, global = true, default_value = "disabled")]
    pub ssl_mode: String,

    /// PEM file with the CA certificate (ssl-mode enabled)
    #[arg(long, global = true)]
    pub ssl_ca: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the backend answers
    Ping,

    /// List reachable logical databases
    Databases,

    /// List storage units with their type and size
    Units,

    /// Show the columns of a storage unit
    Columns {
        unit: String,
    },

    /// Read rows of a storage unit
    Rows {
        unit: String,

        /// Rows per page; 0 reads to the end
        #[arg(long, default_value_t = 50)]
        page_size: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Filter such as `value>10` or `username=johndoe`
        #[arg(short, long = "where")]
        filter: Option<String>,
    },

    /// Export a storage unit as JSON lines
    Export {
        unit: String,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load(&cli.config).await?;
    init_tracing(&config.logging)?;
    debug!(path = %cli.config, profiles = config.profiles.len(), "Configuration loaded");

    let mut engine = Engine::new();
    engine.register_plugin(RedisPlugin::tcp(&config).into_plugin());
    for profile in &config.profiles {
        engine.add_login_profile(profile.clone());
    }
    let from_env = engine.load_env_profiles()?;
    if from_env > 0 {
        info!(count = from_env, "Loaded environment profiles");
    }

    let plugin = engine
        .choose(DatabaseType::Redis)
        .context("no adapter registered for Redis")?;
    let plugin_config = config::plugin_config(&engine, &cli.target)?;
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Ping => cli::ping(plugin, &plugin_config, &mut stdout).await?,
        Commands::Databases => cli::databases(plugin, &plugin_config, &mut stdout).await?,
        Commands::Units => cli::units(plugin, &plugin_config, &mut stdout).await?,
        Commands::Columns { unit } => cli::columns(plugin, &plugin_config, &unit, &mut stdout).await?,
        Commands::Rows {
            unit,
            page_size,
            offset,
            filter,
        } => {
            let query = cli::rows_query(page_size, offset, filter.as_deref())?;
            cli::rows(plugin, &plugin_config, &unit, &query, &mut stdout).await?;
        }
        Commands::Export { unit, output } => match output {
            Some(path) => {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                let written = cli::export(plugin, &plugin_config, &unit, std::io::BufWriter::new(file)).await?;
                info!(unit = %unit, rows = written, path = %path.display(), "Export written");
            }
            None => {
                cli::export(plugin, &plugin_config, &unit, stdout).await?;
            }
        },
    }

    Ok(())
}

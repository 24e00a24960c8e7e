//! ODE Daemon - Open Decision Engine service
//!
//! The daemon provides:
//! - An autonomous runner recording observations under a daily quota
//! - A JSON snapshot of the ledger
//! - A WebSocket live feed of new ledger entries

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ode_daemon::commands;
use ode_daemon::config::DaemonConfig;
use ode_daemon::error::{DaemonError, DaemonResult};
use ode_daemon::server::Server;

/// ODE Daemon CLI
#[derive(Parser)]
#[command(name = "oded")]
#[command(about = "Open Decision Engine - agent ledger, runner and live feed", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ODE_CONFIG", global = true)]
    config: Option<String>,

    /// Ledger file path
    #[arg(long, env = "ODE_LEDGER_FILE", global = true)]
    ledger: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "ODE_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "ODE_LOG_JSON", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the autonomous runner, live feed and HTTP API (default)
    Serve {
        /// Listen address
        #[arg(short, long, env = "ODE_LISTEN_ADDR")]
        listen: Option<String>,

        /// Serve the ledger without running the autonomous runner
        #[arg(long)]
        no_runner: bool,
    },

    /// Run a single observation cycle and exit
    Observe {
        /// Agent id stamped on the entry
        #[arg(long, default_value = "obs_01")]
        agent_id: String,
    },

    /// Print the ledger as newline-delimited JSON
    Entries,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(path) = cli.ledger {
        config.ledger.path = path;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    match cli.command.unwrap_or(Command::Serve {
        listen: None,
        no_runner: false,
    }) {
        Command::Serve { listen, no_runner } => {
            if let Some(listen) = listen {
                config.server.listen_addr = listen.parse().map_err(|e| {
                    DaemonError::Config(format!("Invalid listen address: {}", e))
                })?;
            }
            if no_runner {
                config.server.run_runner = false;
            }

            // Print startup banner
            println!(
                r#"
   ___  ___  ___
  / _ \|   \| __|
 | (_) | |) | _|
  \___/|___/|___|

  Open Decision Engine
  Version: {}
  Ledger: {}
  Runner: {}
  Listening: {}
"#,
                env!("CARGO_PKG_VERSION"),
                config.ledger.path.display(),
                if config.server.run_runner {
                    format!(
                        "{} ({}/day, every {}s)",
                        config.runner.agent_id,
                        config.runner.max_actions_per_day,
                        config.runner.observation_interval_secs
                    )
                } else {
                    "disabled".to_string()
                },
                config.server.listen_addr
            );

            let server = Server::new(config)?;
            server.run().await
        }

        Command::Observe { agent_id } => {
            config.validate()?;
            println!("--- Open Decision Engine Starting ---");
            let summary = commands::observe(&config, &agent_id).await?;
            println!(
                "{}",
                serde_json::to_string(&summary.report.outcome).unwrap_or_default()
            );
            println!("Total entries in ledger: {}", summary.total_entries);
            println!("--- Cycle Complete ---");
            Ok(())
        }

        Command::Entries => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            commands::dump_entries(&config, &mut out).await?;
            Ok(())
        }
    }
}

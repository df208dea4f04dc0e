// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Netpulse - device-fleet command dispatch and liveness hub.
//!
//! This binary runs either side of the system: `serve` starts the central
//! hub, `agent run` starts the device-side client on a probe.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};

mod agent_cmd;
mod device_cmd;
mod serve;
mod shutdown;

/// Netpulse - device-fleet command dispatch and liveness hub.
#[derive(Parser, Debug)]
#[command(name = "netpulse", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the hub: gateway server plus visibility reclaimer.
    Serve,
    /// Device-side agent commands.
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
    /// Manage the device registry.
    Device {
        #[command(subcommand)]
        command: DeviceCommands,
    },
    /// Show the resolved configuration.
    Config,
}

#[derive(Subcommand, Debug)]
enum AgentCommands {
    /// Run the agent until interrupted.
    Run,
}

#[derive(Subcommand, Debug)]
enum DeviceCommands {
    /// Register a device and print its generated secret (shown once).
    Add {
        /// Device identifier.
        #[arg(long)]
        id: String,
        /// Owning customer identifier.
        #[arg(long)]
        customer: String,
    },
    /// List registered devices.
    List,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match netpulse_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            netpulse_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.server.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Agent {
            command: AgentCommands::Run,
        }) => agent_cmd::run_agent(config).await,
        Some(Commands::Device { command }) => match command {
            DeviceCommands::Add { id, customer } => {
                device_cmd::run_add(&config, &id, &customer).await
            }
            DeviceCommands::List => device_cmd::run_list(&config).await,
        },
        Some(Commands::Config) => {
            match toml::to_string_pretty(&config) {
                Ok(rendered) => {
                    println!("{rendered}");
                    Ok(())
                }
                Err(e) => Err(netpulse_core::NetpulseError::Internal(format!(
                    "failed to render config: {e}"
                ))),
            }
        }
        None => {
            println!("netpulse: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("netpulse: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("netpulse={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

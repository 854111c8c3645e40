//! logward - host telemetry agent
//!
//! Tails auditd, syslog, auth.log and shell history, and ships batched
//! events to a collector over TCP.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use logward_agent::{Agent, AgentConfig, StartOptions, TcpTransport, logging};
use logward_spool::Spool;
use tokio::runtime::Handle;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "logward")]
#[command(about = "Host telemetry agent with durable delivery")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent until SIGINT or SIGTERM
    Run {
        /// Path to config file
        #[arg(short, long, env = "LOGWARD_CONFIG", default_value = "agent.toml")]
        config: PathBuf,

        /// Read sources from the beginning on a first run
        #[arg(long)]
        from_begin: bool,
    },

    /// Write a config file with every default spelled out
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "agent.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show how many payloads are waiting in the spool
    Status {
        /// Path to config file
        #[arg(short, long, env = "LOGWARD_CONFIG", default_value = "agent.toml")]
        config: PathBuf,
    },

    /// Discard every spooled payload
    ClearSpool {
        /// Path to config file
        #[arg(short, long, env = "LOGWARD_CONFIG", default_value = "agent.toml")]
        config: PathBuf,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, from_begin } => run_agent(config, from_begin).await,
        Commands::InitConfig { output, force } => init_config(&output, force),
        Commands::Status { config } => status(&config),
        Commands::ClearSpool { config } => clear_spool(&config),
    }
}

async fn run_agent(config_path: PathBuf, from_begin: bool) -> anyhow::Result<()> {
    let config = AgentConfig::from_file(&config_path)?;
    logging::init(&config.logging)?;
    info!(config = %config_path.display(), "loaded config");

    let transport = TcpTransport::from_config(&config.server, Handle::current());
    let mut agent = Agent::new(config, transport, StartOptions { from_begin })?;
    agent
        .run(shutdown_signal())
        .await
        .context("agent shutdown failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}

fn init_config(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }
    let rendered = AgentConfig::default().to_toml()?;
    std::fs::write(output, rendered)
        .with_context(|| format!("cannot write {}", output.display()))?;

    println!("Config written to {}", output.display());
    println!();
    println!("Point [server] at your collector, then run:");
    println!("  logward run --config {}", output.display());
    Ok(())
}

fn status(config_path: &Path) -> anyhow::Result<()> {
    let config = AgentConfig::from_file(config_path)?;
    let spool = Spool::open(config.spool_dir(), config.send.ram_ring_capacity)?;
    let status = spool.status()?;

    println!("Spool:    {}", spool.dir().display());
    println!("Disk:     {}", status.disk);
    println!("Inflight: {}", if status.inflight { "yes" } else { "no" });
    println!("Total:    {}", status.total());
    println!("State:    {}", config.state_path().display());
    Ok(())
}

fn clear_spool(config_path: &Path) -> anyhow::Result<()> {
    let config = AgentConfig::from_file(config_path)?;
    let mut spool = Spool::open(config.spool_dir(), config.send.ram_ring_capacity)?;
    let before = spool.status()?.total();
    spool.clear_all()?;

    println!("Discarded {before} spooled payloads");
    Ok(())
}

//! Chat Daemon - TCP chat room server with an operator console
//!
//! Accepts chat clients on a TCP port and reads operator commands from
//! stdin while it runs.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default 0.0.0.0:8081
//! chatd
//!
//! # Listen elsewhere
//! chatd --listen 127.0.0.1:9000
//!
//! # Load settings from a TOML file
//! chatd --config ./chatd.toml
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chatd::config::{ServerConfig, LISTEN_ADDR_ENV};
use chatd::console::Console;
use chatd::ranking::{MemoryRankingStore, RankingStore, RedisRankingStore};
use chatd::server::{ChatServer, ServerContext};

/// Chat room server
#[derive(Parser, Debug)]
#[command(name = "chatd", version, about)]
struct Args {
    /// TOML configuration file (defaults to <config dir>/chatroom/chatd.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overrides the config file and CHATD_ADDR
    #[arg(short, long)]
    listen: Option<String>,

    /// Disable the stdin operator console
    #[arg(long)]
    no_console: bool,
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chatroom").join("chatd.toml"))
}

/// Resolves configuration: defaults, then file, then environment, then flags.
fn load_config(args: &Args) -> Result<ServerConfig> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|path| path.exists()),
    };

    let mut config = match path {
        Some(path) => load_file(&path)?,
        None => ServerConfig::default(),
    };

    if let Ok(addr) = env::var(LISTEN_ADDR_ENV) {
        config.listen_addr = addr;
    }
    if let Some(addr) = &args.listen {
        config.listen_addr = addr.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_file(path: &Path) -> Result<ServerConfig> {
    ServerConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    run_server(config, !args.no_console)
}

#[tokio::main]
async fn run_server(config: ServerConfig, with_console: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chatd=info".parse()?)
                .add_directive("chat_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        listen = %config.listen_addr,
        "Chat daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let ranking = open_ranking_store(&config).await;
    let context = ServerContext::new(config, ranking).context("Invalid configuration")?;
    let server = ChatServer::bind(context.clone(), cancel_token)
        .await
        .context("Failed to start chat server")?;

    if with_console {
        let console = Console::new(context.registry.clone(), context.ranking.clone());
        tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(e) = console.run(stdin, tokio::io::stdout()).await {
                warn!(error = %e, "Operator console stopped");
            }
        });
    }

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Chat daemon stopped");
    Ok(())
}

/// Uses Redis when `ranking_url` is set and reachable, memory otherwise.
async fn open_ranking_store(config: &ServerConfig) -> Arc<dyn RankingStore> {
    let Some(url) = &config.ranking_url else {
        info!("Using in-memory activity ranking");
        return Arc::new(MemoryRankingStore::new());
    };

    match RedisRankingStore::connect(url, config.ranking_key.clone()).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(error = %e, "Redis ranking unavailable, falling back to in-memory ranking");
            Arc::new(MemoryRankingStore::new())
        }
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

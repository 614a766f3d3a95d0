//! Chat - interactive line client for the chat room
//!
//! Prompts for a display name, then prints everything the server sends
//! while forwarding each line typed on stdin. Typing `exit` leaves.
//!
//! # Usage
//!
//! ```bash
//! chat
//! chat --server 10.0.0.5:8081
//! CHAT_SERVER=10.0.0.5:8081 chat
//! ```

use std::env;
use std::io::Write;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use chat_client::{ChatClient, ClientConfig, ClientError, DEFAULT_SERVER_ADDR, SERVER_ADDR_ENV};
use chat_protocol::{DEFAULT_MAX_FRAME_SIZE, EXIT_COMMAND};

/// Chat room client
#[derive(Parser, Debug)]
#[command(name = "chat", version, about)]
struct Args {
    /// Server address (host:port), falls back to CHAT_SERVER then 127.0.0.1:8081
    #[arg(short, long)]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never interleave with chat output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("chat_client=warn".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = ClientConfig {
        server_addr: args
            .server
            .or_else(|| env::var(SERVER_ADDR_ENV).ok())
            .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string()),
        max_frame_size: DEFAULT_MAX_FRAME_SIZE,
    };

    let mut client = ChatClient::connect_with(&config)
        .await
        .context("Could not reach the chat server")?;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let Some(welcome) = negotiate_name(&mut client, &mut stdin).await? else {
        return Ok(());
    };
    println!("{welcome}");

    let (mut reader, mut writer) = client.into_split();
    let mut printer = tokio::spawn(async move {
        while let Some(frame) = reader.recv().await {
            println!("{frame}");
        }
    });

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("stdin closed");
                    writer.exit().await?;
                    break;
                };
                if line.trim() == EXIT_COMMAND {
                    writer.exit().await?;
                    break;
                }
                if let Err(e) = writer.send(&line).await {
                    eprintln!("Send failed: {e}");
                    break;
                }
            }
            _ = &mut printer => {
                println!("Disconnected from server.");
                // A blocking stdin read cannot be cancelled; leave without waiting for it
                process::exit(0);
            }
        }
    }

    printer.abort();
    Ok(())
}

/// Prompts until the server accepts a name. `Ok(None)` means stdin closed.
async fn negotiate_name(
    client: &mut ChatClient,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> Result<Option<String>> {
    loop {
        print!("Enter your name: ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = stdin.next_line().await.context("Failed to read stdin")? else {
            return Ok(None);
        };

        match client.join(&line).await {
            Ok(welcome) => return Ok(Some(welcome)),
            Err(e) if e.is_retryable() => eprintln!("{e}"),
            Err(ClientError::Closed) => anyhow::bail!("Server closed the connection"),
            Err(e) => return Err(e.into()),
        }
    }
}

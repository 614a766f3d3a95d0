//! Operator console.
//!
//! Line-oriented commands read from the server's stdin. The console is just
//! another caller of the registry and the ranking store; it never touches a
//! session directly.
//!
//! | Command       | Effect                                   |
//! |---------------|------------------------------------------|
//! | `top10`       | Top ten users by activity                |
//! | `all`         | Full ranking                             |
//! | `rank <name>` | 1-based rank of one user                 |
//! | `del <name>`  | Remove one user's score                  |
//! | `online`      | Connected users with their join time     |
//! | `help`        | Command summary                          |

use std::fmt::Write as _;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::ranking::{RankingError, RankingStore, TOP_N};
use crate::registry::SessionRegistry;

/// One-line command summary printed by `help` and after unknown input.
pub const HELP: &str = "Commands: top10 | all | rank <name> | del <name> | online | help";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Top10,
    All,
    Rank(String),
    Delete(String),
    Online,
    Help,
    /// Blank line; prints nothing.
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    /// Parses one line. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        match line {
            "" => return Self::Empty,
            "top10" => return Self::Top10,
            "all" => return Self::All,
            "online" => return Self::Online,
            "help" => return Self::Help,
            _ => {}
        }

        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line, ""),
        };

        match (verb, arg) {
            ("rank", name) if !name.is_empty() => Self::Rank(name.to_string()),
            ("del", name) if !name.is_empty() => Self::Delete(name.to_string()),
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// Executes console commands against shared server state.
#[derive(Clone)]
pub struct Console {
    registry: SessionRegistry,
    ranking: Arc<dyn RankingStore>,
}

impl Console {
    pub fn new(registry: SessionRegistry, ranking: Arc<dyn RankingStore>) -> Self {
        Self { registry, ranking }
    }

    /// Reads commands from `input` until EOF, writing results to `output`.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        output.write_all(format!("{HELP}\n").as_bytes()).await?;
        output.flush().await?;

        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            let command = ConsoleCommand::parse(&line);
            debug!(?command, "Console command");
            self.execute(command, &mut output).await?;
        }

        debug!("Console input closed");
        Ok(())
    }

    /// Runs one command and writes its output.
    pub async fn execute<W>(&self, command: ConsoleCommand, output: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let text = self.render(command).await;
        output.write_all(text.as_bytes()).await?;
        output.flush().await
    }

    async fn render(&self, command: ConsoleCommand) -> String {
        match command {
            ConsoleCommand::Top10 => match self.ranking.top_n(TOP_N).await {
                Ok(names) => listing(&format!("Top {TOP_N} users:"), &names),
                Err(e) => store_failure(e),
            },
            ConsoleCommand::All => match self.ranking.all_ranked().await {
                Ok(names) => listing("All ranked users:", &names),
                Err(e) => store_failure(e),
            },
            ConsoleCommand::Rank(name) => match self.ranking.rank_of(&name).await {
                Ok(Some(rank)) => format!("{name} is ranked {rank}\n"),
                Ok(None) => format!("{name}: not found\n"),
                Err(e) => store_failure(e),
            },
            ConsoleCommand::Delete(name) => match self.ranking.delete_entry(&name).await {
                Ok(()) => {
                    info!(name = %name, "Operator deleted activity score");
                    format!("Deleted ranking entry for {name}\n")
                }
                Err(e) => store_failure(e),
            },
            ConsoleCommand::Online => {
                let sessions = self.registry.snapshot().await;
                let mut out = format!("{} online:\n", sessions.len());
                for handle in sessions {
                    let _ = writeln!(
                        out,
                        "  {} (since {})",
                        handle.name(),
                        handle.joined_at().format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
                out
            }
            ConsoleCommand::Help => format!("{HELP}\n"),
            ConsoleCommand::Empty => String::new(),
            ConsoleCommand::Unknown(text) => format!("Unknown command: {text}\n{HELP}\n"),
        }
    }
}

fn listing(title: &str, names: &[String]) -> String {
    let mut out = format!("{title}\n");
    if names.is_empty() {
        out.push_str("  (none)\n");
    }
    for (i, name) in names.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, name);
    }
    out
}

fn store_failure(err: RankingError) -> String {
    format!("{err}\n")
}

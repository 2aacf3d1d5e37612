//! Focusguard control tool.
//!
//! Talks to a running daemon over its control socket.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use focusguard::config::DEFAULT_SOCKET_PATH;
use focusguard::control::{Request, Response, send_request};

/// Focusguard control - inspect and pause the DNS filter
#[derive(Parser)]
#[command(name = "focusguard-ctl", version, about, long_about = None)]
struct Cli {
    /// Control socket of the daemon
    #[arg(short, long, env = "FOCUSGUARD_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Print the raw JSON response
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the daemon is running
    Ping,
    /// Show request counters, top domains and recent activity
    Stats,
    /// Suspend blocking for the configured window
    Pause,
}

impl Command {
    const fn request(&self) -> Request {
        match self {
            Self::Ping => Request::Ping,
            Self::Stats => Request::GetStats,
            Self::Pause => Request::Pause,
        }
    }
}

fn print_stats(response: &Response) {
    let count = |value: Option<u64>| value.unwrap_or_default();

    println!("Uptime:          {}", response.uptime.as_deref().unwrap_or("-"));
    println!("Total requests:  {}", count(response.total_requests));
    println!("Blocked:         {}", count(response.blocked_requests));
    println!("Allowed:         {}", count(response.allowed_requests));
    println!();

    if response.is_paused.unwrap_or(false) {
        println!(
            "Blocking paused until {}",
            response.pause_ends_at.as_deref().unwrap_or("-")
        );
    } else {
        println!("Blocking active");
    }
    println!(
        "Pauses: {} ({} paused, {} blocking)",
        count(response.pause_count),
        response.total_pause_time.as_deref().unwrap_or("-"),
        response.total_blocking_time.as_deref().unwrap_or("-"),
    );

    if let Some(top) = response.top_domains.as_deref()
        && !top.is_empty()
    {
        println!();
        println!("Top domains:");
        for entry in top {
            let marker = if entry.blocked { " [blocked]" } else { "" };
            println!("  {:>8}  {}{marker}", entry.count, entry.domain);
        }
    }

    if let Some(activity) = response.recent_activity.as_deref() {
        let peak = activity.iter().copied().max().unwrap_or_default();
        let last = activity.last().copied().unwrap_or_default();
        println!();
        println!(
            "Last minute: {} queries (peak {peak}/s, now {last}/s)",
            activity.iter().sum::<u64>()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let response = send_request(&cli.socket, cli.command.request())
        .await
        .with_context(|| format!("Failed to talk to daemon at {}", cli.socket.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match cli.command {
        Command::Ping => println!("pong"),
        Command::Stats => print_stats(&response),
        Command::Pause => println!(
            "Blocking paused until {}",
            response.pause_ends_at.as_deref().unwrap_or("-")
        ),
    }
    Ok(())
}

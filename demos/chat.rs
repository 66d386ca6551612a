//! Terminal chat client.
//!
//! This example demonstrates:
//! - Reading connection settings from `REDIS_HOST` / `REDIS_PORT`
//! - Opening a [`ChatRoom`] with one publishing and one subscribing session
//! - Turning stdin lines into chat messages
//!
//! # Running
//!
//! ```text
//! cargo run --example chat -- --user ada
//! cargo run --example chat -- --user bob --channel lobby
//! ```
//!
//! Type a line to send it, `/me <action>` to emote and `/quit` (or EOF) to
//! leave. A line starting with `{` is passed through as a raw client
//! payload, e.g. `{"action":"message","message":"hi"}`.

use std::io;

use clap::Parser;
use respwire_client::chat::DEFAULT_CHANNEL;
use respwire_client::{ChatRoom, ConnectionConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Chat over store pub/sub from the terminal.
#[derive(Parser, Debug)]
#[command(name = "chat")]
#[command(version, about, long_about = None)]
struct Args {
    /// Name shown to other users
    #[arg(long, short)]
    user: String,

    /// Channel to join
    #[arg(long, short, default_value = DEFAULT_CHANNEL)]
    channel: String,

    /// Store host (overrides REDIS_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Store port (overrides REDIS_PORT)
    #[arg(long)]
    port: Option<u16>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let mut config = ConnectionConfig::from_env()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let mut room = ChatRoom::open(&config, args.channel, |msg| println!("{}", msg)).await?;
    room.join(args.user)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            raw if raw.starts_with('{') => {
                if let Err(e) = room.handle_client_data(raw.as_bytes()) {
                    eprintln!("ignored: {}", e);
                }
            }
            text => room.say(text)?,
        }
    }

    room.leave().await?;
    Ok(())
}

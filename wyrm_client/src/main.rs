//! Standalone headless client binary.
//!
//! Usage:
//!   cargo run -p wyrm_client -- [--addr 127.0.0.1:1337] [--user pilot] [--pass secret] [--name Nidhogg]
//!
//! Connects, authenticates, and prints a summary of the replicated world
//! once a second until the server closes the connection.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use wyrm_client::client::{ClientState, GameClient};

struct Args {
    addr: String,
    user: String,
    pass: String,
    name: Option<String>,
}

fn parse_args() -> Args {
    let mut parsed = Args {
        addr: "127.0.0.1:1337".to_string(),
        user: "pilot".to_string(),
        pass: String::new(),
        name: None,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                parsed.addr = args[i + 1].clone();
                i += 2;
            }
            "--user" if i + 1 < args.len() => {
                parsed.user = args[i + 1].clone();
                i += 2;
            }
            "--pass" if i + 1 < args.len() => {
                parsed.pass = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                parsed.name = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }
    parsed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let addr: SocketAddr = args.addr.parse().context("parse --addr")?;

    let mut client = GameClient::connect(addr).await.context("connect")?;
    if !client.authenticate(&args.user, &args.pass).await? {
        anyhow::bail!("authentication rejected by server");
    }

    if let Some(name) = args.name {
        client.set_name(&name).await?;
    }

    while client.state == ClientState::Ready {
        tokio::time::sleep(Duration::from_secs(1)).await;
        client.poll()?;

        info!(objects = client.world.len(), "World");
        for obj in client.world.values() {
            info!(
                id = obj.id,
                name = %obj.name,
                x = %obj.position.x,
                y = %obj.position.y,
                rot = %obj.rotation,
                "  object"
            );
        }
    }

    info!("Disconnected");
    Ok(())
}

//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p wyrm_server -- [--addr 127.0.0.1:1337] [--tick-hz 64] [--config server.json]
//!
//! The server greets each connection with the protocol banner, runs the
//! authentication handshake, and replicates the object world to every
//! authenticated client at the configured tick rate.
//!
//! Console commands:
//!   status          - Show server status
//!   players         - List connected players
//!   spawn <name>    - Spawn a planet
//!   despawn <id>    - Mark an object for removal
//!   quit            - Shutdown server

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{info, warn};

use wyrm_server::server::GameServer;
use wyrm_shared::auth::{Authenticator, OpenAuthenticator, PasswordAuthenticator};
use wyrm_shared::config::ServerConfig;
use wyrm_shared::math::Vec2;
use wyrm_shared::object::Planet;

fn parse_args() -> anyhow::Result<ServerConfig> {
    let mut cfg = ServerConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                let raw = std::fs::read_to_string(&args[i + 1])
                    .with_context(|| format!("read config {}", args[i + 1]))?;
                cfg = ServerConfig::from_json_str(&raw).context("parse config")?;
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                cfg.listen_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(64);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

/// Scatters a few planets so a freshly started server has something to
/// replicate before the first player moves.
fn seed_world(server: &mut GameServer) {
    let mut rng = rand::thread_rng();
    for name in ["Mundus", "Jormun", "Veldspar"] {
        let position = Vec2::new(rng.gen_range(-200.0..200.0), rng.gen_range(-200.0..200.0));
        let rot_vel = rng.gen_range(0.05..0.3);
        server
            .objects_mut()
            .insert(Box::new(Planet::new(name.to_string(), position, rot_vel)));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.listen_addr, tick_hz = cfg.tick_hz, "Starting server");

    let auth: Box<dyn Authenticator> = if cfg.accounts.is_empty() {
        warn!("No accounts configured; running open (any well-formed credentials accepted)");
        Box::new(OpenAuthenticator)
    } else {
        Box::new(PasswordAuthenticator::new(cfg.accounts.clone()))
    };

    let mut server = GameServer::bind(cfg.clone(), auth)
        .await
        .context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    seed_world(&mut server);

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_err() {
                break;
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'quit' to exit.");
    println!();

    // Main server loop.
    let tick_interval = Duration::from_secs_f32(1.0 / cfg.tick_hz as f32);
    let mut next_tick = tokio::time::Instant::now();

    while !server.should_quit() {
        server.step(tick_interval.as_secs_f32()).await?;

        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }

    Ok(())
}

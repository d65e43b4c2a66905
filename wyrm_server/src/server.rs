//! Server implementation.
//!
//! `GameServer` is the explicitly constructed context that owns everything:
//! config, session registry, player registry, object world, and the
//! authenticator. Components receive references; there is no global state.
//!
//! Tick order, per `step`:
//! 1. console commands
//! 2. accept pending connections (bounded timeout)
//! 3. drain sessions: handshakes, inbound frames, queued disconnects
//! 4. dispatch inbound frames
//! 5. advance the object world
//! 6. broadcast fresh/dirty/removed object state

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::info;

use wyrm_shared::auth::Authenticator;
use wyrm_shared::config::ServerConfig;
use wyrm_shared::math::Vec2;
use wyrm_shared::object::{ObjectRegistry, Planet};
use wyrm_shared::player::PlayerManager;

use crate::dispatch;
use crate::registry::SessionRegistry;

/// Game server.
pub struct GameServer {
    pub cfg: ServerConfig,
    registry: SessionRegistry,
    players: PlayerManager,
    objects: ObjectRegistry,
    auth: Box<dyn Authenticator>,
    tick: u32,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
    quit: bool,
}

impl GameServer {
    /// Binds the listening socket. A bind failure aborts startup; the server
    /// never runs silently non-listening.
    pub async fn bind(cfg: ServerConfig, auth: Box<dyn Authenticator>) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.listen_addr.parse().context("parse listen_addr")?;
        let registry = SessionRegistry::bind(addr).await?;

        Ok(Self {
            cfg,
            registry,
            players: PlayerManager::default(),
            objects: ObjectRegistry::default(),
            auth,
            tick: 0,
            console_rx: None,
            quit: false,
        })
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.registry.local_addr()
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    pub fn players(&self) -> &PlayerManager {
        &self.players
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.objects
    }

    /// True once the console asked the server to shut down.
    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Executes one simulation tick.
    pub async fn step(&mut self, dt: f32) -> anyhow::Result<()> {
        self.process_console_commands();

        self.registry
            .accept_pending(
                Duration::from_millis(self.cfg.accept_timeout_ms),
                self.cfg.max_sessions,
            )
            .await;

        let inbound = self
            .registry
            .poll(
                self.auth.as_ref(),
                &mut self.players,
                &mut self.objects,
                Duration::from_secs(self.cfg.handshake_timeout_secs),
            )
            .await;

        for frame in inbound {
            dispatch::dispatch_inbound(
                frame.msg,
                frame.player_id,
                &mut self.players,
                &mut self.objects,
            );
        }

        self.objects.update_all(dt);

        let failed = dispatch::replicate(&mut self.objects, self.registry.sessions_mut()).await;
        self.registry
            .apply_disconnects(&failed, &mut self.players, &mut self.objects);

        self.tick += 1;
        Ok(())
    }

    /// Runs the server for a number of ticks at the configured rate.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(1.0 / self.cfg.tick_hz as f32);
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step(dt.as_secs_f32()).await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    fn process_console_commands(&mut self) {
        // Collect lines first to avoid borrow conflict.
        let lines: Vec<String> = if let Some(ref mut rx) = self.console_rx {
            let mut collected = Vec::new();
            while let Ok(line) = rx.try_recv() {
                collected.push(line);
            }
            collected
        } else {
            Vec::new()
        };

        for line in lines {
            for out in self.exec_console(&line) {
                println!("{}", out);
            }
        }
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        match tokens[0] {
            "status" => {
                let mut out = Vec::new();
                out.push(format!("Tick: {}", self.tick));
                out.push(format!("Sessions: {}", self.registry.session_count()));
                out.push(format!("Players: {}", self.players.len()));
                out.push(format!("Objects: {}", self.objects.len()));
                out
            }
            "players" => {
                let mut out = Vec::new();
                for p in self.players.iter() {
                    out.push(format!("  {}: {} ({}) ship={}", p.id, p.name, p.remote, p.ship));
                }
                if out.is_empty() {
                    out.push("No players connected".to_string());
                }
                out
            }
            "spawn" => {
                if tokens.len() < 2 {
                    return vec!["Usage: spawn <name> [rot_vel]".to_string()];
                }
                let rot_vel = tokens
                    .get(2)
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(0.1_f32);
                let id = self.objects.insert(Box::new(Planet::new(
                    tokens[1].to_string(),
                    Vec2::ZERO,
                    rot_vel,
                )));
                vec![format!("Spawned '{}' as object {}", tokens[1], id)]
            }
            "despawn" => {
                let Some(id) = tokens.get(1).and_then(|t| t.parse::<u16>().ok()) else {
                    return vec!["Usage: despawn <id>".to_string()];
                };
                match self.objects.get_mut(id) {
                    Some(obj) => {
                        obj.core_mut().mark_for_deletion();
                        vec![format!("Object {} marked for removal", id)]
                    }
                    None => vec![format!("No object {}", id)],
                }
            }
            "quit" | "exit" => {
                info!("Server shutting down");
                self.quit = true;
                Vec::new()
            }
            other => vec![format!("Unknown command: {}", other)],
        }
    }
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(
    auth: Box<dyn Authenticator>,
) -> anyhow::Result<(GameServer, SocketAddr)> {
    let cfg = ServerConfig {
        listen_addr: format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        ..Default::default()
    };
    let server = GameServer::bind(cfg, auth).await?;
    let addr = server.local_addr()?;
    Ok((server, addr))
}

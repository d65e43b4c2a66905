//! `wyrm_server`
//!
//! Server-side systems:
//! - Session registry and socket multiplexing
//! - One-shot authentication handshake
//! - Inbound message dispatch
//! - Tick-driven replication of the object world
//!
//! Networking model:
//! - TCP only, length-prefixed frames
//! - Single owner, no locks: one task owns the registry, sessions, players,
//!   and objects, and every network wait is bounded so the tick loop never
//!   stalls on a peer

pub mod dispatch;
pub mod handshake;
pub mod registry;
pub mod server;
pub mod session;

pub use server::GameServer;

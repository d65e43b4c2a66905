//! `wyrm_client`
//!
//! Client-side systems:
//! - Connection management and handshake
//! - Input command generation
//! - Replicated object mirror built from broadcast frames
//!
//! Rendering and presentation live elsewhere; this crate is protocol only.

pub mod client;
pub mod input;

pub use client::GameClient;

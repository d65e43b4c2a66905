//! Client implementation.
//!
//! The client maintains:
//! - One framed TCP connection to the server
//! - The handshake state machine (greeting, one-shot authentication)
//! - A mirror of the replicated object world, keyed by object id

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info};

use wyrm_shared::codec::{self, Message};
use wyrm_shared::net::FramedConn;
use wyrm_shared::object::{ObjectSnapshot, PartialState};

use crate::input::{self, InputState};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// The connection is gone (never opened, rejected, or closed).
    Disconnected,
    /// Greeting received, credentials not yet sent or not yet answered.
    AwaitingAuth,
    /// Authenticated; receiving broadcasts.
    Ready,
}

/// High-level game client.
pub struct GameClient {
    pub state: ClientState,
    /// Replicated objects by id, as last announced by the server.
    pub world: BTreeMap<u16, ObjectSnapshot>,
    /// Protocol version the server greeted with.
    pub server_version: (f32, f32),

    conn: FramedConn,
}

impl GameClient {
    /// Connects and consumes the greeting frame.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        info!(server = %addr, "Connecting to server");
        let mut conn = FramedConn::connect(addr).await?;

        let frame = conn
            .recv_frame_timeout(Duration::from_secs(5))
            .await?
            .context("no greeting from server")?;
        let (banner, major, minor) =
            codec::parse_greeting(&frame).context("malformed greeting")?;
        if banner != codec::GREETING {
            anyhow::bail!("unexpected greeting banner: {banner:?}");
        }
        info!(%major, %minor, "Server greeting received");

        Ok(Self {
            state: ClientState::AwaitingAuth,
            world: BTreeMap::new(),
            server_version: (major, minor),
            conn,
        })
    }

    /// Sends credentials and waits for the server's verdict. One attempt per
    /// connection: on rejection the server closes the socket and this client
    /// is `Disconnected`.
    pub async fn authenticate(&mut self, user: &str, pass: &str) -> anyhow::Result<bool> {
        self.conn
            .send_frame(&codec::credentials_frame(user, pass))
            .await?;

        let frame = self
            .conn
            .recv_frame_timeout(Duration::from_secs(5))
            .await?
            .context("no authentication response")?;
        let text = codec::parse_text(&frame).context("malformed authentication response")?;

        if text == codec::AUTH_SUCCESS {
            info!("Authenticated");
            self.state = ClientState::Ready;
            Ok(true)
        } else {
            info!(response = %text, "Authentication rejected");
            self.state = ClientState::Disconnected;
            Ok(false)
        }
    }

    /// Drains pending broadcasts into the world mirror without blocking.
    pub fn poll(&mut self) -> anyhow::Result<()> {
        if self.state != ClientState::Ready {
            return Ok(());
        }

        let drain = self.conn.drain()?;
        for frame in &drain.frames {
            self.apply_frame(frame);
        }
        if drain.closed {
            info!("Server closed the connection");
            self.state = ClientState::Disconnected;
        }
        Ok(())
    }

    /// Sends the current input sample to the server.
    pub async fn send_input(&mut self, state: InputState) -> anyhow::Result<()> {
        self.conn.send_frame(&input::build_input_frame(state)).await
    }

    /// Asks the server to rename this player.
    pub async fn set_name(&mut self, name: &str) -> anyhow::Result<()> {
        self.conn.send_frame(&input::build_name_frame(name)).await
    }

    fn apply_frame(&mut self, frame: &[u8]) {
        let msg = Message::decode(frame);
        if !msg.is_valid() {
            return;
        }
        if msg.kind != codec::MSG_OBJECT {
            debug!(kind = msg.kind, "Ignoring unrecognized broadcast kind");
            return;
        }

        match msg.subtype {
            codec::OBJECT_STATE => {
                if let Some(snap) = ObjectSnapshot::read_full(&msg.payload) {
                    self.world.insert(snap.id, snap);
                }
            }
            codec::OBJECT_UPDATE => {
                if let Some(update) = PartialState::read(&msg.payload) {
                    // Updates for objects we were never told about are
                    // dropped; a full state frame has to come first.
                    if let Some(obj) = self.world.get_mut(&update.id) {
                        obj.apply(&update);
                    }
                }
            }
            codec::OBJECT_REMOVE => {
                if msg.payload.len() >= 2 {
                    let id = u16::from_be_bytes([msg.payload[0], msg.payload[1]]);
                    self.world.remove(&id);
                }
            }
            other => {
                debug!(subtype = other, "Ignoring unrecognized object subtype");
            }
        }
    }
}

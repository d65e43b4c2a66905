//! Connection registry and multiplexer.
//!
//! Owns the listening socket and every live session. Each tick:
//! accept pending connections (bounded timeout, greeting on accept), drain
//! every session without blocking, run handshakes on half-open sessions,
//! and hand authenticated frames up to the dispatcher.
//!
//! Disconnects discovered during the pass go onto a pending-removal list and
//! are applied after the traversal, so removing session K while iterating N
//! sessions still visits the other N-1 exactly once.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{info, warn};

use wyrm_shared::auth::Authenticator;
use wyrm_shared::codec::{self, Message};
use wyrm_shared::net::{FrameListener, FramedConn};
use wyrm_shared::object::ObjectRegistry;
use wyrm_shared::player::PlayerManager;

use crate::handshake::{self, HandshakeOutcome};
use crate::session::Session;

/// One frame received from an authenticated session.
pub struct InboundFrame {
    pub player_id: u16,
    pub msg: Message,
}

pub struct SessionRegistry {
    listener: FrameListener,
    sessions: Vec<Session>,
}

impl SessionRegistry {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = FrameListener::bind(addr).await?;
        Ok(Self {
            listener,
            sessions: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn sessions_mut(&mut self) -> &mut [Session] {
        &mut self.sessions
    }

    /// Accepts every pending connection within the poll timeout. Each new
    /// peer is greeted with the protocol banner and registered half-open.
    /// A failed accept is logged and affects nobody else.
    pub async fn accept_pending(&mut self, timeout: Duration, max_sessions: usize) {
        loop {
            match tokio::time::timeout(timeout, self.listener.accept()).await {
                Ok(Ok((conn, peer))) => self.admit(conn, peer, max_sessions).await,
                Ok(Err(e)) => {
                    warn!(error = %e, "Accept error");
                    break;
                }
                // Timeout: nothing else pending this tick.
                Err(_) => break,
            }
        }
    }

    async fn admit(&mut self, mut conn: FramedConn, peer: SocketAddr, max_sessions: usize) {
        if self.sessions.len() >= max_sessions {
            warn!(%peer, max_sessions, "Session limit reached, rejecting connection");
            let _ = conn.send_frame(&codec::text_frame("Server full")).await;
            return;
        }

        if let Err(e) = conn.send_frame(&codec::greeting_frame()).await {
            warn!(%peer, error = %e, "Failed sending greeting");
            return;
        }

        info!(%peer, "Client connected");
        self.sessions.push(Session::new(conn, peer));
    }

    /// One multiplexer pass over every session: drain, handshake or collect
    /// frames, then apply queued disconnects.
    pub async fn poll(
        &mut self,
        auth: &dyn Authenticator,
        players: &mut PlayerManager,
        objects: &mut ObjectRegistry,
        handshake_timeout: Duration,
    ) -> Vec<InboundFrame> {
        let mut inbound = Vec::new();
        let mut defunct = Vec::new();

        for (idx, session) in self.sessions.iter_mut().enumerate() {
            let drain = match session.conn.drain() {
                Ok(drain) => drain,
                Err(e) => {
                    warn!(peer = %session.peer, error = %e, "Receive error");
                    defunct.push(idx);
                    continue;
                }
            };

            let mut frames = drain.frames.into_iter();

            if !session.is_authenticated() {
                if let Some(credentials) = frames.next() {
                    match handshake::attempt(session, &credentials, auth, players, objects).await {
                        HandshakeOutcome::Authenticated(_) => {}
                        HandshakeOutcome::Rejected => {
                            // One attempt per connection: whatever else the
                            // peer already sent is discarded with it.
                            defunct.push(idx);
                            continue;
                        }
                    }
                } else if session.opened_at.elapsed() >= handshake_timeout {
                    info!(peer = %session.peer, "Handshake idle timeout, evicting");
                    let _ = session
                        .conn
                        .send_frame(&codec::text_frame("Authentication timed out"))
                        .await;
                    defunct.push(idx);
                    continue;
                }
            }

            if session.is_authenticated() {
                for frame in frames {
                    inbound.push(InboundFrame {
                        player_id: session.player_id,
                        msg: Message::decode(&frame),
                    });
                }
            }

            if drain.closed {
                info!(peer = %session.peer, "Client disconnected");
                defunct.push(idx);
            }
        }

        self.apply_disconnects(&defunct, players, objects);
        inbound
    }

    /// Removes sessions by index, releasing their players. Removal walks
    /// the indices highest-first so swap-removal never disturbs an index
    /// still to be processed.
    pub fn apply_disconnects(
        &mut self,
        indices: &[usize],
        players: &mut PlayerManager,
        objects: &mut ObjectRegistry,
    ) {
        let mut indices = indices.to_vec();
        indices.sort_unstable();
        indices.dedup();
        for &idx in indices.iter().rev() {
            let session = self.sessions.swap_remove(idx);
            players.remove_player(session.player_id, objects);
        }
    }
}

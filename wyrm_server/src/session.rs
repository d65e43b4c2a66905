//! Per-connection session state.
//!
//! A session exclusively owns its socket. The registry owns the session;
//! dispatch and replication only ever see a reference plus the bound player
//! id. Dropping the session closes the socket.

use std::net::SocketAddr;
use std::time::Instant;

use wyrm_shared::net::FramedConn;
use wyrm_shared::player::UNASSIGNED_ID;

/// Authentication lifecycle. Accepting is transient and a closed session
/// leaves the registry immediately, so only the live states are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Greeting sent, awaiting the one credential frame.
    HalfOpen,
    /// Bound to a player; eligible for dispatch and broadcast.
    Authenticated,
}

pub struct Session {
    pub conn: FramedConn,
    pub peer: SocketAddr,
    /// `UNASSIGNED_ID` until authentication binds a player.
    pub player_id: u16,
    pub state: SessionState,
    /// When the connection was accepted; bounds the handshake idle window.
    pub opened_at: Instant,
}

impl Session {
    pub fn new(conn: FramedConn, peer: SocketAddr) -> Self {
        Self {
            conn,
            peer,
            player_id: UNASSIGNED_ID,
            state: SessionState::HalfOpen,
            opened_at: Instant::now(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Binds a player id and promotes the session.
    pub fn authenticate(&mut self, player_id: u16) {
        self.player_id = player_id;
        self.state = SessionState::Authenticated;
    }
}

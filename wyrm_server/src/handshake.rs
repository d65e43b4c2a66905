//! Authentication handshake.
//!
//! One credential frame per connection: the raw bytes go to the
//! authenticator, and the session is either promoted and bound to a new
//! player or rejected and torn down. No retry. Bytes beyond the credential
//! payload inside that frame belong to the predicate alone and are never
//! reinterpreted as a later message.

use bytes::BytesMut;
use tracing::{info, warn};

use wyrm_shared::auth::Authenticator;
use wyrm_shared::codec::{self, Message};
use wyrm_shared::object::ObjectRegistry;
use wyrm_shared::player::PlayerManager;

use crate::session::Session;

pub enum HandshakeOutcome {
    /// Session promoted and bound to this player id.
    Authenticated(u16),
    /// Failure frame sent; the caller removes the session.
    Rejected,
}

/// Runs the one-shot handshake over a half-open session's first frame.
///
/// On success the new session also receives a full-state snapshot of every
/// live object, so late joiners see the world that predates them.
pub async fn attempt(
    session: &mut Session,
    frame: &[u8],
    auth: &dyn Authenticator,
    players: &mut PlayerManager,
    objects: &mut ObjectRegistry,
) -> HandshakeOutcome {
    if auth.check(frame) {
        let player_id = players.create_player(session.peer.to_string(), objects);

        if let Err(e) = session
            .conn
            .send_frame(&codec::text_frame(codec::AUTH_SUCCESS))
            .await
        {
            warn!(peer = %session.peer, error = %e, "Failed sending auth ack");
        }
        session.authenticate(player_id);
        info!(peer = %session.peer, player = player_id, "Authentication successful");

        send_world_snapshot(session, objects).await;
        HandshakeOutcome::Authenticated(player_id)
    } else {
        if let Err(e) = session
            .conn
            .send_frame(&codec::text_frame(codec::AUTH_FAILED))
            .await
        {
            warn!(peer = %session.peer, error = %e, "Failed sending auth rejection");
        }
        info!(peer = %session.peer, "Authentication failed");
        HandshakeOutcome::Rejected
    }
}

/// Sends one `OBJECT_STATE` frame per live object to a newly authenticated
/// session. Flags are untouched: the regular broadcast still owns the
/// fresh/dirty protocol.
async fn send_world_snapshot(session: &mut Session, objects: &ObjectRegistry) {
    for obj in objects.iter() {
        let mut payload = BytesMut::new();
        obj.core().write_full(&mut payload);
        let frame = Message::new(codec::MSG_OBJECT, codec::OBJECT_STATE, payload.freeze()).encode();
        if let Err(e) = session.conn.send_frame(&frame).await {
            // Transport error: the next drain will notice the dead socket.
            warn!(peer = %session.peer, error = %e, "Failed sending world snapshot");
            break;
        }
    }
}

//! Replication dispatcher.
//!
//! Two responsibilities over the authenticated session set:
//! - route inbound frames to the player registry by message kind;
//! - broadcast object state once per tick, after all inbound frames.
//!
//! Broadcast order per object: fresh objects get one full `OBJECT_STATE`
//! frame before anything else, dirty objects a partial `OBJECT_UPDATE`, and
//! marked objects a final `OBJECT_REMOVE` after the state pass. Because the
//! state pass runs first within the same tick, a removal is never sent for
//! an object whose creation was never announced.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use wyrm_shared::codec::{self, Message};
use wyrm_shared::object::ObjectRegistry;
use wyrm_shared::player::PlayerManager;

use crate::session::Session;

/// Routes one frame received from an authenticated session.
///
/// Kind 0 is the reserved player-control range and is forwarded with the
/// session's bound player id. Every other kind is reserved for future
/// extension: unknown kinds are dropped, never rejected, so newer clients
/// keep working against this server.
pub fn dispatch_inbound(
    msg: Message,
    player_id: u16,
    players: &mut PlayerManager,
    objects: &mut ObjectRegistry,
) {
    if !msg.is_valid() {
        // Under-length frame already degraded to the sentinel; absorb it.
        return;
    }

    if msg.kind == codec::MSG_PLAYER {
        players.dispatch_packet(&msg, player_id, objects);
    } else {
        debug!(
            kind = msg.kind,
            subtype = msg.subtype,
            player = player_id,
            "Ignoring unrecognized message kind"
        );
    }
}

/// Broadcasts object state to every authenticated session and drops objects
/// whose removal has now been announced. Returns the indices of sessions
/// whose transport failed, for removal after the pass.
pub async fn replicate(objects: &mut ObjectRegistry, sessions: &mut [Session]) -> Vec<usize> {
    let mut defunct = Vec::new();

    // State pass: full frame for fresh objects, partial for dirty ones.
    // A full frame subsumes the pending delta, so it clears both flags.
    for obj in objects.iter_mut() {
        let core = obj.core_mut();
        if core.is_fresh() {
            let mut payload = BytesMut::new();
            core.write_full(&mut payload);
            let frame =
                Message::new(codec::MSG_OBJECT, codec::OBJECT_STATE, payload.freeze()).encode();
            broadcast(sessions, &frame, &mut defunct).await;
            core.clear_fresh();
            core.clear_dirty();
        } else if core.is_dirty() {
            let mut payload = BytesMut::new();
            core.write_partial(&mut payload);
            let frame =
                Message::new(codec::MSG_OBJECT, codec::OBJECT_UPDATE, payload.freeze()).encode();
            broadcast(sessions, &frame, &mut defunct).await;
            core.clear_dirty();
        }
    }

    // Removal pass: one final notification, then the object is gone.
    for id in objects.marked_ids() {
        let mut payload = BytesMut::with_capacity(2);
        payload.put_u16(id);
        let frame = Message::new(codec::MSG_OBJECT, codec::OBJECT_REMOVE, payload.freeze()).encode();
        broadcast(sessions, &frame, &mut defunct).await;
        objects.remove(id);
        debug!(object = id, "Object removed");
    }

    defunct
}

/// Sends one frame to every authenticated session. A send failure is a
/// transport error: the session is queued for disconnect and the broadcast
/// carries on to the rest.
async fn broadcast(sessions: &mut [Session], frame: &Bytes, defunct: &mut Vec<usize>) {
    for (idx, session) in sessions.iter_mut().enumerate() {
        if !session.is_authenticated() || defunct.contains(&idx) {
            continue;
        }
        if let Err(e) = session.conn.send_frame(frame).await {
            warn!(peer = %session.peer, error = %e, "Send error");
            defunct.push(idx);
        }
    }
}

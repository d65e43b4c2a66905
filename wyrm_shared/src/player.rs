//! Player registry.
//!
//! Players are the authenticated identities behind sessions. The registry
//! binds by numeric id only; sockets stay exclusively owned by the session
//! layer. Creating a player spawns its ship, removing one marks the ship
//! for deletion so the next broadcast announces the removal.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::codec::{self, Message};
use crate::math::Vec2;
use crate::object::{ObjectRegistry, Ship};

/// Sentinel for "no player bound". Matches the wire sentinel so it can never
/// collide with a real id.
pub const UNASSIGNED_ID: u16 = codec::SENTINEL;

/// One authenticated player identity.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: u16,
    pub name: String,
    pub remote: String,
    /// Object id of the player's ship.
    pub ship: u16,
}

/// Owns every player; maps player ids to their controlled objects.
#[derive(Default)]
pub struct PlayerManager {
    players: BTreeMap<u16, Player>,
    next_id: u16,
}

impl PlayerManager {
    /// Creates a player for an authenticated connection and spawns its ship.
    pub fn create_player(&mut self, remote: String, objects: &mut ObjectRegistry) -> u16 {
        let id = self.next_id;
        assert!(id != UNASSIGNED_ID, "player id space exhausted");
        self.next_id += 1;

        let name = format!("Pilot {}", id);
        let ship = objects.insert(Box::new(Ship::new(name.clone(), Vec2::ZERO)));
        info!(player = id, ship, remote = %remote, "Player created");

        self.players.insert(
            id,
            Player {
                id,
                name,
                remote,
                ship,
            },
        );
        id
    }

    /// Removes a player and marks its ship for deletion. A no-op for
    /// `UNASSIGNED_ID`, so tearing down a half-open session needs no special
    /// casing.
    pub fn remove_player(&mut self, id: u16, objects: &mut ObjectRegistry) {
        if id == UNASSIGNED_ID {
            return;
        }
        match self.players.remove(&id) {
            Some(player) => {
                if let Some(ship) = objects.get_mut(player.ship) {
                    ship.core_mut().mark_for_deletion();
                }
                info!(player = id, "Player removed");
            }
            None => warn!(player = id, "Removal of unknown player"),
        }
    }

    /// Interprets one player-control message from the bound player, routing
    /// it to the player's ship. Unknown subtypes are the ship's problem and
    /// are ignored there.
    pub fn dispatch_packet(&mut self, msg: &Message, player_id: u16, objects: &mut ObjectRegistry) {
        let Some(player) = self.players.get_mut(&player_id) else {
            warn!(player = player_id, "Packet from unknown player");
            return;
        };

        if msg.subtype == codec::PLAYER_SET_NAME {
            let mut buf = &msg.payload[..];
            if let Some(name) = codec::get_string(&mut buf) {
                debug!(player = player_id, name = %name, "Player renamed");
                player.name = name;
            }
        }

        if let Some(ship) = objects.get_mut(player.ship) {
            ship.handle_packet(msg);
        }
    }

    pub fn get(&self, id: u16) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }
}

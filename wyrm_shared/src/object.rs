//! Replicated game objects.
//!
//! Every object carries the same replicated core (position, velocity,
//! rotation, dirty/fresh/deletion flags); behavior differences live behind
//! the [`GameObject`] trait, resolved once per message instead of through an
//! inheritance chain. The registry iterates in stable id order so broadcast
//! output is deterministic.
//!
//! Flag protocol:
//! - `dirty` is set whenever state changes and cleared only after a
//!   successful broadcast.
//! - `fresh` is set on creation and cleared after the object's first
//!   full-state broadcast, so new objects get exactly one full packet before
//!   switching to partial updates.
//! - a marked object is dropped only after one final removal notification.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, BytesMut};
use tracing::debug;

use crate::codec::{self, Message};
use crate::math::Vec2;

/// Object kinds carried in full-state packets.
pub const KIND_SHIP: u16 = 0;
pub const KIND_PLANET: u16 = 1;

/// Acceleration applied per unit of thrust input.
const SHIP_THRUST_ACCEL: f32 = 40.0;
/// Angular velocity (rad/s) at full steer input.
const SHIP_TURN_RATE: f32 = 2.0;

/// Replicated state shared by every object kind.
#[derive(Debug, Clone)]
pub struct ObjectCore {
    pub id: u16,
    pub kind: u16,
    pub name: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    pub rotational_velocity: f32,
    dirty: bool,
    fresh: bool,
    marked_for_deletion: bool,
}

impl ObjectCore {
    pub fn new(kind: u16, name: String, position: Vec2) -> Self {
        Self {
            id: 0,
            kind,
            name,
            position,
            velocity: Vec2::ZERO,
            rotation: 0.0,
            rotational_velocity: 0.0,
            dirty: false,
            fresh: true,
            marked_for_deletion: false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn clear_fresh(&mut self) {
        self.fresh = false;
    }

    pub fn mark_for_deletion(&mut self) {
        self.marked_for_deletion = true;
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.marked_for_deletion
    }

    /// Advances position and rotation by the current velocities, marking the
    /// object dirty when anything actually moved.
    pub fn integrate(&mut self, dt: f32) {
        if self.velocity.len_sq() == 0.0 && self.rotational_velocity == 0.0 {
            return;
        }
        self.position = Vec2::new(
            self.position.x + self.velocity.x * dt,
            self.position.y + self.velocity.y * dt,
        );
        self.rotation += self.rotational_velocity * dt;
        self.dirty = true;
    }

    /// Serializes the full state: everything a client needs to materialize
    /// the object.
    pub fn write_full(&self, buf: &mut BytesMut) {
        buf.put_u16(self.id);
        buf.put_u16(self.kind);
        codec::put_string(buf, &self.name);
        self.write_motion(buf);
    }

    /// Serializes the partial update: motion only, for objects the client
    /// already knows.
    pub fn write_partial(&self, buf: &mut BytesMut) {
        buf.put_u16(self.id);
        self.write_motion(buf);
    }

    fn write_motion(&self, buf: &mut BytesMut) {
        buf.put_f32(self.position.x);
        buf.put_f32(self.position.y);
        buf.put_f32(self.velocity.x);
        buf.put_f32(self.velocity.y);
        buf.put_f32(self.rotation);
        buf.put_f32(self.rotational_velocity);
    }
}

/// Behavior seam for object kinds: per-tick update plus interpretation of
/// player-control messages routed to the object.
pub trait GameObject: Send + Sync {
    fn core(&self) -> &ObjectCore;
    fn core_mut(&mut self) -> &mut ObjectCore;
    fn update(&mut self, dt: f32);
    fn handle_packet(&mut self, msg: &Message);
}

/// Player-controlled ship. Thrust accelerates along the current heading,
/// steer sets rotational velocity.
pub struct Ship {
    core: ObjectCore,
    thrust: f32,
    steer: f32,
}

impl Ship {
    pub fn new(name: String, position: Vec2) -> Self {
        Self {
            core: ObjectCore::new(KIND_SHIP, name, position),
            thrust: 0.0,
            steer: 0.0,
        }
    }
}

impl GameObject for Ship {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ObjectCore {
        &mut self.core
    }

    fn update(&mut self, dt: f32) {
        if self.thrust != 0.0 {
            let (sin, cos) = self.core.rotation.sin_cos();
            self.core.velocity = Vec2::new(
                self.core.velocity.x + cos * self.thrust * SHIP_THRUST_ACCEL * dt,
                self.core.velocity.y + sin * self.thrust * SHIP_THRUST_ACCEL * dt,
            );
            self.core.set_dirty();
        }
        self.core.rotational_velocity = self.steer * SHIP_TURN_RATE;
        self.core.integrate(dt);
    }

    fn handle_packet(&mut self, msg: &Message) {
        match msg.subtype {
            codec::PLAYER_INPUT => {
                let mut buf = &msg.payload[..];
                if buf.remaining() < 8 {
                    debug!(object = self.core.id, "Truncated input payload");
                    return;
                }
                self.thrust = buf.get_f32().clamp(-1.0, 1.0);
                self.steer = buf.get_f32().clamp(-1.0, 1.0);
            }
            codec::PLAYER_SET_NAME => {
                let mut buf = &msg.payload[..];
                if let Some(name) = codec::get_string(&mut buf) {
                    self.core.name = name;
                    self.core.set_dirty();
                }
            }
            other => {
                debug!(object = self.core.id, subtype = other, "Ignoring control subtype");
            }
        }
    }
}

/// Decorative body with a constant spin. Ignores player control.
pub struct Planet {
    core: ObjectCore,
}

impl Planet {
    pub fn new(name: String, position: Vec2, rotational_velocity: f32) -> Self {
        let mut core = ObjectCore::new(KIND_PLANET, name, position);
        core.rotational_velocity = rotational_velocity;
        Self { core }
    }
}

impl GameObject for Planet {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ObjectCore {
        &mut self.core
    }

    fn update(&mut self, dt: f32) {
        self.core.integrate(dt);
    }

    fn handle_packet(&mut self, _msg: &Message) {}
}

/// Owns every live object; assigns ids and iterates in stable id order.
#[derive(Default)]
pub struct ObjectRegistry {
    objects: BTreeMap<u16, Box<dyn GameObject>>,
    next_id: u16,
}

impl ObjectRegistry {
    /// Registers an object, assigning its id. Ids are never reused; 0xFFFF
    /// is the wire sentinel, so exhausting the id space is a fatal invariant
    /// violation rather than a wrap-around.
    pub fn insert(&mut self, mut obj: Box<dyn GameObject>) -> u16 {
        let id = self.next_id;
        assert!(id != codec::SENTINEL, "object id space exhausted");
        self.next_id += 1;
        obj.core_mut().id = id;
        self.objects.insert(id, obj);
        id
    }

    pub fn get(&self, id: u16) -> Option<&dyn GameObject> {
        self.objects.get(&id).map(|b| b.as_ref())
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut Box<dyn GameObject>> {
        self.objects.get_mut(&id)
    }

    pub fn remove(&mut self, id: u16) -> Option<Box<dyn GameObject>> {
        self.objects.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Box<dyn GameObject>> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn GameObject>> {
        self.objects.values_mut()
    }

    /// Ids of objects flagged for deletion, in id order.
    pub fn marked_ids(&self) -> Vec<u16> {
        self.objects
            .iter()
            .filter(|(_, obj)| obj.core().is_marked_for_deletion())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn update_all(&mut self, dt: f32) {
        for obj in self.objects.values_mut() {
            obj.update(dt);
        }
    }
}

/// Client-side materialization of a full-state packet.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSnapshot {
    pub id: u16,
    pub kind: u16,
    pub name: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    pub rotational_velocity: f32,
}

/// Client-side materialization of a partial update.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialState {
    pub id: u16,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    pub rotational_velocity: f32,
}

impl ObjectSnapshot {
    pub fn read_full(payload: &[u8]) -> Option<Self> {
        let mut buf = payload;
        if buf.remaining() < 4 {
            return None;
        }
        let id = buf.get_u16();
        let kind = buf.get_u16();
        let name = codec::get_string(&mut buf)?;
        let (position, velocity, rotation, rotational_velocity) = read_motion(&mut buf)?;
        Some(Self {
            id,
            kind,
            name,
            position,
            velocity,
            rotation,
            rotational_velocity,
        })
    }

    pub fn apply(&mut self, update: &PartialState) {
        self.position = update.position;
        self.velocity = update.velocity;
        self.rotation = update.rotation;
        self.rotational_velocity = update.rotational_velocity;
    }
}

impl PartialState {
    pub fn read(payload: &[u8]) -> Option<Self> {
        let mut buf = payload;
        if buf.remaining() < 2 {
            return None;
        }
        let id = buf.get_u16();
        let (position, velocity, rotation, rotational_velocity) = read_motion(&mut buf)?;
        Some(Self {
            id,
            position,
            velocity,
            rotation,
            rotational_velocity,
        })
    }
}

fn read_motion(buf: &mut &[u8]) -> Option<(Vec2, Vec2, f32, f32)> {
    if buf.remaining() < 24 {
        return None;
    }
    let position = Vec2::new(buf.get_f32(), buf.get_f32());
    let velocity = Vec2::new(buf.get_f32(), buf.get_f32());
    let rotation = buf.get_f32();
    let rotational_velocity = buf.get_f32();
    Some((position, velocity, rotation, rotational_velocity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn registry_assigns_sequential_ids_in_stable_order() {
        let mut reg = ObjectRegistry::default();
        let a = reg.insert(Box::new(Planet::new("A".into(), Vec2::ZERO, 0.1)));
        let b = reg.insert(Box::new(Planet::new("B".into(), Vec2::ZERO, 0.1)));
        assert_eq!((a, b), (0, 1));

        let ids: Vec<u16> = reg.iter().map(|o| o.core().id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn new_objects_are_fresh_until_cleared() {
        let mut reg = ObjectRegistry::default();
        let id = reg.insert(Box::new(Ship::new("Fang".into(), Vec2::ZERO)));
        let obj = reg.get_mut(id).unwrap();
        assert!(obj.core().is_fresh());
        obj.core_mut().clear_fresh();
        assert!(!obj.core().is_fresh());
    }

    #[test]
    fn integration_marks_moving_objects_dirty() {
        let mut planet = Planet::new("Mundus".into(), Vec2::ZERO, 0.5);
        planet.update(0.1);
        assert!(planet.core().is_dirty());

        let mut still = Planet::new("Rock".into(), Vec2::ZERO, 0.0);
        still.update(0.1);
        assert!(!still.core().is_dirty());
    }

    #[test]
    fn ship_applies_input_packets() {
        let mut ship = Ship::new("Fang".into(), Vec2::ZERO);
        let mut payload = BytesMut::new();
        payload.put_f32(1.0);
        payload.put_f32(-0.5);
        ship.handle_packet(&Message::new(
            codec::MSG_PLAYER,
            codec::PLAYER_INPUT,
            payload.freeze(),
        ));

        ship.update(0.1);
        assert!(ship.core().velocity.len_sq() > 0.0);
        assert!(ship.core().rotational_velocity < 0.0);
        assert!(ship.core().is_dirty());
    }

    #[test]
    fn ship_ignores_truncated_input() {
        let mut ship = Ship::new("Fang".into(), Vec2::ZERO);
        ship.handle_packet(&Message::new(
            codec::MSG_PLAYER,
            codec::PLAYER_INPUT,
            Bytes::from_static(&[0, 0]),
        ));
        ship.update(0.1);
        assert_eq!(ship.core().velocity, Vec2::ZERO);
    }

    #[test]
    fn full_state_roundtrips_through_snapshot() {
        let mut ship = Ship::new("Fang".into(), Vec2::new(3.0, -4.0));
        ship.core_mut().id = 7;
        ship.core_mut().velocity = Vec2::new(1.0, 2.0);
        ship.core_mut().rotation = 0.25;

        let mut buf = BytesMut::new();
        ship.core().write_full(&mut buf);
        let snap = ObjectSnapshot::read_full(&buf).unwrap();

        assert_eq!(snap.id, 7);
        assert_eq!(snap.kind, KIND_SHIP);
        assert_eq!(snap.name, "Fang");
        assert_eq!(snap.position, Vec2::new(3.0, -4.0));
        assert_eq!(snap.velocity, Vec2::new(1.0, 2.0));
        assert_eq!(snap.rotation, 0.25);
    }

    #[test]
    fn partial_update_applies_onto_snapshot() {
        let mut planet = Planet::new("Mundus".into(), Vec2::ZERO, 0.5);
        planet.core_mut().id = 3;

        let mut buf = BytesMut::new();
        planet.core().write_full(&mut buf);
        let mut snap = ObjectSnapshot::read_full(&buf).unwrap();

        planet.update(1.0);
        let mut buf = BytesMut::new();
        planet.core().write_partial(&mut buf);
        let update = PartialState::read(&buf).unwrap();

        assert_eq!(update.id, 3);
        snap.apply(&update);
        assert_eq!(snap.rotation, planet.core().rotation);
        assert_eq!(snap.name, "Mundus");
    }

    #[test]
    fn truncated_payloads_read_as_none() {
        let mut buf = BytesMut::new();
        Planet::new("Mundus".into(), Vec2::ZERO, 0.5)
            .core()
            .write_full(&mut buf);
        assert!(ObjectSnapshot::read_full(&buf[..buf.len() - 1]).is_none());
        assert!(PartialState::read(&[1]).is_none());
    }
}

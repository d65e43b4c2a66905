//! Input handling.
//!
//! In a full client this would integrate with windowing and key bindings.
//! Here it only turns sampled input into player-control frames.

use bytes::{BufMut, Bytes, BytesMut};

use wyrm_shared::codec::{self, Message};

/// User input state at a moment in time. Both axes are normalized to
/// `[-1, 1]`; the server clamps anyway.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    pub thrust: f32,
    pub steer: f32,
}

/// Builds a `PLAYER_INPUT` frame body from sampled input.
pub fn build_input_frame(state: InputState) -> Bytes {
    let mut payload = BytesMut::with_capacity(8);
    payload.put_f32(state.thrust);
    payload.put_f32(state.steer);
    Message::new(codec::MSG_PLAYER, codec::PLAYER_INPUT, payload.freeze()).encode()
}

/// Builds a `PLAYER_SET_NAME` frame body.
pub fn build_name_frame(name: &str) -> Bytes {
    let mut payload = BytesMut::new();
    codec::put_string(&mut payload, name);
    Message::new(codec::MSG_PLAYER, codec::PLAYER_SET_NAME, payload.freeze()).encode()
}

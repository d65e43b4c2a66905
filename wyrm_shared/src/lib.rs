//! `wyrm_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - Fixed wire format: big-endian, length-prefixed frames.
//! - Single-owner state; the session/replication core needs no locks.
//! - Traits at the collaborator seams (authentication, object behavior).
//! - No `unsafe`.

pub mod auth;
pub mod codec;
pub mod config;
pub mod math;
pub mod net;
pub mod object;
pub mod player;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::auth::*;
    pub use crate::codec::*;
    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::object::*;
    pub use crate::player::*;
}

//! Wire protocol codec.
//!
//! Every frame body is either a typed message (`kind:u16 | subtype:u16 |
//! payload`) or, during the handshake, a text frame (length-prefixed UTF-8
//! string). All integers are big-endian; the format is fixed for
//! interoperability. Transport framing (the outer length prefix) lives in
//! [`crate::net`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

/// Reserved "no message" value for both kind and subtype. Never sent over
/// the wire as a real message.
pub const SENTINEL: u16 = 0xFFFF;

/// Message kinds. `MSG_PLAYER` opens the reserved player-control range;
/// unrecognized kinds are ignored, not rejected.
pub const MSG_PLAYER: u16 = 0;
pub const MSG_OBJECT: u16 = 1;

/// Player-control subtypes (client → server).
pub const PLAYER_INPUT: u16 = 0;
pub const PLAYER_SET_NAME: u16 = 1;

/// Object broadcast subtypes (server → client).
pub const OBJECT_UPDATE: u16 = 0;
pub const OBJECT_STATE: u16 = 1;
pub const OBJECT_REMOVE: u16 = 2;

/// Protocol version advertised in the greeting.
pub const PROTOCOL_VERSION_MAJOR: f32 = 2.0;
pub const PROTOCOL_VERSION_MINOR: f32 = 0.0;

/// Handshake string literals.
pub const GREETING: &str = "Wyrm protocol version ";
pub const AUTH_SUCCESS: &str = "Authentication successful";
pub const AUTH_FAILED: &str = "Authentication failed";

/// One discrete protocol unit. Messages are values: the payload is an owned
/// buffer sized to the frame remainder, never a view into the socket buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: u16,
    pub subtype: u16,
    pub payload: Bytes,
}

impl Message {
    pub fn new(kind: u16, subtype: u16, payload: Bytes) -> Self {
        Self {
            kind,
            subtype,
            payload,
        }
    }

    /// The sentinel "nothing useful received" message.
    pub fn invalid() -> Self {
        Self {
            kind: SENTINEL,
            subtype: SENTINEL,
            payload: Bytes::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind != SENTINEL && self.subtype != SENTINEL
    }

    /// Encodes the message into a frame body.
    ///
    /// An unset kind or subtype signals a programming error upstream: the
    /// codec refuses to append the payload and emits an empty frame instead
    /// of letting a malformed message reach the wire.
    pub fn encode(&self) -> Bytes {
        if !self.is_valid() {
            warn!(
                kind = self.kind,
                subtype = self.subtype,
                "Refusing to encode message with sentinel kind/subtype"
            );
            return Bytes::new();
        }

        let mut buf = BytesMut::with_capacity(4 + self.payload.len());
        buf.put_u16(self.kind);
        buf.put_u16(self.subtype);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Decodes a frame body. A frame shorter than the 4-byte header is not a
    /// protocol violation: it decodes to the sentinel invalid message so the
    /// caller can treat it as "nothing useful received".
    pub fn decode(frame: &[u8]) -> Self {
        if frame.len() < 4 {
            return Self::invalid();
        }

        let kind = u16::from_be_bytes([frame[0], frame[1]]);
        let subtype = u16::from_be_bytes([frame[2], frame[3]]);
        Self {
            kind,
            subtype,
            payload: Bytes::copy_from_slice(&frame[4..]),
        }
    }
}

/// Appends a length-prefixed UTF-8 string.
pub fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

/// Reads a length-prefixed UTF-8 string, or `None` if the buffer is short
/// or the bytes are not valid UTF-8.
pub fn get_string<B: Buf>(buf: &mut B) -> Option<String> {
    if buf.remaining() < 4 {
        return None;
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return None;
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).ok()
}

/// Builds the server greeting: the protocol banner string followed by the
/// major and minor version numbers.
pub fn greeting_frame() -> Bytes {
    let mut buf = BytesMut::new();
    put_string(&mut buf, GREETING);
    buf.put_f32(PROTOCOL_VERSION_MAJOR);
    buf.put_f32(PROTOCOL_VERSION_MINOR);
    buf.freeze()
}

/// Parses a greeting frame into `(banner, major, minor)`.
pub fn parse_greeting(frame: &[u8]) -> Option<(String, f32, f32)> {
    let mut buf = frame;
    let banner = get_string(&mut buf)?;
    if buf.remaining() < 8 {
        return None;
    }
    let major = buf.get_f32();
    let minor = buf.get_f32();
    Some((banner, major, minor))
}

/// Builds a plain text frame (auth acknowledgements, disconnect reasons).
pub fn text_frame(text: &str) -> Bytes {
    let mut buf = BytesMut::new();
    put_string(&mut buf, text);
    buf.freeze()
}

/// Parses a text frame. Trailing bytes are ignored.
pub fn parse_text(frame: &[u8]) -> Option<String> {
    let mut buf = frame;
    get_string(&mut buf)
}

/// Builds the credential frame the client sends as its first message after
/// the greeting: two length-prefixed strings.
pub fn credentials_frame(user: &str, pass: &str) -> Bytes {
    let mut buf = BytesMut::new();
    put_string(&mut buf, user);
    put_string(&mut buf, pass);
    buf.freeze()
}

/// Parses a credential frame into `(user, pass)`.
pub fn parse_credentials(raw: &[u8]) -> Option<(String, String)> {
    let mut buf = raw;
    let user = get_string(&mut buf)?;
    let pass = get_string(&mut buf)?;
    Some((user, pass))
}

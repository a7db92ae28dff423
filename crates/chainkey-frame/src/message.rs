use bytes::{BufMut, BytesMut};

use crate::codec::Frame;
use crate::error::{FrameError, Result};

/// Wire type for [`Message::Announce`].
pub const TYPE_ANNOUNCE: u8 = 0x01;
/// Wire type for [`Message::Note`].
pub const TYPE_NOTE: u8 = 0x02;
/// Wire type for [`Message::Ping`].
pub const TYPE_PING: u8 = 0x03;
/// Wire type for [`Message::PingReply`].
pub const TYPE_PING_REPLY: u8 = 0x04;
/// Wire type for [`Message::RemapRequest`].
pub const TYPE_REMAP_REQUEST: u8 = 0x05;

/// A board's 32-bit identity, chosen pseudo-randomly once at boot.
///
/// Never persisted. Two boards independently drawing the same identity is an
/// accepted low-probability risk; the protocol does not detect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Draw a fresh identity from the process's hasher entropy.
    pub fn random() -> Self {
        use std::collections::hash_map::RandomState;
        use std::hash::{BuildHasher, Hasher};

        let mut hasher = RandomState::new().build_hasher();
        let boot = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::from(d.subsec_nanos()) ^ d.as_secs())
            .unwrap_or(0);
        hasher.write_u64(boot);
        Self(hasher.finish() as u32)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Typed protocol messages, one per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// "My identity is X at chain position Y."
    Announce { identity: NodeId, position: u8 },
    /// A note event originating on some board.
    Note {
        identity: NodeId,
        note: u8,
        velocity: u8,
        on: bool,
    },
    /// Root liveness probe, broadcast to the whole chain.
    Ping { sequence: u8 },
    /// Liveness response from a non-root board.
    PingReply { identity: NodeId, sequence: u8 },
    /// Ask every board to re-run topology discovery.
    RemapRequest,
}

impl Message {
    /// The wire type byte for this message.
    pub fn msg_type(&self) -> u8 {
        match self {
            Message::Announce { .. } => TYPE_ANNOUNCE,
            Message::Note { .. } => TYPE_NOTE,
            Message::Ping { .. } => TYPE_PING,
            Message::PingReply { .. } => TYPE_PING_REPLY,
            Message::RemapRequest => TYPE_REMAP_REQUEST,
        }
    }

    /// Append this message's payload bytes.
    ///
    /// Multi-byte fields are transmitted least-significant byte first.
    pub fn encode_payload(&self, dst: &mut BytesMut) {
        match self {
            Message::Announce { identity, position } => {
                dst.put_u32_le(identity.0);
                dst.put_u8(*position);
            }
            Message::Note {
                identity,
                note,
                velocity,
                on,
            } => {
                dst.put_u32_le(identity.0);
                dst.put_u8(*note);
                dst.put_u8(*velocity);
                dst.put_u8(u8::from(*on));
            }
            Message::Ping { sequence } => dst.put_u8(*sequence),
            Message::PingReply { identity, sequence } => {
                dst.put_u32_le(identity.0);
                dst.put_u8(*sequence);
            }
            Message::RemapRequest => {}
        }
    }

    /// Decode a parsed frame into a typed message.
    pub fn decode(frame: &Frame) -> Result<Self> {
        match frame.msg_type {
            TYPE_ANNOUNCE => {
                let payload = expect_len(frame, 5)?;
                Ok(Message::Announce {
                    identity: read_identity(payload),
                    position: payload[4],
                })
            }
            TYPE_NOTE => {
                let payload = expect_len(frame, 7)?;
                Ok(Message::Note {
                    identity: read_identity(payload),
                    note: payload[4],
                    velocity: payload[5],
                    on: payload[6] != 0,
                })
            }
            TYPE_PING => {
                let payload = expect_len(frame, 1)?;
                Ok(Message::Ping {
                    sequence: payload[0],
                })
            }
            TYPE_PING_REPLY => {
                let payload = expect_len(frame, 5)?;
                Ok(Message::PingReply {
                    identity: read_identity(payload),
                    sequence: payload[4],
                })
            }
            TYPE_REMAP_REQUEST => {
                expect_len(frame, 0)?;
                Ok(Message::RemapRequest)
            }
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

fn expect_len(frame: &Frame, expected: usize) -> Result<&[u8]> {
    let payload = frame.payload.as_ref();
    if payload.len() != expected {
        return Err(FrameError::BadPayload {
            msg_type: frame.msg_type,
            len: payload.len(),
            expected,
        });
    }
    Ok(payload)
}

fn read_identity(payload: &[u8]) -> NodeId {
    NodeId(u32::from_le_bytes([
        payload[0], payload[1], payload[2], payload[3],
    ]))
}

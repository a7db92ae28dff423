use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Start-of-frame marker.
pub const START_BYTE: u8 = 0xAA;

/// Maximum payload size in bytes, excluding the envelope.
pub const MAX_PAYLOAD: usize = 28;

/// Envelope bytes around the payload: start + length + type + checksum.
pub const OVERHEAD: usize = 4;

/// One transport-level unit as it appears on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The message type byte.
    pub msg_type: u8,
    /// The payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(msg_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (envelope + payload).
    pub fn wire_size(&self) -> usize {
        OVERHEAD + self.payload.len()
    }
}

/// XOR checksum over the length byte, the type byte, and every payload byte.
pub fn checksum(msg_type: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold((payload.len() as u8) ^ msg_type, |acc, byte| acc ^ byte)
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬────────────┬──────────┬──────────────────┬──────────────┐
/// │ START     │ LENGTH     │ TYPE     │ PAYLOAD          │ CHECKSUM     │
/// │ 0xAA      │ (1B)       │ (1B)     │ (LENGTH bytes)   │ (1B XOR)     │
/// └───────────┴────────────┴──────────┴──────────────────┴──────────────┘
/// ```
pub fn encode_frame(msg_type: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(OVERHEAD + payload.len());
    dst.put_u8(START_BYTE);
    dst.put_u8(payload.len() as u8);
    dst.put_u8(msg_type);
    dst.put_slice(payload);
    dst.put_u8(checksum(msg_type, payload));
    Ok(())
}

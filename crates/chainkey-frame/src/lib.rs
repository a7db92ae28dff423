//! Checksummed message framing for the chainkey inter-board bus.
//!
//! Every protocol message travels in one frame:
//! - A start byte (0xAA) for stream synchronization
//! - A 1-byte payload length and a 1-byte message type
//! - Up to 28 payload bytes, multi-byte fields little-endian
//! - A 1-byte XOR checksum over length, type, and payload
//!
//! Reception is a non-blocking push parser: feed it whatever drained from
//! the port and complete, checksum-valid frames come out. Anything
//! malformed is dropped silently and parsing resumes at the next start
//! byte. Transmission is best-effort and unacknowledged.

pub mod codec;
pub mod error;
pub mod message;
pub mod parser;
pub mod send;

pub use codec::{checksum, encode_frame, Frame, MAX_PAYLOAD, OVERHEAD, START_BYTE};
pub use error::{FrameError, Result};
pub use message::{
    Message, NodeId, TYPE_ANNOUNCE, TYPE_NOTE, TYPE_PING, TYPE_PING_REPLY, TYPE_REMAP_REQUEST,
};
pub use parser::FrameParser;
pub use send::{send_frame, send_message};

use chainkey_bus::BusError;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the fixed wire maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame carried a type byte this protocol does not define.
    #[error("unknown message type 0x{0:02x}")]
    UnknownType(u8),

    /// The payload length does not match the message type's wire shape.
    #[error("bad payload for type 0x{msg_type:02x} ({len} bytes, expected {expected})")]
    BadPayload {
        msg_type: u8,
        len: usize,
        expected: usize,
    },

    /// The underlying bus failed while transmitting.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

pub type Result<T> = std::result::Result<T, FrameError>;

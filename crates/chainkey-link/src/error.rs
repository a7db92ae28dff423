/// Errors that can occur in link-layer operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Bus-level error.
    #[error("bus error: {0}")]
    Bus(#[from] chainkey_bus::BusError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] chainkey_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, LinkError>;

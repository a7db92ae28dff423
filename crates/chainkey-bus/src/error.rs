/// Errors that can occur in bus port operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// An I/O error occurred on the underlying line driver.
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bus this port was attached to has gone away.
    #[error("bus port closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, BusError>;

//! Distributed addressing and note fan-out for a chainable keyboard.
//!
//! chainkey is the protocol core of a modular keyboard whose boards connect
//! left-to-right over a shared half-duplex bus: neighbor sensing, chain
//! position election, checksummed framing, root-driven health checks, and
//! automatic re-discovery when the topology changes.
//!
//! # Crate Structure
//!
//! - [`bus`] — Hardware seams (bus port, neighbor sense, clock) and the
//!   in-memory implementations used for testing and simulation
//! - [`frame`] — Wire codec, incremental parser, typed protocol messages
//! - [`link`] — Node registry, topology discovery, health monitor, and the
//!   `Node` orchestrator

/// Re-export bus types.
pub mod bus {
    pub use chainkey_bus::*;
}

/// Re-export frame types.
pub mod frame {
    pub use chainkey_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use chainkey_link::*;
}

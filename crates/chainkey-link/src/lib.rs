//! Protocol state for one chainkey board.
//!
//! This is the layer that makes a pile of independent boards behave as one
//! instrument: the registry of discovered neighbors, the chain-position
//! election run at boot and on every remap, the root's liveness probing, and
//! the [`Node`] orchestrator that ties them to a bus port inside a single
//! cooperative loop.

pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod health;
pub mod node;
pub mod registry;

pub use config::LinkConfig;
pub use discovery::{DiscoveryOutcome, Role};
pub use error::{LinkError, Result};
pub use events::NoteEvent;
pub use health::{HealthMonitor, HealthVerdict};
pub use node::{NetworkStatus, Node};
pub use registry::{NodeRegistry, RegistryEntry, REGISTRY_CAPACITY};

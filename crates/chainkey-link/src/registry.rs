use chainkey_frame::NodeId;
use tracing::debug;

/// Maximum number of boards a single chain supports.
pub const REGISTRY_CAPACITY: usize = 16;

/// One discovered board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
    pub identity: NodeId,
    pub position: u8,
}

/// The mapping from discovered identity to last-known chain position.
///
/// Bounded at [`REGISTRY_CAPACITY`]; admission beyond capacity is silently
/// refused. Entries are only ever removed wholesale, by [`clear`] at the
/// start of a discovery run. A re-announcing identity overwrites its
/// position in place.
///
/// [`clear`]: NodeRegistry::clear
#[derive(Debug, Default)]
pub struct NodeRegistry {
    entries: Vec<RegistryEntry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(REGISTRY_CAPACITY),
        }
    }

    /// Record `identity` at `position`.
    ///
    /// Returns `true` only for a new admission; overwriting a known identity
    /// or refusing one at capacity returns `false`.
    pub fn register(&mut self, identity: NodeId, position: u8) -> bool {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.identity == identity)
        {
            entry.position = position;
            return false;
        }
        if self.entries.len() >= REGISTRY_CAPACITY {
            return false;
        }
        self.entries.push(RegistryEntry { identity, position });
        debug!(identity = %identity, position, "node admitted");
        true
    }

    /// Forget everything. Called at the start of every discovery run.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last-known position of `identity`.
    pub fn position_of(&self, identity: NodeId) -> Option<u8> {
        self.entries
            .iter()
            .find(|entry| entry.identity == identity)
            .map(|entry| entry.position)
    }

    /// Index of `identity` in admission order. Stable until the next
    /// [`clear`](NodeRegistry::clear); used to key the ping reply flags.
    pub fn slot_of(&self, identity: NodeId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.identity == identity)
    }

    /// The highest position any known node has claimed.
    pub fn highest_position(&self) -> Option<u8> {
        self.entries.iter().map(|entry| entry.position).max()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter()
    }
}

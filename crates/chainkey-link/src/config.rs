use std::time::Duration;

/// Protocol timing and note-layout constants.
///
/// The defaults are the interop values; every board on a bus must agree on
/// them. Tests shrink the windows to keep runs fast.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Wall-clock budget for one discovery run.
    pub discovery_budget: Duration,
    /// Pause around direction changes and before propagating the pulse.
    pub settle_delay: Duration,
    /// Idle granularity of the discovery wait loop.
    pub poll_interval: Duration,
    /// Root-only interval between ping cycles.
    pub ping_interval: Duration,
    /// Window within which every registered node must answer a ping.
    pub ping_timeout: Duration,
    /// MIDI note where position 0's range starts.
    pub base_note: u8,
    /// Semitone span each board covers.
    pub notes_per_board: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            discovery_budget: Duration::from_millis(1000),
            settle_delay: Duration::from_millis(3),
            poll_interval: Duration::from_millis(1),
            ping_interval: Duration::from_millis(1000),
            ping_timeout: Duration::from_millis(200),
            base_note: 48,
            notes_per_board: 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_wire_contract() {
        let config = LinkConfig::default();
        assert_eq!(config.discovery_budget, Duration::from_millis(1000));
        assert_eq!(config.ping_interval, Duration::from_millis(1000));
        assert_eq!(config.ping_timeout, Duration::from_millis(200));
        assert_eq!(config.base_note, 48);
        assert_eq!(config.notes_per_board, 24);
    }
}

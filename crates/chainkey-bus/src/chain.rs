use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::Result;
use crate::loopback::{LoopbackBus, LoopbackPort};
use crate::traits::NeighborSense;

struct ChainWires {
    /// Latched falling-edge flags, one per slot.
    pulses: Vec<bool>,
    slots: usize,
}

/// A simulated physical chain: one shared loopback bus plus the
/// neighbor-sense wiring between adjacent slots.
///
/// Slot 0 has no left neighbor and therefore senses itself as the chain
/// root. A `pulse_right` on slot `i` latches the left-pulse flag of slot
/// `i + 1`; pulsing off the right end of the chain goes nowhere, exactly
/// like driving an unconnected edge connector.
pub struct VirtualChain {
    bus: LoopbackBus,
    wires: Arc<Mutex<ChainWires>>,
    taken: Vec<bool>,
}

/// The port and sense lines handed to one simulated board.
pub struct ChainBoard {
    pub port: LoopbackPort,
    pub sense: ChainSense,
}

impl VirtualChain {
    pub fn new(boards: usize) -> Self {
        Self {
            bus: LoopbackBus::new(),
            wires: Arc::new(Mutex::new(ChainWires {
                pulses: vec![false; boards],
                slots: boards,
            })),
            taken: vec![false; boards],
        }
    }

    /// Take ownership of slot `slot`'s port and sense lines.
    ///
    /// Each slot can be taken once; returns `None` for an unknown or
    /// already-taken slot.
    pub fn board(&mut self, slot: usize) -> Option<ChainBoard> {
        if slot >= self.taken.len() || self.taken[slot] {
            return None;
        }
        self.taken[slot] = true;
        Some(ChainBoard {
            port: self.bus.attach(),
            sense: ChainSense {
                wires: Arc::clone(&self.wires),
                slot,
            },
        })
    }

    /// Plug a new board onto the right end of the chain and hand back its
    /// port and sense lines.
    pub fn attach_right(&mut self) -> ChainBoard {
        let slot = {
            let mut wires = self.wires.lock().expect("chain wires lock");
            wires.pulses.push(false);
            wires.slots += 1;
            wires.slots - 1
        };
        self.taken.push(true);
        debug!(slot, "board attached to right end of chain");
        ChainBoard {
            port: self.bus.attach(),
            sense: ChainSense {
                wires: Arc::clone(&self.wires),
                slot,
            },
        }
    }

    /// Number of slots currently on the chain.
    pub fn len(&self) -> usize {
        self.wires.lock().expect("chain wires lock").slots
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The underlying bus, for attaching a bare observer port in tests.
    pub fn bus(&self) -> &LoopbackBus {
        &self.bus
    }
}

/// Neighbor-sense lines for one slot of a [`VirtualChain`].
pub struct ChainSense {
    wires: Arc<Mutex<ChainWires>>,
    slot: usize,
}

impl NeighborSense for ChainSense {
    fn left_neighbor_present(&mut self) -> bool {
        self.slot > 0
    }

    fn take_left_pulse(&mut self) -> bool {
        self.wires
            .lock()
            .map(|mut wires| std::mem::take(&mut wires.pulses[self.slot]))
            .unwrap_or(false)
    }

    fn pulse_right(&mut self) -> Result<()> {
        let mut wires = self.wires.lock().map_err(|_| crate::error::BusError::Closed)?;
        let right = self.slot + 1;
        if right < wires.pulses.len() {
            wires.pulses[right] = true;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChainSense {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSense").field("slot", &self.slot).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::BusPort;

    #[test]
    fn slot_zero_is_root() {
        let mut chain = VirtualChain::new(2);
        let mut first = chain.board(0).unwrap();
        let mut second = chain.board(1).unwrap();

        assert!(!first.sense.left_neighbor_present());
        assert!(second.sense.left_neighbor_present());
    }

    #[test]
    fn pulse_propagates_to_right_neighbor_only() {
        let mut chain = VirtualChain::new(3);
        let mut a = chain.board(0).unwrap();
        let mut b = chain.board(1).unwrap();
        let mut c = chain.board(2).unwrap();

        a.sense.pulse_right().unwrap();

        assert!(b.sense.take_left_pulse());
        assert!(!b.sense.take_left_pulse(), "latch clears on read");
        assert!(!c.sense.take_left_pulse());
    }

    #[test]
    fn pulse_off_the_right_end_is_harmless() {
        let mut chain = VirtualChain::new(1);
        let mut solo = chain.board(0).unwrap();
        solo.sense.pulse_right().unwrap();
    }

    #[test]
    fn slots_can_only_be_taken_once() {
        let mut chain = VirtualChain::new(1);
        assert!(chain.board(0).is_some());
        assert!(chain.board(0).is_none());
        assert!(chain.board(5).is_none());
    }

    #[test]
    fn attach_right_extends_the_chain() {
        let mut chain = VirtualChain::new(2);
        let mut b = chain.board(1).unwrap();
        assert_eq!(chain.len(), 2);

        let mut d = chain.attach_right();
        assert_eq!(chain.len(), 3);
        assert!(d.sense.left_neighbor_present());

        // The new slot is wired to its left neighbor's pulse line.
        b.sense.pulse_right().unwrap();
        assert!(d.sense.take_left_pulse());
    }

    #[test]
    fn attached_board_shares_the_bus() {
        let mut chain = VirtualChain::new(1);
        let mut a = chain.board(0).unwrap();
        let mut d = chain.attach_right();

        a.port.write_all(&[0x42]).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(d.port.try_read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0x42);
    }
}

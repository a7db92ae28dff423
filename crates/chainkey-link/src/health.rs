use std::time::Instant;

use chainkey_bus::BusPort;
use chainkey_frame::{send_message, Message, NodeId};
use tracing::{debug, warn};

use crate::config::LinkConfig;
use crate::error::Result;
use crate::registry::{NodeRegistry, REGISTRY_CAPACITY};

/// Exactly one ping cycle is in flight at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleState {
    Idle,
    Awaiting { window_closes: Instant },
}

/// Verdict of one completed ping cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    /// At least one registered node missed the reply window. A single
    /// remap request has already been broadcast.
    Unhealthy,
}

/// Root-only periodic liveness probe of every registered node.
///
/// Every ping interval the monitor increments its sequence number,
/// broadcasts a ping, and opens a bounded reply window. The root's own slot
/// is marked received up front. When the window closes, any silent slot
/// makes the cycle unhealthy and triggers exactly one remap request.
#[derive(Debug)]
pub struct HealthMonitor {
    sequence: u8,
    cycle: CycleState,
    replied: [bool; REGISTRY_CAPACITY],
    next_cycle_at: Instant,
}

impl HealthMonitor {
    pub fn new(now: Instant) -> Self {
        Self {
            sequence: 0,
            cycle: CycleState::Idle,
            replied: [false; REGISTRY_CAPACITY],
            next_cycle_at: now,
        }
    }

    /// Advance the cycle.
    ///
    /// Opens a new ping when the interval elapses, closes the reply window
    /// when it expires, and returns a verdict exactly once per completed
    /// cycle. A new cycle never starts while one is awaiting replies.
    pub fn tick<P: BusPort>(
        &mut self,
        now: Instant,
        config: &LinkConfig,
        self_identity: NodeId,
        registry: &NodeRegistry,
        port: &mut P,
    ) -> Result<Option<HealthVerdict>> {
        match self.cycle {
            CycleState::Idle => {
                if now < self.next_cycle_at {
                    return Ok(None);
                }
                self.sequence = self.sequence.wrapping_add(1);
                self.replied = [false; REGISTRY_CAPACITY];
                if let Some(slot) = registry.slot_of(self_identity) {
                    self.replied[slot] = true;
                }
                send_message(port, &Message::Ping {
                    sequence: self.sequence,
                })?;
                self.cycle = CycleState::Awaiting {
                    window_closes: now + config.ping_timeout,
                };
                self.next_cycle_at = now + config.ping_interval;
                debug!(sequence = self.sequence, "ping cycle opened");
                Ok(None)
            }
            CycleState::Awaiting { window_closes } => {
                if now < window_closes {
                    return Ok(None);
                }
                self.cycle = CycleState::Idle;

                let missing = registry
                    .iter()
                    .enumerate()
                    .filter(|(slot, _)| !self.replied[*slot])
                    .count();
                if missing > 0 {
                    warn!(
                        missing,
                        sequence = self.sequence,
                        "nodes missed the reply window, requesting remap"
                    );
                    send_message(port, &Message::RemapRequest)?;
                    Ok(Some(HealthVerdict::Unhealthy))
                } else {
                    debug!(sequence = self.sequence, "all nodes replied");
                    Ok(Some(HealthVerdict::Healthy))
                }
            }
        }
    }

    /// Record a reply. Replies to a stale sequence are ignored.
    pub fn on_reply(&mut self, identity: NodeId, sequence: u8, registry: &NodeRegistry) {
        if sequence != self.sequence {
            return;
        }
        if let Some(slot) = registry.slot_of(identity) {
            self.replied[slot] = true;
        }
    }

    /// Restart interval bookkeeping, e.g. after a discovery run.
    pub fn reset(&mut self, now: Instant, config: &LinkConfig) {
        self.cycle = CycleState::Idle;
        self.next_cycle_at = now + config.ping_interval;
    }
}

use chainkey_bus::{BusPort, Clock, NeighborSense};
use chainkey_frame::{send_message, FrameParser, Message, NodeId};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::Result;
use crate::registry::NodeRegistry;

/// Where this board sits in the chain, decided once per run from a single
/// sample of the left-neighbor line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// No left neighbor: position 0, runs the health monitor.
    Root,
    /// A left neighbor exists: waits for its assignment pulse.
    Downstream,
}

/// Result of one completed discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    pub role: Role,
    pub position: u8,
    pub total_boards: u8,
    pub base_note: u8,
    /// The wait budget expired without an assignment and the board fell back
    /// to acting as its own root at position 0.
    pub timed_out: bool,
}

// Sensing itself happens before the wait loop starts, from one sample of
// the left-neighbor line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Waiting,
    Announced,
    Converging,
}

/// Run the election to completion.
///
/// One run per invocation: sense the left neighbor, take (root) or wait for
/// (downstream) a position, announce it, propagate the pulse, then keep
/// draining announces until the wall-clock budget expires so late arrivals
/// still populate the registry. The budget is a hard ceiling; this function
/// never blocks past it.
pub(crate) fn run<P, S, C>(
    identity: NodeId,
    config: &LinkConfig,
    port: &mut P,
    sense: &mut S,
    clock: &C,
    parser: &mut FrameParser,
    registry: &mut NodeRegistry,
) -> Result<DiscoveryOutcome>
where
    P: BusPort,
    S: NeighborSense,
    C: Clock,
{
    registry.clear();

    let role = if sense.left_neighbor_present() {
        Role::Downstream
    } else {
        Role::Root
    };
    debug!(?role, identity = %identity, "discovery run started");

    let deadline = clock.now() + config.discovery_budget;
    let mut assigned: Option<u8> = None;

    let mut state = match role {
        Role::Root => {
            assigned = Some(0);
            registry.register(identity, 0);
            send_message(port, &Message::Announce {
                identity,
                position: 0,
            })?;
            clock.sleep(config.settle_delay);
            sense.pulse_right()?;
            RunState::Announced
        }
        Role::Downstream => RunState::Waiting,
    };

    let mut scratch = [0u8; 64];
    while clock.now() < deadline {
        // Drain whatever arrived. Late announces keep filling the registry
        // even after this board has its own assignment; everything else on
        // the bus during a run is ignored, which is what coalesces remap
        // requests that land mid-run.
        loop {
            let count = port.try_read(&mut scratch)?;
            if count == 0 {
                break;
            }
            for frame in parser.drain(&scratch[..count]) {
                if let Ok(Message::Announce {
                    identity: other,
                    position,
                }) = Message::decode(&frame)
                {
                    if other != identity {
                        registry.register(other, position);
                    }
                }
            }
        }

        if state == RunState::Waiting && sense.take_left_pulse() {
            let position = registry.highest_position().unwrap_or(0).saturating_add(1);
            assigned = Some(position);
            registry.register(identity, position);
            send_message(port, &Message::Announce { identity, position })?;
            clock.sleep(config.settle_delay);
            sense.pulse_right()?;
            debug!(position, "assignment taken, pulse propagated");
            state = RunState::Announced;
        }

        if state == RunState::Announced {
            state = RunState::Converging;
        }

        clock.sleep(config.poll_interval);
    }

    // Budget expired. An unassigned board degrades to acting as its own
    // root rather than halting; if the chain signal was merely slow this
    // can leave two boards at position 0 until the next remap.
    let timed_out = assigned.is_none();
    let position = assigned.unwrap_or(0);
    if timed_out {
        warn!("no assignment within budget, defaulting to position 0");
        registry.register(identity, position);
        send_message(port, &Message::Announce { identity, position })?;
    }

    let total_boards = registry
        .highest_position()
        .unwrap_or(position)
        .max(position)
        .saturating_add(1);
    let base_note = config
        .base_note
        .saturating_add(position.saturating_mul(config.notes_per_board));

    info!(?role, position, total_boards, base_note, "discovery complete");
    Ok(DiscoveryOutcome {
        role,
        position,
        total_boards,
        base_note,
        timed_out,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chainkey_bus::{BusPort, SystemClock, VirtualChain};

    use super::*;

    fn fast_config() -> LinkConfig {
        LinkConfig {
            discovery_budget: Duration::from_millis(80),
            settle_delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            ..LinkConfig::default()
        }
    }

    fn drain_messages(port: &mut impl BusPort, own: NodeId) -> Vec<Message> {
        let mut parser = FrameParser::new();
        let mut buf = [0u8; 256];
        let mut out = Vec::new();
        loop {
            let n = port.try_read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            for frame in parser.drain(&buf[..n]) {
                let message = Message::decode(&frame).unwrap();
                if !matches!(message, Message::Announce { identity, .. } if identity == own) {
                    out.push(message);
                }
            }
        }
        out
    }

    #[test]
    fn solo_board_becomes_root() {
        let mut chain = VirtualChain::new(1);
        let mut board = chain.board(0).unwrap();
        let config = fast_config();
        let mut parser = FrameParser::new();
        let mut registry = NodeRegistry::new();

        let outcome = run(
            NodeId(0xA0),
            &config,
            &mut board.port,
            &mut board.sense,
            &SystemClock,
            &mut parser,
            &mut registry,
        )
        .unwrap();

        assert_eq!(outcome.role, Role::Root);
        assert_eq!(outcome.position, 0);
        assert_eq!(outcome.total_boards, 1);
        assert_eq!(outcome.base_note, 48);
        assert!(!outcome.timed_out);
        assert_eq!(registry.position_of(NodeId(0xA0)), Some(0));
    }

    #[test]
    fn downstream_without_pulse_falls_back_to_root_position() {
        let mut chain = VirtualChain::new(2);
        let mut silent_left = chain.board(0).unwrap();
        let mut board = chain.board(1).unwrap();
        let config = fast_config();
        let mut parser = FrameParser::new();
        let mut registry = NodeRegistry::new();

        let outcome = run(
            NodeId(0xB1),
            &config,
            &mut board.port,
            &mut board.sense,
            &SystemClock,
            &mut parser,
            &mut registry,
        )
        .unwrap();

        assert_eq!(outcome.role, Role::Downstream);
        assert!(outcome.timed_out);
        assert_eq!(outcome.position, 0);
        assert_eq!(outcome.total_boards, 1);

        // The fallback announce still goes out so an established chain can
        // spot the newcomer and request a remap.
        let seen = drain_messages(&mut silent_left.port, NodeId(0));
        assert!(seen.iter().any(|m| matches!(
            m,
            Message::Announce {
                identity: NodeId(0xB1),
                position: 0,
            }
        )));
    }

    #[test]
    fn pulsed_board_claims_one_past_highest_known() {
        let mut chain = VirtualChain::new(2);
        let mut left = chain.board(0).unwrap();
        let mut board = chain.board(1).unwrap();
        let config = fast_config();

        // Pretend the left neighbor already announced position 0, then
        // pulsed us.
        send_message(&mut left.port, &Message::Announce {
            identity: NodeId(0xA0),
            position: 0,
        })
        .unwrap();
        left.sense.pulse_right().unwrap();

        let mut parser = FrameParser::new();
        let mut registry = NodeRegistry::new();
        let outcome = run(
            NodeId(0xB1),
            &config,
            &mut board.port,
            &mut board.sense,
            &SystemClock,
            &mut parser,
            &mut registry,
        )
        .unwrap();

        assert_eq!(outcome.role, Role::Downstream);
        assert!(!outcome.timed_out);
        assert_eq!(outcome.position, 1);
        assert_eq!(outcome.total_boards, 2);
        assert_eq!(outcome.base_note, 48 + 24);
        assert_eq!(registry.position_of(NodeId(0xA0)), Some(0));
    }

    #[test]
    fn registry_is_cleared_of_stale_entries_at_run_start() {
        let mut chain = VirtualChain::new(1);
        let mut board = chain.board(0).unwrap();
        let config = fast_config();
        let mut parser = FrameParser::new();
        let mut registry = NodeRegistry::new();
        registry.register(NodeId(0xDEAD), 7);

        let outcome = run(
            NodeId(0xA0),
            &config,
            &mut board.port,
            &mut board.sense,
            &SystemClock,
            &mut parser,
            &mut registry,
        )
        .unwrap();

        assert_eq!(registry.position_of(NodeId(0xDEAD)), None);
        assert_eq!(outcome.total_boards, 1);
    }

    #[test]
    fn non_announce_traffic_during_a_run_is_ignored() {
        let mut chain = VirtualChain::new(1);
        let mut board = chain.board(0).unwrap();
        let mut chatter = chain.attach_right();
        let config = fast_config();

        send_message(&mut chatter.port, &Message::RemapRequest).unwrap();
        send_message(&mut chatter.port, &Message::Ping { sequence: 3 }).unwrap();

        let mut parser = FrameParser::new();
        let mut registry = NodeRegistry::new();
        let outcome = run(
            NodeId(0xA0),
            &config,
            &mut board.port,
            &mut board.sense,
            &SystemClock,
            &mut parser,
            &mut registry,
        )
        .unwrap();

        assert_eq!(outcome.position, 0);
        assert_eq!(registry.len(), 1, "only the self entry");
    }
}

use chainkey_bus::{BusPort, Clock, NeighborSense};
use chainkey_frame::{send_message, FrameParser, Message, NodeId};
use tracing::{info, trace, warn};

use crate::config::LinkConfig;
use crate::discovery::{self, DiscoveryOutcome, Role};
use crate::error::Result;
use crate::events::NoteEvent;
use crate::health::{HealthMonitor, HealthVerdict};
use crate::registry::NodeRegistry;

/// Advisory view of the network, read by the LED renderer and friends.
///
/// Observers see it eventually consistent; none of it is correctness-critical
/// to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatus {
    pub remapping: bool,
    pub healthy: bool,
    pub position: u8,
    pub total_boards: u8,
    pub base_note: u8,
}

/// One board's protocol engine.
///
/// Owns the bus port, the neighbor-sense lines, the registry, and the health
/// monitor, and drives them from a single cooperative loop: call
/// [`run_discovery`](Node::run_discovery) once at boot, then [`poll`](Node::poll)
/// from the main loop. Local key events enter through
/// [`note_on`](Node::note_on)/[`note_off`](Node::note_off); remote note
/// events come back out of `poll` for the audio/LED/MIDI collaborators.
pub struct Node<P, S, C> {
    identity: NodeId,
    config: LinkConfig,
    port: P,
    sense: S,
    clock: C,
    parser: FrameParser,
    registry: NodeRegistry,
    health: HealthMonitor,
    role: Role,
    position: u8,
    total_boards: u8,
    base_note: u8,
    converged: bool,
    remapping: bool,
    healthy: bool,
    pending_remap: bool,
}

impl<P, S, C> Node<P, S, C>
where
    P: BusPort,
    S: NeighborSense,
    C: Clock,
{
    /// Create a node with a freshly drawn identity.
    pub fn new(port: P, sense: S, clock: C, config: LinkConfig) -> Self {
        Self::with_identity(NodeId::random(), port, sense, clock, config)
    }

    /// Create a node with an explicit identity.
    pub fn with_identity(identity: NodeId, port: P, sense: S, clock: C, config: LinkConfig) -> Self {
        let now = clock.now();
        let base_note = config.base_note;
        Self {
            identity,
            config,
            port,
            sense,
            clock,
            parser: FrameParser::new(),
            registry: NodeRegistry::new(),
            health: HealthMonitor::new(now),
            role: Role::Root,
            position: 0,
            total_boards: 1,
            base_note,
            converged: false,
            remapping: false,
            healthy: false,
            pending_remap: false,
        }
    }

    pub fn identity(&self) -> NodeId {
        self.identity
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// This board's chain position, valid once discovery has converged.
    pub fn position(&self) -> u8 {
        self.position
    }

    pub fn total_boards(&self) -> u8 {
        self.total_boards
    }

    /// First MIDI note of this board's range.
    pub fn base_note(&self) -> u8 {
        self.base_note
    }

    pub fn is_remapping(&self) -> bool {
        self.remapping
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn status(&self) -> NetworkStatus {
        NetworkStatus {
            remapping: self.remapping,
            healthy: self.healthy,
            position: self.position,
            total_boards: self.total_boards,
            base_note: self.base_note,
        }
    }

    /// Run topology discovery to completion.
    ///
    /// Blocks for the discovery budget, then adopts the outcome: position,
    /// board count, note-range base. Health is optimistically true until the
    /// first ping verdict says otherwise, and any remap request that arrived
    /// mid-run has been coalesced into this run.
    pub fn run_discovery(&mut self) -> Result<DiscoveryOutcome> {
        self.remapping = true;
        self.converged = false;

        let outcome = discovery::run(
            self.identity,
            &self.config,
            &mut self.port,
            &mut self.sense,
            &self.clock,
            &mut self.parser,
            &mut self.registry,
        )?;

        self.role = outcome.role;
        self.position = outcome.position;
        self.total_boards = outcome.total_boards;
        self.base_note = outcome.base_note;
        self.converged = true;
        self.remapping = false;
        self.healthy = true;
        self.pending_remap = false;
        self.health.reset(self.clock.now(), &self.config);

        Ok(outcome)
    }

    /// Drain the bus and advance the protocol.
    ///
    /// Frames are dispatched strictly in arrival order; malformed ones were
    /// already dropped by the parser and undecodable ones are discarded
    /// here. Afterwards the root advances its ping cycle, and a pending
    /// remap re-runs discovery. Returns the remote note events received.
    pub fn poll(&mut self) -> Result<Vec<NoteEvent>> {
        let mut notes = Vec::new();
        let mut scratch = [0u8; 64];
        loop {
            let count = self.port.try_read(&mut scratch)?;
            if count == 0 {
                break;
            }
            for frame in self.parser.drain(&scratch[..count]) {
                match Message::decode(&frame) {
                    Ok(message) => self.dispatch(message, &mut notes)?,
                    Err(err) => trace!(%err, "discarding undecodable frame"),
                }
            }
        }

        if self.converged && self.role == Role::Root && self.total_boards > 1 {
            let verdict = self.health.tick(
                self.clock.now(),
                &self.config,
                self.identity,
                &self.registry,
                &mut self.port,
            )?;
            match verdict {
                Some(HealthVerdict::Healthy) => self.healthy = true,
                Some(HealthVerdict::Unhealthy) => {
                    self.healthy = false;
                    self.pending_remap = true;
                }
                None => {}
            }
        }

        if self.pending_remap {
            info!("remap pending, re-running discovery");
            self.run_discovery()?;
        }

        Ok(notes)
    }

    fn dispatch(&mut self, message: Message, notes: &mut Vec<NoteEvent>) -> Result<()> {
        match message {
            Message::Announce { identity, position } => {
                if identity == self.identity {
                    return Ok(());
                }
                let admitted = self.registry.register(identity, position);
                // A board announcing itself after convergence is a topology
                // change; only the root arbitrates.
                if admitted && self.converged && self.role == Role::Root {
                    warn!(identity = %identity, "new node after convergence, requesting remap");
                    send_message(&mut self.port, &Message::RemapRequest)?;
                    self.healthy = false;
                    self.pending_remap = true;
                }
            }
            Message::Note {
                identity,
                note,
                velocity,
                on,
            } => {
                if identity != self.identity {
                    notes.push(NoteEvent {
                        identity,
                        note,
                        velocity,
                        on,
                    });
                }
            }
            Message::Ping { sequence } => {
                if self.role == Role::Downstream {
                    send_message(&mut self.port, &Message::PingReply {
                        identity: self.identity,
                        sequence,
                    })?;
                }
            }
            Message::PingReply { identity, sequence } => {
                if self.role == Role::Root {
                    self.health.on_reply(identity, sequence, &self.registry);
                }
            }
            Message::RemapRequest => {
                self.healthy = false;
                self.pending_remap = true;
            }
        }
        Ok(())
    }

    /// Broadcast a local key-down. Velocity is clamped into 1..=127.
    pub fn note_on(&mut self, note: u8, velocity: u8) -> Result<()> {
        let velocity = velocity.clamp(1, 127);
        send_message(&mut self.port, &Message::Note {
            identity: self.identity,
            note,
            velocity,
            on: true,
        })?;
        Ok(())
    }

    /// Broadcast a local key-up.
    pub fn note_off(&mut self, note: u8) -> Result<()> {
        send_message(&mut self.port, &Message::Note {
            identity: self.identity,
            note,
            velocity: 0,
            on: false,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use chainkey_bus::{BusPort, ChainBoard, SystemClock, VirtualChain};
    use chainkey_frame::FrameParser;

    use super::*;

    // Shrunk protocol windows. The settle delay stays generous relative to
    // the poll cadence so pulse edges always trail the announces and remap
    // requests that precede them, as they do at real-hardware timings.
    fn fast_config() -> LinkConfig {
        LinkConfig {
            discovery_budget: Duration::from_millis(120),
            settle_delay: Duration::from_millis(8),
            poll_interval: Duration::from_millis(1),
            ping_interval: Duration::from_millis(60),
            ping_timeout: Duration::from_millis(25),
            ..LinkConfig::default()
        }
    }

    type ChainNode = Node<chainkey_bus::LoopbackPort, chainkey_bus::ChainSense, SystemClock>;

    fn make_node(identity: u32, board: ChainBoard) -> ChainNode {
        Node::with_identity(
            NodeId(identity),
            board.port,
            board.sense,
            SystemClock,
            fast_config(),
        )
    }

    fn discover_chain(chain: &mut VirtualChain, identities: &[u32]) -> Vec<ChainNode> {
        let handles: Vec<_> = identities
            .iter()
            .enumerate()
            .map(|(slot, identity)| {
                let board = chain.board(slot).expect("untaken slot");
                let identity = *identity;
                thread::spawn(move || {
                    let mut node = make_node(identity, board);
                    node.run_discovery().expect("discovery should complete");
                    node
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().expect("board thread"))
            .collect()
    }

    fn observed_messages(port: &mut impl BusPort) -> Vec<Message> {
        let mut parser = FrameParser::new();
        let mut buf = [0u8; 512];
        let mut out = Vec::new();
        loop {
            let n = port.try_read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            for frame in parser.drain(&buf[..n]) {
                out.push(Message::decode(&frame).unwrap());
            }
        }
        out
    }

    #[test]
    fn three_boards_elect_dense_positions() {
        let mut chain = VirtualChain::new(3);
        let nodes = discover_chain(&mut chain, &[0xA0, 0xB1, 0xC2]);

        let mut positions: Vec<u8> = nodes.iter().map(|n| n.position()).collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![0, 1, 2]);

        for node in &nodes {
            assert_eq!(node.total_boards(), 3);
            assert!(!node.is_remapping());
            assert!(node.is_healthy());
            assert_eq!(node.base_note(), 48 + node.position() * 24);
        }

        let mut base_notes: Vec<u8> = nodes.iter().map(|n| n.base_note()).collect();
        base_notes.sort_unstable();
        assert_eq!(base_notes, vec![48, 72, 96]);
    }

    #[test]
    fn notes_fan_out_to_every_other_board() {
        let mut chain = VirtualChain::new(2);
        let mut nodes = discover_chain(&mut chain, &[0xA0, 0xB1]);

        let (first, rest) = nodes.split_at_mut(1);
        let a = &mut first[0];
        let b = &mut rest[0];

        a.note_on(60, 100).unwrap();
        a.note_off(60).unwrap();

        let events = b.poll().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            NoteEvent {
                identity: a.identity(),
                note: 60,
                velocity: 100,
                on: true,
            }
        );
        assert_eq!(
            events[1],
            NoteEvent {
                identity: a.identity(),
                note: 60,
                velocity: 0,
                on: false,
            }
        );

        // The sender never hears its own broadcast.
        assert!(a.poll().unwrap().is_empty());
    }

    #[test]
    fn note_on_velocity_is_clamped_into_midi_range() {
        let mut chain = VirtualChain::new(2);
        let mut nodes = discover_chain(&mut chain, &[0xA0, 0xB1]);

        let (first, rest) = nodes.split_at_mut(1);
        first[0].note_on(10, 0).unwrap();
        first[0].note_on(11, 255).unwrap();

        let events = rest[0].poll().unwrap();
        assert_eq!(events[0].velocity, 1);
        assert_eq!(events[1].velocity, 127);
    }

    #[test]
    fn root_pings_and_marks_chain_healthy() {
        let mut chain = VirtualChain::new(2);
        let mut nodes = discover_chain(&mut chain, &[0xA0, 0xB1]);
        let config = fast_config();

        let root_slot = nodes.iter().position(|n| n.position() == 0).unwrap();

        // Interleave polls across one full ping cycle.
        let deadline = Instant::now() + config.ping_interval + config.ping_timeout * 2;
        while Instant::now() < deadline {
            for node in nodes.iter_mut() {
                node.poll().unwrap();
            }
            thread::sleep(Duration::from_millis(2));
        }

        assert!(nodes[root_slot].is_healthy());
        assert_eq!(nodes[root_slot].total_boards(), 2);
        assert!(!nodes[root_slot].is_remapping());
    }

    #[test]
    fn silent_node_drives_unhealthy_then_remap() {
        let mut chain = VirtualChain::new(3);
        let run_until = Instant::now() + Duration::from_millis(600);

        // Slot 2 discovers its position and then goes silent: it never
        // polls again, so it misses every ping window.
        let mut handles = Vec::new();
        for (slot, identity) in [0xA0u32, 0xB1, 0xC2].into_iter().enumerate() {
            let board = chain.board(slot).expect("untaken slot");
            handles.push(thread::spawn(move || {
                let mut node = make_node(identity, board);
                node.run_discovery().unwrap();
                if slot == 2 {
                    return node.status();
                }
                while Instant::now() < run_until {
                    node.poll().unwrap();
                    thread::sleep(Duration::from_millis(2));
                }
                node.status()
            }));
        }

        let statuses: Vec<NetworkStatus> = handles
            .into_iter()
            .map(|handle| handle.join().expect("board thread"))
            .collect();

        // The failed ping cycle forced a remap; the remaining pair
        // re-elected and the silent board fell out of the count.
        let root = statuses.iter().find(|s| s.position == 0).unwrap();
        assert_eq!(root.total_boards, 2);
        assert!(root.healthy);
    }

    #[test]
    fn new_announce_after_convergence_triggers_remap_broadcast() {
        let mut chain = VirtualChain::new(1);
        let board = chain.board(0).unwrap();
        let mut root = make_node(0xA0, board);
        root.run_discovery().unwrap();
        assert_eq!(root.total_boards(), 1);

        // A stranger announces itself on the bus after convergence.
        let mut stranger = chain.attach_right();
        chainkey_frame::send_message(&mut stranger.port, &Message::Announce {
            identity: NodeId(0xD3),
            position: 0,
        })
        .unwrap();

        root.poll().unwrap();

        let seen = observed_messages(&mut stranger.port);
        let remaps = seen
            .iter()
            .filter(|m| matches!(m, Message::RemapRequest))
            .count();
        assert_eq!(remaps, 1, "exactly one remap request: {seen:?}");
        // The re-run's announce proves discovery actually restarted.
        assert!(seen
            .iter()
            .any(|m| matches!(m, Message::Announce { identity, .. } if *identity == NodeId(0xA0))));
    }

    #[test]
    fn known_identity_reannounce_does_not_remap() {
        let mut chain = VirtualChain::new(2);
        let mut nodes = discover_chain(&mut chain, &[0xA0, 0xB1]);
        let mut observer = chain.attach_right();

        // B re-announces its existing assignment; the root must not treat
        // it as a topology change.
        let b_identity = nodes
            .iter()
            .find(|n| n.position() == 1)
            .map(|n| n.identity())
            .unwrap();
        chainkey_frame::send_message(&mut observer.port, &Message::Announce {
            identity: b_identity,
            position: 1,
        })
        .unwrap();

        for node in nodes.iter_mut() {
            node.poll().unwrap();
        }

        let seen = observed_messages(&mut observer.port);
        assert!(
            !seen.iter().any(|m| matches!(m, Message::RemapRequest)),
            "unexpected remap: {seen:?}"
        );
    }

    #[test]
    fn coalesced_remap_requests_run_discovery_once() {
        let mut chain = VirtualChain::new(1);
        let board = chain.board(0).unwrap();
        let mut root = make_node(0xA0, board);
        root.run_discovery().unwrap();

        let mut observer = chain.attach_right();
        chainkey_frame::send_message(&mut observer.port, &Message::RemapRequest).unwrap();
        chainkey_frame::send_message(&mut observer.port, &Message::RemapRequest).unwrap();

        root.poll().unwrap();

        let announces = observed_messages(&mut observer.port)
            .iter()
            .filter(|m| matches!(m, Message::Announce { .. }))
            .count();
        assert_eq!(announces, 1, "both requests coalesced into one run");
        assert!(!root.is_remapping());
    }

    #[test]
    fn remap_request_mid_discovery_does_not_restart_the_run() {
        let mut chain = VirtualChain::new(1);
        let board = chain.board(0).unwrap();
        let mut observer = chain.attach_right();

        let handle = thread::spawn(move || {
            let mut root = make_node(0xA0, board);
            root.run_discovery().unwrap();
            root
        });

        // Land a remap request while the run is still inside its budget.
        thread::sleep(Duration::from_millis(30));
        chainkey_frame::send_message(&mut observer.port, &Message::RemapRequest).unwrap();

        let mut root = handle.join().unwrap();
        assert!(!root.is_remapping());

        // The in-flight run consumed the request; nothing is pending.
        root.poll().unwrap();
        let announces = observed_messages(&mut observer.port)
            .iter()
            .filter(|m| matches!(m, Message::Announce { .. }))
            .count();
        assert_eq!(announces, 1, "single announce from the single run");
    }

    #[test]
    fn late_attached_board_forces_full_re_election() {
        let mut chain = VirtualChain::new(3);
        let run_until = Instant::now() + Duration::from_millis(900);

        let mut handles = Vec::new();
        for (slot, identity) in [0xA0u32, 0xB1, 0xC2].into_iter().enumerate() {
            let board = chain.board(slot).expect("untaken slot");
            handles.push(thread::spawn(move || {
                let mut node = make_node(identity, board);
                node.run_discovery().unwrap();
                while Instant::now() < run_until {
                    node.poll().unwrap();
                    thread::sleep(Duration::from_millis(2));
                }
                node.status()
            }));
        }

        // Board D powers up on the right end after the chain has settled.
        thread::sleep(Duration::from_millis(250));
        let board = chain.attach_right();
        let late = thread::spawn(move || {
            let mut node = make_node(0xD3, board);
            node.run_discovery().unwrap();
            while Instant::now() < run_until {
                node.poll().unwrap();
                thread::sleep(Duration::from_millis(2));
            }
            node.status()
        });

        let mut statuses: Vec<NetworkStatus> = handles
            .into_iter()
            .map(|handle| handle.join().expect("board thread"))
            .collect();
        statuses.push(late.join().expect("late board thread"));

        let mut positions: Vec<u8> = statuses.iter().map(|s| s.position).collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![0, 1, 2, 3]);
        for status in &statuses {
            assert_eq!(status.total_boards, 4);
            assert!(!status.remapping);
        }
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::error::{BusError, Result};
use crate::traits::BusPort;

struct BusState {
    inboxes: Vec<VecDeque<u8>>,
    transmitting: Vec<bool>,
}

/// In-memory multi-drop bus.
///
/// Every byte written through one port is delivered to the inbox of every
/// other attached port whose receiver is currently enabled. A transmitter
/// never hears its own bytes, and a port with transmit enable asserted has
/// its receiver gated off, matching the half-duplex discipline of the real
/// line.
#[derive(Clone)]
pub struct LoopbackBus {
    state: Arc<Mutex<BusState>>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                inboxes: Vec::new(),
                transmitting: Vec::new(),
            })),
        }
    }

    /// Attach a new port to the bus.
    pub fn attach(&self) -> LoopbackPort {
        let mut state = self.state.lock().expect("bus state lock");
        state.inboxes.push(VecDeque::new());
        state.transmitting.push(false);
        let index = state.inboxes.len() - 1;
        debug!(port = index, "port attached to loopback bus");
        LoopbackPort {
            state: Arc::clone(&self.state),
            index,
        }
    }

    /// Number of ports attached so far.
    pub fn port_count(&self) -> usize {
        self.state.lock().expect("bus state lock").inboxes.len()
    }
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One board's endpoint on a [`LoopbackBus`].
pub struct LoopbackPort {
    state: Arc<Mutex<BusState>>,
    index: usize,
}

impl LoopbackPort {
    /// The attachment index of this port on its bus.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl BusPort for LoopbackPort {
    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock().map_err(|_| BusError::Closed)?;
        let inbox = &mut state.inboxes[self.index];
        let count = inbox.len().min(buf.len());
        for slot in buf.iter_mut().take(count) {
            *slot = inbox.pop_front().unwrap_or_default();
        }
        Ok(count)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| BusError::Closed)?;
        let contended = state
            .transmitting
            .iter()
            .enumerate()
            .any(|(other, driving)| *driving && other != self.index);
        if contended {
            debug!(port = self.index, "line contention: another port is driving");
        }
        let sender = self.index;
        let transmitting = state.transmitting.clone();
        for (other, inbox) in state.inboxes.iter_mut().enumerate() {
            // Receivers with transmit enable asserted are gated off.
            if other != sender && !transmitting[other] {
                inbox.extend(bytes.iter().copied());
            }
        }
        trace!(port = sender, len = bytes.len(), "byte run delivered");
        Ok(())
    }

    fn set_transmit_enable(&mut self, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| BusError::Closed)?;
        state.transmitting[self.index] = enabled;
        Ok(())
    }
}

impl std::fmt::Debug for LoopbackPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackPort")
            .field("index", &self.index)
            .finish()
    }
}

use bytes::Bytes;
use tracing::trace;

use crate::codec::{Frame, MAX_PAYLOAD, START_BYTE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    SeekStart,
    Length,
    Type,
    Payload,
    Checksum,
}

/// Incremental frame parser for the half-duplex bus.
///
/// Feed bytes as they drain from the port; complete, checksum-valid frames
/// come back out. A checksum mismatch or an out-of-range length drops the
/// in-flight frame without surfacing an event and returns the parser to
/// seeking the next start byte. There is no mid-frame resynchronization.
#[derive(Debug)]
pub struct FrameParser {
    state: ParseState,
    msg_type: u8,
    expected_len: usize,
    staging: [u8; MAX_PAYLOAD],
    cursor: usize,
    accumulator: u8,
    dropped: u64,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::SeekStart,
            msg_type: 0,
            expected_len: 0,
            staging: [0; MAX_PAYLOAD],
            cursor: 0,
            accumulator: 0,
            dropped: 0,
        }
    }

    /// Feed one byte; returns a frame when this byte completes one.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            ParseState::SeekStart => {
                if byte == START_BYTE {
                    self.state = ParseState::Length;
                }
            }
            ParseState::Length => {
                if byte as usize > MAX_PAYLOAD {
                    self.drop_frame("length out of range");
                } else {
                    self.expected_len = byte as usize;
                    self.accumulator = byte;
                    self.state = ParseState::Type;
                }
            }
            ParseState::Type => {
                self.msg_type = byte;
                self.accumulator ^= byte;
                self.cursor = 0;
                self.state = if self.expected_len == 0 {
                    ParseState::Checksum
                } else {
                    ParseState::Payload
                };
            }
            ParseState::Payload => {
                self.staging[self.cursor] = byte;
                self.cursor += 1;
                self.accumulator ^= byte;
                if self.cursor == self.expected_len {
                    self.state = ParseState::Checksum;
                }
            }
            ParseState::Checksum => {
                if byte == self.accumulator {
                    let frame = Frame::new(
                        self.msg_type,
                        Bytes::copy_from_slice(&self.staging[..self.expected_len]),
                    );
                    self.reset();
                    return Some(frame);
                }
                self.drop_frame("checksum mismatch");
            }
        }
        None
    }

    /// Feed a byte run; collect every frame it completes.
    pub fn drain(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|byte| self.push(*byte)).collect()
    }

    /// Frames dropped to malformed input since construction.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    fn drop_frame(&mut self, reason: &'static str) {
        self.dropped += 1;
        trace!(reason, "dropping frame");
        self.reset();
    }

    fn reset(&mut self) {
        self.state = ParseState::SeekStart;
        self.expected_len = 0;
        self.cursor = 0;
        self.accumulator = 0;
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

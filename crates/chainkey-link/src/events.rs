use chainkey_frame::NodeId;

/// A note event as consumed by the audio, LED, and MIDI collaborators.
///
/// Remote events carry the originating board's identity. Local key-scan
/// events enter through the node's `note_on`/`note_off` calls and are
/// stamped with the local identity before broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub identity: NodeId,
    pub note: u8,
    pub velocity: u8,
    pub on: bool,
}

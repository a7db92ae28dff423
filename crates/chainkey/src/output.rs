use std::io::IsTerminal;

use chainkey_frame::{Message, NodeId};
use chainkey_link::{NetworkStatus, NoteEvent};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageOutput {
    Announce {
        identity: String,
        position: u8,
    },
    Note {
        identity: String,
        note: u8,
        velocity: u8,
        on: bool,
    },
    Ping {
        sequence: u8,
    },
    PingReply {
        identity: String,
        sequence: u8,
    },
    RemapRequest,
}

impl From<&Message> for MessageOutput {
    fn from(message: &Message) -> Self {
        match *message {
            Message::Announce { identity, position } => MessageOutput::Announce {
                identity: identity.to_string(),
                position,
            },
            Message::Note {
                identity,
                note,
                velocity,
                on,
            } => MessageOutput::Note {
                identity: identity.to_string(),
                note,
                velocity,
                on,
            },
            Message::Ping { sequence } => MessageOutput::Ping { sequence },
            Message::PingReply { identity, sequence } => MessageOutput::PingReply {
                identity: identity.to_string(),
                sequence,
            },
            Message::RemapRequest => MessageOutput::RemapRequest,
        }
    }
}

fn message_summary(message: &Message) -> String {
    match message {
        Message::Announce { identity, position } => {
            format!("identity={identity} position={position}")
        }
        Message::Note {
            identity,
            note,
            velocity,
            on,
        } => format!(
            "identity={identity} note={note} velocity={velocity} {}",
            if *on { "on" } else { "off" }
        ),
        Message::Ping { sequence } => format!("sequence={sequence}"),
        Message::PingReply { identity, sequence } => {
            format!("identity={identity} sequence={sequence}")
        }
        Message::RemapRequest => String::new(),
    }
}

fn message_name(message: &Message) -> &'static str {
    match message {
        Message::Announce { .. } => "ANNOUNCE",
        Message::Note { .. } => "NOTE",
        Message::Ping { .. } => "PING",
        Message::PingReply { .. } => "PING_REPLY",
        Message::RemapRequest => "REMAP_REQUEST",
    }
}

pub fn print_message(message: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput::from(message);
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["MESSAGE", "FIELDS"])
                .add_row(vec![
                    message_name(message).to_string(),
                    message_summary(message),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("{} {}", message_name(message), message_summary(message));
        }
    }
}

#[derive(Serialize)]
struct EncodedOutput<'a> {
    #[serde(rename = "type")]
    msg_type: &'a str,
    hex: String,
    wire_size: usize,
}

pub fn print_encoded(wire: &[u8], message: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EncodedOutput {
                msg_type: message_name(message),
                hex: to_hex(wire),
                wire_size: wire.len(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Raw => println!("{}", to_hex(wire)),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!(
                "{} ({} bytes): {}",
                message_name(message),
                wire.len(),
                to_hex(wire)
            );
        }
    }
}

#[derive(Serialize)]
struct NoteEventOutput {
    event: &'static str,
    slot: usize,
    identity: String,
    note: u8,
    velocity: u8,
    on: bool,
}

pub fn print_note(slot: usize, note: &NoteEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = NoteEventOutput {
                event: "note",
                slot,
                identity: note.identity.to_string(),
                note: note.note,
                velocity: note.velocity,
                on: note.on,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        _ => {
            println!(
                "board {slot} <- note {} {} vel {} (from {})",
                note.note,
                if note.on { "on " } else { "off" },
                note.velocity,
                note.identity
            );
        }
    }
}

#[derive(Serialize)]
struct DiscoveryOutput {
    event: &'static str,
    slot: usize,
    identity: String,
    position: u8,
    total_boards: u8,
    base_note: u8,
    healthy: bool,
    remapping: bool,
}

pub fn print_discovery(slot: usize, identity: NodeId, status: &NetworkStatus, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DiscoveryOutput {
                event: "discovered",
                slot,
                identity: identity.to_string(),
                position: status.position,
                total_boards: status.total_boards,
                base_note: status.base_note,
                healthy: status.healthy,
                remapping: status.remapping,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        _ => {
            println!(
                "board {slot} ({identity}): position {} of {}, base note {}",
                status.position, status.total_boards, status.base_note
            );
        }
    }
}

#[derive(Serialize)]
struct TopologyOutput {
    event: &'static str,
    boards: Vec<DiscoveryOutput>,
}

pub fn print_topology(rows: &[(usize, NodeId, NetworkStatus)], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = TopologyOutput {
                event: "topology",
                boards: rows
                    .iter()
                    .map(|(slot, identity, status)| DiscoveryOutput {
                        event: "board",
                        slot: *slot,
                        identity: identity.to_string(),
                        position: status.position,
                        total_boards: status.total_boards,
                        base_note: status.base_note,
                        healthy: status.healthy,
                        remapping: status.remapping,
                    })
                    .collect(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SLOT", "IDENTITY", "POSITION", "BASE NOTE", "HEALTHY"]);
            for (slot, identity, status) in rows {
                table.add_row(vec![
                    slot.to_string(),
                    identity.to_string(),
                    status.position.to_string(),
                    status.base_note.to_string(),
                    status.healthy.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for (slot, identity, status) in rows {
                println!(
                    "slot {slot}: {identity} at position {} (base note {}, healthy {})",
                    status.position, status.base_note, status.healthy
                );
            }
        }
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

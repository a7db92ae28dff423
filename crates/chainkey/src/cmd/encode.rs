use bytes::BytesMut;
use chainkey_frame::{encode_frame, Message, NodeId};

use crate::cmd::{EncodeArgs, MessageSpec};
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let message = build_message(&args.message)?;

    let mut payload = BytesMut::new();
    message.encode_payload(&mut payload);
    let mut wire = BytesMut::new();
    encode_frame(message.msg_type(), &payload, &mut wire)
        .map_err(|err| frame_error("encode failed", err))?;

    print_encoded(&wire, &message, format);
    Ok(SUCCESS)
}

fn build_message(spec: &MessageSpec) -> CliResult<Message> {
    Ok(match spec {
        MessageSpec::Announce { identity, position } => Message::Announce {
            identity: parse_identity(identity)?,
            position: *position,
        },
        MessageSpec::Note {
            identity,
            note,
            velocity,
            off,
        } => Message::Note {
            identity: parse_identity(identity)?,
            note: *note,
            velocity: *velocity,
            on: !off,
        },
        MessageSpec::Ping { sequence } => Message::Ping {
            sequence: *sequence,
        },
        MessageSpec::PingReply { identity, sequence } => Message::PingReply {
            identity: parse_identity(identity)?,
            sequence: *sequence,
        },
        MessageSpec::RemapRequest => Message::RemapRequest,
    })
}

pub(crate) fn parse_identity(input: &str) -> CliResult<NodeId> {
    let trimmed = input
        .trim()
        .strip_prefix("0x")
        .unwrap_or_else(|| input.trim());
    u32::from_str_radix(trimmed, 16)
        .map(NodeId)
        .map_err(|_| CliError::new(USAGE, format!("invalid identity '{input}': expected hex")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_parses_with_and_without_prefix() {
        assert_eq!(parse_identity("deadbeef").unwrap(), NodeId(0xDEADBEEF));
        assert_eq!(parse_identity("0xA0").unwrap(), NodeId(0xA0));
        assert!(parse_identity("not-hex").is_err());
        assert!(parse_identity("112233445566").is_err(), "wider than 32 bits");
    }

    #[test]
    fn note_spec_builds_note_off() {
        let spec = MessageSpec::Note {
            identity: "01020304".to_string(),
            note: 64,
            velocity: 80,
            off: true,
        };
        let message = build_message(&spec).unwrap();
        assert_eq!(
            message,
            Message::Note {
                identity: NodeId(0x01020304),
                note: 64,
                velocity: 80,
                on: false,
            }
        );
    }
}

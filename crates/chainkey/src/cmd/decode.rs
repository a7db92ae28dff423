use chainkey_frame::{FrameParser, Message};

use crate::cmd::DecodeArgs;
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)?;

    let mut parser = FrameParser::new();
    let mut decoded = 0usize;
    for frame in parser.drain(&bytes) {
        match Message::decode(&frame) {
            Ok(message) => {
                print_message(&message, format);
                decoded += 1;
            }
            Err(err) => {
                return Err(CliError::new(
                    DATA_INVALID,
                    format!("frame decoded but message is invalid: {err}"),
                ));
            }
        }
    }

    if decoded == 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "no complete frames in input ({} dropped)",
                parser.dropped_frames()
            ),
        ));
    }
    Ok(SUCCESS)
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(CliError::new(DATA_INVALID, "empty hex input"));
    }
    if cleaned.len() % 2 != 0 {
        return Err(CliError::new(DATA_INVALID, "odd number of hex digits"));
    }

    (0..cleaned.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&cleaned[i..i + 2], 16)
                .map_err(|_| CliError::new(DATA_INVALID, format!("invalid hex at offset {i}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parses_with_whitespace() {
        assert_eq!(parse_hex("aa 01 0f").unwrap(), vec![0xAA, 0x01, 0x0F]);
        assert_eq!(parse_hex("AA010F").unwrap(), vec![0xAA, 0x01, 0x0F]);
    }

    #[test]
    fn hex_rejects_bad_input() {
        assert!(parse_hex("").is_err());
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }
}

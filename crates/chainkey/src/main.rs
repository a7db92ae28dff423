mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "chainkey", version, about = "Chainable keyboard protocol tools")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sim_subcommand() {
        let cli = Cli::try_parse_from([
            "chainkey",
            "sim",
            "--boards",
            "4",
            "--duration",
            "2s",
            "--attach-after",
            "1s",
        ])
        .expect("sim args should parse");

        assert!(matches!(cli.command, Command::Sim(_)));
    }

    #[test]
    fn parses_encode_subcommand() {
        let cli = Cli::try_parse_from([
            "chainkey",
            "encode",
            "announce",
            "--identity",
            "deadbeef",
            "--position",
            "2",
        ])
        .expect("encode args should parse");

        assert!(matches!(cli.command, Command::Encode(_)));
    }

    #[test]
    fn parses_decode_subcommand() {
        let cli = Cli::try_parse_from(["chainkey", "--format", "json", "decode", "aa000505"])
            .expect("decode args should parse");
        assert!(matches!(cli.command, Command::Decode(_)));
    }

    #[test]
    fn rejects_unknown_message_kind() {
        let err = Cli::try_parse_from(["chainkey", "encode", "frobnicate"])
            .expect_err("unknown message kind should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }
}

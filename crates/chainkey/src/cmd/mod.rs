use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod envinfo;
pub mod sim;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a virtual board chain end to end: discovery, pings, notes.
    Sim(SimArgs),
    /// Build a protocol frame and print its wire bytes.
    Encode(EncodeArgs),
    /// Parse hex wire bytes and print the recovered messages.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Print build and environment diagnostics.
    Envinfo(EnvinfoArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Sim(args) => sim::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Envinfo(args) => envinfo::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct SimArgs {
    /// Number of boards on the chain at power-on (1-16).
    #[arg(long, default_value_t = 3)]
    pub boards: usize,
    /// Total run time (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub duration: String,
    /// Interval between demo notes injected on each board.
    #[arg(long, default_value = "400ms")]
    pub note_interval: String,
    /// Attach one extra board after this delay to exercise a live remap.
    #[arg(long, value_name = "DELAY")]
    pub attach_after: Option<String>,
    /// Do not inject demo notes; run discovery and pings only.
    #[arg(long)]
    pub silent: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(subcommand)]
    pub message: MessageSpec,
}

#[derive(Subcommand, Debug)]
pub enum MessageSpec {
    /// "My identity is X at position Y."
    Announce {
        /// Board identity as 8 hex digits.
        #[arg(long)]
        identity: String,
        #[arg(long)]
        position: u8,
    },
    /// A note event.
    Note {
        /// Board identity as 8 hex digits.
        #[arg(long)]
        identity: String,
        #[arg(long)]
        note: u8,
        #[arg(long, default_value_t = 100)]
        velocity: u8,
        /// Encode a note-off instead of a note-on.
        #[arg(long)]
        off: bool,
    },
    /// Root liveness probe.
    Ping {
        #[arg(long, default_value_t = 1)]
        sequence: u8,
    },
    /// Liveness response.
    PingReply {
        /// Board identity as 8 hex digits.
        #[arg(long)]
        identity: String,
        #[arg(long)]
        sequence: u8,
    },
    /// Ask the chain to re-run discovery.
    RemapRequest,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Wire bytes as hex, e.g. aa0103010f.
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct EnvinfoArgs {}

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod negotiate;
pub mod role;
pub mod simulate;
pub mod version;

/// Location the CLI gives the simulated host document.
pub const DEFAULT_HOST_URL: &str = "https://host.example/app.html";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a message into a URL fragment.
    Encode(EncodeArgs),
    /// Decode a received fragment.
    Decode(DecodeArgs),
    /// Resolve the channel role of a document location.
    Role(RoleArgs),
    /// Build the guest URL a host would load.
    Negotiate(NegotiateArgs),
    /// Run a host and a guest in a simulated browser and exchange messages.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Role(args) => role::run(args, format),
        Command::Negotiate(args) => negotiate::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// URL of the window the message is written into.
    pub url: String,
    /// Message text.
    pub message: String,
    /// Sequence number of the message.
    #[arg(long, short = 's', default_value = "0")]
    pub sequence: u64,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// A fragment (`#3_hi`, `3_hi`) or a full URL carrying one.
    pub input: String,
}

#[derive(Args, Debug)]
pub struct RoleArgs {
    /// Document location to inspect.
    pub location: String,
}

/// Host side of a channel, shared by `negotiate` and `simulate`.
#[derive(Args, Debug, Clone)]
pub struct HostArgs {
    /// Channel id.
    #[arg(long, short = 'c', default_value = "default")]
    pub channel: String,
    /// URL of the guest document, resolved against the host location.
    #[arg(long, default_value = "https://guest.example/cb.html")]
    pub remote: String,
    /// URL of the host callback document.
    #[arg(long, conflicts_with = "current_window")]
    pub local: Option<String>,
    /// Use the host window itself as the callback window.
    #[arg(long)]
    pub current_window: bool,
    /// Element id of a visible container for the guest frame.
    #[arg(long)]
    pub container: Option<String>,
    /// Become ready after this delay instead of waiting for the callback
    /// document (e.g. 100ms).
    #[arg(long)]
    pub ready_after: Option<String>,
    /// Upper bound on the length of a message URL.
    #[arg(long)]
    pub max_url_length: Option<usize>,
    /// Location of the host document.
    #[arg(long, default_value = DEFAULT_HOST_URL)]
    pub host_url: String,
}

#[derive(Args, Debug)]
pub struct NegotiateArgs {
    #[command(flatten)]
    pub host: HostArgs,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub host: HostArgs,
    /// Host configuration file (JSON). Replaces the host flags except
    /// `--host-url`.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Message the host posts once ready. Repeatable.
    #[arg(long = "message", short = 'm')]
    pub messages: Vec<String>,
    /// Guest answers every message with `echo:<message>`.
    #[arg(long)]
    pub echo: bool,
    /// Virtual time to run for (e.g. 5s, 500ms).
    #[arg(long, default_value = "10s")]
    pub duration: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

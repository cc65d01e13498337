mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "hashxdm",
    version,
    about = "Fragment-based cross-document messaging CLI"
)]
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
    fn parses_encode_subcommand() {
        let cli = Cli::try_parse_from([
            "hashxdm",
            "encode",
            "https://guest.example/cb.html",
            "hello",
            "--sequence",
            "4",
        ])
        .expect("encode args should parse");

        match cli.command {
            Command::Encode(args) => assert_eq!(args.sequence, 4),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_local_targets() {
        let err = Cli::try_parse_from([
            "hashxdm",
            "negotiate",
            "--local",
            "hash.html",
            "--current-window",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_repeated_simulate_messages() {
        let cli = Cli::try_parse_from([
            "hashxdm", "simulate", "-m", "one", "-m", "two", "--echo", "--duration", "2s",
        ])
        .expect("simulate args should parse");

        match cli.command {
            Command::Simulate(args) => {
                assert_eq!(args.messages, vec!["one", "two"]);
                assert!(args.echo);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

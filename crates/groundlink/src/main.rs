mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "groundlink", version, about = "Ground-side link controller")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
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
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "groundlink",
            "send",
            "unix:/tmp/groundlink.sock",
            "--target",
            "1",
            "--opcode",
            "0x10",
            "--args",
            "01",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.target, 1);
                assert_eq!(args.opcode, 0x10);
                assert_eq!(args.args.0, vec![1]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_listen_with_connect() {
        let err = Cli::try_parse_from([
            "groundlink",
            "run",
            "--listen",
            "unix:/tmp/a.sock",
            "--connect",
            "tcp:127.0.0.1:7400",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_bad_opcode() {
        let err = Cli::try_parse_from([
            "groundlink",
            "send",
            "unix:/tmp/groundlink.sock",
            "--target",
            "1",
            "--opcode",
            "300",
        ])
        .expect_err("opcode out of range");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_monitor_with_count() {
        let cli = Cli::try_parse_from(["groundlink", "monitor", "tcp:127.0.0.1:7400", "--count", "3"])
            .expect("monitor args should parse");
        assert!(matches!(cli.command, Command::Monitor(ref args) if args.count == Some(3)));
    }
}

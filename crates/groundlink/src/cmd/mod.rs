use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use groundlink_controller::ControllerConfig;

use crate::exit::{config_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod check;
pub mod monitor;
pub mod run;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the controller until Ctrl-C.
    Run(RunArgs),
    /// Send one command to a controller and print its result.
    Send(SendArgs),
    /// Print telemetry received from a controller.
    Monitor(MonitorArgs),
    /// Validate a configuration file and print its routing table.
    Check(CheckArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Check(args) => check::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Controller configuration (TOML). Defaults apply when omitted.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Wait for the peer on this address (unix:PATH or tcp:HOST:PORT).
    #[arg(long, value_name = "ADDR", conflicts_with = "connect")]
    pub listen: Option<String>,
    /// Dial the peer at this address.
    #[arg(long, value_name = "ADDR")]
    pub connect: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Controller address (unix:PATH or tcp:HOST:PORT).
    pub addr: String,
    /// Target driver id.
    #[arg(long, short = 't', value_parser = parse_byte)]
    pub target: u8,
    /// Opcode (decimal or 0x-prefixed hex).
    #[arg(long, short = 'o', value_parser = parse_byte)]
    pub opcode: u8,
    /// Command arguments as hex bytes, e.g. 01 or "01 ff".
    #[arg(long, value_parser = parse_hex, default_value = "")]
    pub args: HexBytes,
    /// Configuration to take link timing from.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Maximum time to wait for the RESULT (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Controller address (unix:PATH or tcp:HOST:PORT).
    pub addr: String,
    /// Exit after receiving N telemetry messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Configuration to take link timing from.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Controller configuration (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Raw bytes parsed from a hex argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

pub fn load_config(path: Option<&PathBuf>) -> CliResult<ControllerConfig> {
    match path {
        Some(path) => ControllerConfig::load(path)
            .map_err(|err| config_error(&format!("failed loading {}", path.display()), err)),
        None => Ok(ControllerConfig::default()),
    }
}

pub fn parse_byte(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("expected a byte value (0-255 or 0x00-0xff), got '{input}'"))
}

pub fn parse_hex(input: &str) -> Result<HexBytes, String> {
    let digits: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if !digits.is_ascii() {
        return Err(format!("invalid hex in '{input}'"));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{input}'"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| format!("invalid hex byte '{}' in '{input}'", &digits[i..i + 2]))
        })
        .collect::<Result<Vec<u8>, String>>()
        .map(HexBytes)
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub fn install_ctrlc_handler(on_interrupt: impl Fn() + Send + 'static) -> CliResult<()> {
    ctrlc::set_handler(on_interrupt)
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

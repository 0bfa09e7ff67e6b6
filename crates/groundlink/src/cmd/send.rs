use groundlink_controller::OperatorConsole;
use groundlink_dispatch::{Command, DriverId, ResultStatus};
use groundlink_transport::LinkAddr;

use crate::cmd::{load_config, parse_duration, SendArgs};
use crate::exit::{controller_error, transport_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_result, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let config = load_config(args.config.as_ref())?;
    let addr: LinkAddr = args
        .addr
        .parse()
        .map_err(|err| transport_error("invalid address", err))?;

    let mut console = OperatorConsole::connect(&addr, config.session_config())
        .map_err(|err| controller_error("connect failed", err))?;
    console
        .handshake()
        .map_err(|err| controller_error("handshake failed", err))?;

    let command = Command::new(DriverId(args.target), args.opcode, args.args.0);
    let result = console
        .send_command(&command, timeout)
        .map_err(|err| controller_error("command failed", err))?;
    console.close();

    print_result(&result, format);
    Ok(if result.status == ResultStatus::Ok {
        SUCCESS
    } else {
        FAILURE
    })
}

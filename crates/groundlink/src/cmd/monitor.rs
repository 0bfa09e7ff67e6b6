use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use groundlink_controller::OperatorConsole;
use groundlink_transport::LinkAddr;

use crate::cmd::{install_ctrlc_handler, load_config, MonitorArgs};
use crate::exit::{controller_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_telemetry, OutputFormat};

const POLL: Duration = Duration::from_millis(250);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(args.config.as_ref())?;
    let addr: LinkAddr = args
        .addr
        .parse()
        .map_err(|err| transport_error("invalid address", err))?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    install_ctrlc_handler(move || flag.store(false, Ordering::SeqCst))?;

    let mut console = OperatorConsole::connect(&addr, config.session_config())
        .map_err(|err| controller_error("connect failed", err))?;
    console
        .handshake()
        .map_err(|err| controller_error("handshake failed", err))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let Some(message) = console
            .next_telemetry(POLL)
            .map_err(|err| controller_error("receive failed", err))?
        else {
            continue;
        };

        print_telemetry(&message, format);
        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    console.close();
    Ok(SUCCESS)
}

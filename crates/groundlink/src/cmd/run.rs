use groundlink_controller::{CancellationToken, Controller, TransportMode};
use tracing::info;

use crate::cmd::{install_ctrlc_handler, load_config, RunArgs};
use crate::exit::{controller_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_report, OutputFormat};

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(addr) = args.listen {
        config.transport.address = addr;
        config.transport.mode = TransportMode::Listen;
    } else if let Some(addr) = args.connect {
        config.transport.address = addr;
        config.transport.mode = TransportMode::Connect;
    }

    let controller = Controller::new(config).map_err(|err| controller_error("invalid configuration", err))?;

    let shutdown = CancellationToken::new();
    let on_interrupt = shutdown.clone();
    install_ctrlc_handler(move || on_interrupt.cancel())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))?;

    info!(
        address = %controller.config().transport.address,
        mode = ?controller.config().transport.mode,
        drivers = controller.config().drivers.len(),
        routes = controller.config().routes.len(),
        "starting controller"
    );
    let report = runtime
        .block_on(controller.run(shutdown))
        .map_err(|err| controller_error("controller stopped", err))?;

    print_report(&report, format);
    Ok(SUCCESS)
}

use crate::cmd::{load_config, CheckArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_check, OutputFormat};

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(Some(&args.config))?;
    print_check(&config, format);
    Ok(SUCCESS)
}

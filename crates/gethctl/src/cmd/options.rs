use gethctl_node::NodeOptions;

use crate::cmd::OptionsArgs;
use crate::exit::{lifecycle_error, CliResult, SUCCESS};
use crate::output::{print_plan, OutputFormat};

pub fn run(args: OptionsArgs, format: OutputFormat) -> CliResult<i32> {
    let options: NodeOptions = args.node.options()?;
    let plan = options
        .resolve()
        .map_err(|err| lifecycle_error("invalid options", err))?;
    print_plan(&plan, format);
    Ok(SUCCESS)
}

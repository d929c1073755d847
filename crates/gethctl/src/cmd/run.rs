use std::time::Duration;

use gethctl_node::Connector;
use tracing::info;

use crate::cmd::{runtime, RunArgs};
use crate::exit::{io_error, lifecycle_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_status, OutputFormat};

const EXIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let options = args.node.options()?;
    let config = args.node.connector_config()?;

    let connector =
        Connector::acquire(config).map_err(|err| lifecycle_error("connector unavailable", err))?;
    connector
        .set_options(options)
        .map_err(|err| lifecycle_error("invalid options", err))?;
    let plan = connector
        .launch_plan()
        .map_err(|err| lifecycle_error("invalid options", err))?;

    let rt = runtime()?;
    rt.block_on(async {
        let handle = connector
            .start()
            .await
            .map_err(|err| lifecycle_error("node failed to start", err))?;
        print_status(&handle, &plan, format);

        let exited = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|err| io_error("failed to wait for ctrl-c", err))?;
                info!("interrupt received, stopping node");
                false
            }
            _ = wait_for_exit(&connector) => true,
        };

        connector.stop().await;
        if exited {
            return Err(CliError::new(FAILURE, "node exited unexpectedly"));
        }
        Ok(SUCCESS)
    })
}

async fn wait_for_exit(connector: &Connector) {
    loop {
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        if !connector.is_running() {
            return;
        }
    }
}

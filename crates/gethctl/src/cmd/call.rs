use gethctl_node::Connector;
use serde_json::Value;

use crate::cmd::{parse_duration, runtime, CallArgs};
use crate::exit::{call_error, lifecycle_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_value, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let params = parse_params(args.params.as_deref())?;
    let options = args.node.options()?;
    let mut config = args.node.connector_config()?;
    if let Some(timeout) = &args.timeout {
        config = config.with_request_timeout(parse_duration(timeout)?);
    }

    let connector =
        Connector::acquire(config).map_err(|err| lifecycle_error("connector unavailable", err))?;
    connector
        .set_options(options)
        .map_err(|err| lifecycle_error("invalid options", err))?;

    let rt = runtime()?;
    let result = rt.block_on(async {
        connector
            .start()
            .await
            .map_err(|err| lifecycle_error("node failed to start", err))?;
        let outcome = connector.call(&args.method, params).await;
        connector.stop().await;
        outcome.map_err(|err| call_error(&format!("{} failed", args.method), err))
    })?;

    print_value(&result, format);
    Ok(SUCCESS)
}

/// Parameters must form a JSON array; omitted means none.
fn parse_params(raw: Option<&str>) -> CliResult<Vec<Value>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(CliError::new(USAGE, "params must be a JSON array")),
        Err(err) => Err(CliError::new(
            USAGE,
            format!("params are not valid JSON: {err}"),
        )),
    }
}

use gethctl_node::{DEFAULT_READY_TIMEOUT, DEFAULT_STOP_TIMEOUT, PRIVATE_NETWORK_ID};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("gethctl {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    let build = [
        ("target", option_env!("GETHCTL_BUILD_TARGET").unwrap_or("unknown")),
        ("profile", option_env!("GETHCTL_BUILD_PROFILE").unwrap_or("unknown")),
        ("git_hash", option_env!("GIT_HASH").unwrap_or("unknown")),
    ];
    for (key, value) in build {
        println!("{key}: {value}");
    }

    println!("ipc_file: {}", gethctl_transport::IPC_FILE_NAME);
    println!("private_network_id: {PRIVATE_NETWORK_ID}");
    println!(
        "decode_timeout: {}s",
        gethctl_frame::DEFAULT_DECODE_TIMEOUT.as_secs()
    );
    println!("ready_timeout: {}s", DEFAULT_READY_TIMEOUT.as_secs());
    println!("stop_timeout: {}s", DEFAULT_STOP_TIMEOUT.as_secs());

    Ok(SUCCESS)
}

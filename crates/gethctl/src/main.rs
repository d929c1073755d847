mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "gethctl", version, about = "Run a local geth node and call it over IPC")]
struct Cli {
    /// How results are printed on stdout. Defaults to pretty on a terminal, json otherwise.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Diagnostic log encoding on stderr.
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Most verbose level logged by gethctl itself.
    #[arg(
        long,
        value_name = "LEVEL",
        env = "GETHCTL_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);
    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);

    let code = cmd::run(cli.command, format).unwrap_or_else(|err| {
        eprintln!("gethctl: {err}");
        err.code
    });
    std::process::exit(code);
}

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use gethctl_node::{ConnectorConfig, NodeOptions, Readiness, DEFAULT_PROBE_INTERVAL};

use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod options;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the node, issue one JSON-RPC call, print the result, stop.
    Call(CallArgs),
    /// Start the node and keep it running until interrupted.
    Run(RunArgs),
    /// Print the command line a start would run.
    Options(OptionsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, format),
        Command::Run(args) => run::run(args, format),
        Command::Options(args) => options::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Node options shared by every subcommand that launches or describes a node.
#[derive(Args, Debug, Default)]
pub struct NodeArgs {
    /// Load node options from a JSON file; flags override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Node binary.
    #[arg(long, env = "GETHCTL_EXECUTABLE", value_name = "PATH")]
    pub executable: Option<PathBuf>,
    /// Node data directory.
    #[arg(long, env = "GETHCTL_DATADIR", value_name = "DIR")]
    pub datadir: Option<PathBuf>,
    /// Directory holding the binary, genesis and password files.
    #[arg(long, value_name = "DIR")]
    pub assets_dir: Option<PathBuf>,
    /// Skip the preset private network flags.
    #[arg(long)]
    pub no_private_net: bool,
    /// Pass --testnet to the node.
    #[arg(long)]
    pub testnet: bool,
    /// Replace the extra flags passed to the node (repeatable).
    #[arg(long = "extra-option", value_name = "FLAG", allow_hyphen_values = true)]
    pub extra_options: Vec<String>,
    /// Sleep this long after spawning instead of probing the endpoint (e.g. 4s).
    #[arg(long, value_name = "DURATION")]
    pub grace_period: Option<String>,
    /// Maximum time to wait for the endpoint to accept connections.
    #[arg(long, value_name = "DURATION", default_value = "30s")]
    pub ready_timeout: String,
}

impl NodeArgs {
    /// Options from the config file, if any, with flags applied on top.
    pub fn options(&self) -> CliResult<NodeOptions> {
        let mut options = match &self.config {
            Some(path) => load_options(path)?,
            None => NodeOptions::default(),
        };
        if let Some(executable) = &self.executable {
            options.executable = Some(executable.clone());
        }
        if let Some(datadir) = &self.datadir {
            options.data_dir = Some(datadir.clone());
        }
        if let Some(assets_dir) = &self.assets_dir {
            options.assets_dir = Some(assets_dir.clone());
        }
        if self.no_private_net {
            options.private_net = false;
        }
        if self.testnet {
            options.test_net = true;
        }
        if !self.extra_options.is_empty() {
            options.extra_options = self.extra_options.clone();
        }
        Ok(options)
    }

    pub fn connector_config(&self) -> CliResult<ConnectorConfig> {
        let readiness = match &self.grace_period {
            Some(period) => Readiness::GracePeriod(parse_duration(period)?),
            None => Readiness::Probe {
                interval: DEFAULT_PROBE_INTERVAL,
                timeout: parse_duration(&self.ready_timeout)?,
            },
        };
        Ok(ConnectorConfig::new().with_readiness(readiness))
    }
}

fn load_options(path: &std::path::Path) -> CliResult<NodeOptions> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("invalid config {}: {err}", path.display()),
        )
    })
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// JSON-RPC method, e.g. eth_accounts.
    pub method: String,
    /// Parameters as a JSON array, e.g. '["0x1", "latest"]'.
    pub params: Option<String>,
    /// Give up on the response after this long (e.g. 10s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,
    #[command(flatten)]
    pub node: NodeArgs,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub node: NodeArgs,
}

#[derive(Args, Debug)]
pub struct OptionsArgs {
    #[command(flatten)]
    pub node: NodeArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start async runtime", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/gethctl-cli-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("4s").unwrap(), Duration::from_secs(4));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = unique_dir("config");
        let config = dir.join("node.json");
        std::fs::write(
            &config,
            r#"{"dataDir": "/from/file", "testNet": true, "extraOptions": ["--ipcdisable"]}"#,
        )
        .unwrap();

        let args = NodeArgs {
            config: Some(config),
            datadir: Some(PathBuf::from("/from/flag")),
            no_private_net: true,
            ..NodeArgs::default()
        };
        let options = args.options().unwrap();
        assert_eq!(options.data_dir, Some(PathBuf::from("/from/flag")));
        assert!(options.test_net);
        assert!(!options.private_net);
        assert_eq!(options.extra_options, vec!["--ipcdisable"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_config_is_data_invalid() {
        let dir = unique_dir("bad-config");
        let config = dir.join("node.json");
        std::fs::write(&config, "{not json").unwrap();

        let args = NodeArgs {
            config: Some(config),
            ..NodeArgs::default()
        };
        assert_eq!(args.options().unwrap_err().code, DATA_INVALID);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn grace_period_flag_selects_fixed_wait() {
        let args = NodeArgs {
            grace_period: Some("4s".into()),
            ready_timeout: "30s".into(),
            ..NodeArgs::default()
        };
        let config = args.connector_config().unwrap();
        assert_eq!(
            config.readiness,
            Readiness::GracePeriod(Duration::from_secs(4))
        );
    }
}

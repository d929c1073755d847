//! Node options and the command line they produce.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use gethctl_transport::Endpoint;
use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, Result};

/// Network id of the preset private network.
pub const PRIVATE_NETWORK_ID: u32 = 777;

/// Flags appended when no extra options are given.
pub const DEFAULT_EXTRA_OPTIONS: [&str; 4] = ["--shh", "--rpc", "--rpccorsdomain", "localhost"];

/// Assets directory relative to the working directory.
pub const DEFAULT_ASSETS_DIR: &str = ".private/assets";

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "geth.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "geth";

/// User-facing node configuration.
///
/// Unset paths are derived from the assets directory at launch time.
/// Field names follow the camelCase keys of JSON config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeOptions {
    /// Node binary. Default: `<assets>/geth`.
    pub executable: Option<PathBuf>,
    /// Data directory. Default: `<assets>/datadir`.
    pub data_dir: Option<PathBuf>,
    /// Directory holding the binary, genesis and password files.
    /// Default: `<cwd>/.private/assets`.
    pub assets_dir: Option<PathBuf>,
    /// Run the preset non-discoverable private network.
    pub private_net: bool,
    /// Append `--testnet`.
    pub test_net: bool,
    /// Flags appended verbatim, in order.
    pub extra_options: Vec<String>,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            executable: None,
            data_dir: None,
            assets_dir: None,
            private_net: true,
            test_net: false,
            extra_options: DEFAULT_EXTRA_OPTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn with_assets_dir(mut self, assets_dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = Some(assets_dir.into());
        self
    }

    pub fn with_private_net(mut self, enabled: bool) -> Self {
        self.private_net = enabled;
        self
    }

    pub fn with_test_net(mut self, enabled: bool) -> Self {
        self.test_net = enabled;
        self
    }

    pub fn with_extra_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Reject malformed values before they reach a launch.
    pub fn validate(&self) -> Result<()> {
        check_path("executable", self.executable.as_deref())?;
        check_path("dataDir", self.data_dir.as_deref())?;
        check_path("assetsDir", self.assets_dir.as_deref())?;
        if let Some(flag) = self.extra_options.iter().find(|f| f.trim().is_empty()) {
            return Err(LifecycleError::InvalidOptions {
                field: "extraOptions",
                reason: format!("empty flag {flag:?}"),
            });
        }
        Ok(())
    }

    /// Derive the launch plan, resolving defaults against the working directory.
    pub fn resolve(&self) -> Result<LaunchPlan> {
        let cwd = std::env::current_dir().map_err(LifecycleError::WorkingDir)?;
        self.resolve_in(&cwd)
    }

    /// Derive the launch plan, resolving defaults against `base`.
    pub fn resolve_in(&self, base: &Path) -> Result<LaunchPlan> {
        self.validate()?;

        let assets = match &self.assets_dir {
            Some(dir) => base.join(dir),
            None => base.join(DEFAULT_ASSETS_DIR),
        };
        let executable = match &self.executable {
            Some(path) => base.join(path),
            None => assets.join(EXECUTABLE_NAME),
        };
        let data_dir = match &self.data_dir {
            Some(path) => base.join(path),
            None => assets.join("datadir"),
        };

        let mut args: Vec<OsString> = vec!["--datadir".into(), data_dir.clone().into()];
        if self.private_net {
            args.push("--genesis".into());
            args.push(assets.join("datadir").join("genesis.json").into());
            args.push("--networkid".into());
            args.push(PRIVATE_NETWORK_ID.to_string().into());
            args.push("--unlock".into());
            args.push("0".into());
            args.push("--password".into());
            args.push(assets.join("password.txt").into());
            args.push("--nodiscover".into());
            args.push("--maxpeers".into());
            args.push("0".into());
        }
        if self.test_net {
            args.push("--testnet".into());
        }
        args.extend(self.extra_options.iter().map(OsString::from));

        Ok(LaunchPlan {
            executable,
            data_dir,
            args,
        })
    }
}

fn check_path(field: &'static str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) if p.as_os_str().is_empty() => Err(LifecycleError::InvalidOptions {
            field,
            reason: "path is empty".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Everything needed to spawn one node process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub executable: PathBuf,
    pub data_dir: PathBuf,
    pub args: Vec<OsString>,
}

impl LaunchPlan {
    /// The IPC endpoint the node will open.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::for_data_dir(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(plan: &LaunchPlan) -> Vec<String> {
        plan.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn defaults_match_private_development_network() {
        let options = NodeOptions::default();
        assert!(options.private_net);
        assert!(!options.test_net);
        assert_eq!(
            options.extra_options,
            vec!["--shh", "--rpc", "--rpccorsdomain", "localhost"]
        );
    }

    #[test]
    #[cfg(unix)]
    fn default_plan_lives_under_assets_dir() {
        let plan = NodeOptions::default().resolve_in(Path::new("/work")).unwrap();
        assert_eq!(plan.executable, PathBuf::from("/work/.private/assets/geth"));
        assert_eq!(plan.data_dir, PathBuf::from("/work/.private/assets/datadir"));
        assert_eq!(
            plan.endpoint().path(),
            Path::new("/work/.private/assets/datadir/geth.ipc")
        );
        assert_eq!(
            args(&plan),
            vec![
                "--datadir",
                "/work/.private/assets/datadir",
                "--genesis",
                "/work/.private/assets/datadir/genesis.json",
                "--networkid",
                "777",
                "--unlock",
                "0",
                "--password",
                "/work/.private/assets/password.txt",
                "--nodiscover",
                "--maxpeers",
                "0",
                "--shh",
                "--rpc",
                "--rpccorsdomain",
                "localhost",
            ]
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_net_without_private_net() {
        let plan = NodeOptions::new()
            .with_private_net(false)
            .with_test_net(true)
            .with_data_dir("/data/chain")
            .with_extra_options(["--fast", "--cache", "512"])
            .resolve_in(Path::new("/work"))
            .unwrap();
        assert_eq!(
            args(&plan),
            vec!["--datadir", "/data/chain", "--testnet", "--fast", "--cache", "512"]
        );
    }

    #[test]
    #[cfg(unix)]
    fn relative_overrides_resolve_against_base() {
        let plan = NodeOptions::new()
            .with_executable("bin/geth")
            .with_assets_dir("assets")
            .with_private_net(false)
            .with_extra_options(Vec::<String>::new())
            .resolve_in(Path::new("/work"))
            .unwrap();
        assert_eq!(plan.executable, PathBuf::from("/work/bin/geth"));
        assert_eq!(plan.data_dir, PathBuf::from("/work/assets/datadir"));
        assert_eq!(args(&plan), vec!["--datadir", "/work/assets/datadir"]);
    }

    #[test]
    fn empty_paths_are_rejected() {
        let err = NodeOptions::new().with_data_dir("").validate().unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidOptions { field: "dataDir", .. }
        ));

        let err = NodeOptions::new()
            .with_extra_options(["--rpc", " "])
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidOptions {
                field: "extraOptions",
                ..
            }
        ));
    }

    #[test]
    fn json_config_fills_missing_fields_with_defaults() {
        let options: NodeOptions =
            serde_json::from_str(r#"{"testNet": true, "dataDir": "/data"}"#).unwrap();
        assert!(options.test_net);
        assert!(options.private_net);
        assert_eq!(options.data_dir, Some(PathBuf::from("/data")));
        assert_eq!(options.extra_options.len(), 4);
    }

    #[test]
    fn json_config_rejects_unknown_fields() {
        let parsed = serde_json::from_str::<NodeOptions>(r#"{"privateNetwork": false}"#);
        assert!(parsed.is_err());
    }
}

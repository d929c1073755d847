//! Spawning and supervising the node process.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;

use tracing::debug;

use crate::error::SpawnError;

/// Future returned by [`ChildProcess::wait`].
pub type WaitFuture<'a> = Pin<Box<dyn Future<Output = io::Result<ProcessExit>> + Send + 'a>>;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code; `None` when the process was ended by a signal.
    pub code: Option<i32>,
}

/// A spawned process.
pub trait ChildProcess: Send {
    /// OS process id, while known.
    fn id(&self) -> Option<u32>;

    /// Ask the process to terminate. Does not wait.
    fn kill(&mut self) -> io::Result<()>;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>>;

    /// Wait for the process to exit.
    fn wait(&mut self) -> WaitFuture<'_>;
}

/// Extension point for how the node process is started.
pub trait ProcessSupervisor: Send + Sync {
    fn spawn(&self, program: &Path, args: &[OsString])
        -> Result<Box<dyn ChildProcess>, SpawnError>;
}

/// Where the node's stdout and stderr go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildOutput {
    #[default]
    Inherit,
    Null,
}

impl ChildOutput {
    fn stdio(self) -> Stdio {
        match self {
            ChildOutput::Inherit => Stdio::inherit(),
            ChildOutput::Null => Stdio::null(),
        }
    }
}

/// Spawns the node with `tokio::process`.
///
/// The child is killed when its handle is dropped.
#[derive(Debug, Clone, Default)]
pub struct TokioSupervisor {
    output: ChildOutput,
}

impl TokioSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, output: ChildOutput) -> Self {
        self.output = output;
        self
    }
}

impl ProcessSupervisor for TokioSupervisor {
    fn spawn(
        &self,
        program: &Path,
        args: &[OsString],
    ) -> Result<Box<dyn ChildProcess>, SpawnError> {
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(self.output.stdio())
            .stderr(self.output.stdio())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Spawn {
                program: program.to_path_buf(),
                source,
            })?;
        debug!(program = %program.display(), pid = ?child.id(), "spawned node process");
        Ok(Box::new(TokioChild(child)))
    }
}

struct TokioChild(tokio::process::Child);

impl ChildProcess for TokioChild {
    fn id(&self) -> Option<u32> {
        self.0.id()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.0.start_kill()
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self
            .0
            .try_wait()?
            .map(|status| ProcessExit { code: status.code() }))
    }

    fn wait(&mut self) -> WaitFuture<'_> {
        Box::pin(async move {
            let status = self.0.wait().await?;
            Ok(ProcessExit {
                code: status.code(),
            })
        })
    }
}

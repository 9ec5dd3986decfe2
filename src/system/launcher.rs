// src/system/launcher.rs

//! Spawning child processes and tracking them until they exit.

use crate::{
    core::{
        environment::{EnvMap, EnvSnapshot},
        platform::Platform,
    },
    system::output_log::{LineMirror, OutputSink},
};
use std::{
    fmt,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    sync::{mpsc, watch},
};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Chunks of the adapter's standard output, in arrival order. The channel
/// closes when the stream reaches end-of-file.
pub type OutputReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// Errors raised while starting a process.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The OS could not start the executable.
    #[error("Could not start '{executable}': {source}")]
    Spawn {
        /// The executable as requested.
        executable: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// The requested working directory does not exist or is not a directory.
    #[error("Could not start '{executable}': working directory '{}' is not a directory", dir.display())]
    WorkingDirectory {
        /// The executable as requested.
        executable: String,
        /// The working directory as requested.
        dir: PathBuf,
    },
    /// A pipe that was requested is missing from the spawned child.
    #[error("'{executable}' started without a captured {stream} pipe.")]
    MissingPipe {
        /// The executable as requested.
        executable: String,
        /// `stdout` or `stderr`.
        stream: &'static str,
    },
}

/// How a process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, when the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number, when the process was killed by one (Unix).
    pub signal: Option<i32>,
}

impl ExitInfo {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Everything needed to start one process.
#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    /// Program name or path; bare names are looked up on the child's `PATH`.
    pub executable: String,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
    /// The complete child environment; nothing else is inherited.
    pub env: EnvMap,
    /// Working directory; inherited from this process when `None`.
    pub cwd: Option<PathBuf>,
}

/// Spawns processes under a fixed platform policy and base environment.
#[derive(Debug, Clone)]
pub struct Launcher {
    platform: Platform,
    base_env: EnvSnapshot,
    sink: Arc<dyn OutputSink>,
}

impl Launcher {
    /// Creates a launcher that applies `platform`'s policy against `base_env`.
    pub fn new(platform: Platform, base_env: EnvSnapshot, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            platform,
            base_env,
            sink,
        }
    }

    /// The platform whose launch policy is applied.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// The environment snapshot overrides are composed against.
    pub fn base_env(&self) -> &EnvSnapshot {
        &self.base_env
    }

    /// Where mirrored output and lifecycle notices go.
    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.sink
    }

    /// Starts the process described by `request` and returns without waiting
    /// for it to become ready.
    ///
    /// Stdin is closed; stdout and stderr are drained by background tasks that
    /// mirror every line to the sink. Stdout chunks are additionally delivered
    /// through the handle's output receiver. Must be called from within a
    /// tokio runtime.
    ///
    /// # Errors
    /// Returns [`LaunchError::WorkingDirectory`] when `cwd` is not an existing
    /// directory, and [`LaunchError::Spawn`] when the OS refuses to start the
    /// executable (not found, permission denied, ...).
    pub fn spawn(&self, request: LaunchRequest) -> Result<ProcessHandle, LaunchError> {
        let LaunchRequest {
            executable,
            args,
            mut env,
            cwd,
        } = request;
        self.platform.apply_launch_policy(&mut env, &self.base_env);

        let mut command = Command::new(&executable);
        command
            .args(&args)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &cwd {
            // A missing directory would otherwise surface as the executable's NotFound.
            if !dir.is_dir() {
                return Err(LaunchError::WorkingDirectory {
                    executable,
                    dir: dir.clone(),
                });
            }
            command.current_dir(dunce::simplified(dir));
        }

        log::debug!("Spawning '{}' with args {:?} in {:?}", executable, args, cwd);
        let mut child = command.spawn().map_err(|e| LaunchError::Spawn {
            executable: executable.clone(),
            source: e,
        })?;
        let pid = child.id();

        let stdout = child.stdout.take().ok_or_else(|| LaunchError::MissingPipe {
            executable: executable.clone(),
            stream: "stdout",
        })?;
        let stderr = child.stderr.take().ok_or_else(|| LaunchError::MissingPipe {
            executable: executable.clone(),
            stream: "stderr",
        })?;

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(stdout, Some(output_tx), LineMirror::new(self.sink.clone())));
        tokio::spawn(pump(stderr, None, LineMirror::new(self.sink.clone())));

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = mpsc::channel(1);
        tokio::spawn(observe_exit(child, kill_rx, exit_tx, self.sink.clone()));

        Ok(ProcessHandle {
            executable,
            pid,
            exit_rx,
            kill_tx,
            output: output_rx,
        })
    }
}

/// A live (or finished) child process.
///
/// The exit state is written exactly once by a background observer; every
/// accessor only reads it. Dropping the handle kills the process if it is
/// still running.
#[derive(Debug)]
pub struct ProcessHandle {
    executable: String,
    pid: Option<u32>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    kill_tx: mpsc::Sender<()>,
    output: OutputReceiver,
}

impl ProcessHandle {
    /// The executable as it was requested.
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// OS process id, as reported at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// `true` until the exit of the process has been observed.
    pub fn is_alive(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    /// How the process ended, once it has.
    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit_rx.borrow()
    }

    /// Requests the process to be killed. Does nothing if it already exited or
    /// a kill is already pending.
    pub fn terminate(&self) {
        if self.is_alive() {
            log::debug!("Terminating '{}' (pid {:?})", self.executable, self.pid);
            // A full channel means a kill request is already queued.
            let _ = self.kill_tx.try_send(());
        }
    }

    /// Waits for the process to exit.
    pub async fn wait(&self) -> ExitInfo {
        let mut rx = self.exit_rx.clone();
        let published = match rx.wait_for(Option::is_some).await {
            Ok(info) => *info,
            // The observer went away without publishing; nothing more will come.
            Err(_) => self.exit_info(),
        };
        published.unwrap_or_default()
    }

    /// The stdout chunk stream consumed by the pattern matcher.
    pub fn output_mut(&mut self) -> &mut OutputReceiver {
        &mut self.output
    }
}

/// Owns the child: waits for it to exit or for a kill request, whichever
/// comes first, then publishes the exit state once.
async fn observe_exit(
    mut child: Child,
    mut kill_rx: mpsc::Receiver<()>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    sink: Arc<dyn OutputSink>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        // Either an explicit request or the handle was dropped.
        _ = kill_rx.recv() => {
            if let Err(e) = child.start_kill() {
                log::warn!("Failed to kill child process {:?}: {}", child.id(), e);
            }
            child.wait().await
        }
    };

    let info = match status {
        Ok(status) => ExitInfo::from_status(status),
        Err(e) => {
            log::warn!("Failed to collect exit status of child process: {}", e);
            ExitInfo::default()
        }
    };

    if let Some(signal) = info.signal {
        sink.append_line(&format!("Adapter terminated by {signal} signal."));
    }
    if let Some(code) = info.code.filter(|&c| c != 0) {
        sink.append_line(&format!("Adapter exit code: {code}."));
    }
    log::debug!("Child process exited: {}", info);

    exit_tx.send_replace(Some(info));
}

/// Drains one pipe, mirroring it to the sink and optionally forwarding chunks.
async fn pump<R>(mut reader: R, mut forward: Option<mpsc::UnboundedSender<Vec<u8>>>, mut mirror: LineMirror)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = buf.get(..n).unwrap_or_default();
                mirror.push(chunk);
                let closed = forward
                    .as_ref()
                    .is_some_and(|tx| tx.send(chunk.to_vec()).is_err());
                if closed {
                    // Nobody is scanning any more; keep mirroring only.
                    forward = None;
                }
            }
            Err(e) => {
                log::warn!("Error reading adapter output: {}", e);
                break;
            }
        }
    }
    mirror.finish();
}

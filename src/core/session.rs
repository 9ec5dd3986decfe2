// src/core/session.rs

//! Starting a debug adapter session.
//!
//! The coordinator reads the launch settings, builds the debugger command line
//! and environment, spawns the process and waits for its port announcement.
//! It adds no recovery of its own: any failure below it reaches the caller
//! unchanged.

use crate::{
    constants::{ADAPTER_MODULE_DIR, DEFAULT_EXECUTABLE, PORT_ANNOUNCEMENT_PATTERN},
    core::{
        environment::{self, EnvMap},
        expander::ExpandError,
        params,
        settings::ConfigSource,
    },
    system::{
        launcher::{ExitInfo, LaunchError, LaunchRequest, Launcher, ProcessHandle},
        matcher::{self, MatchError},
    },
};
use lazy_static::lazy_static;
use regex::bytes::Regex;
use serde_json::{Map, Value};
use std::{
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use uuid::Uuid;

lazy_static! {
    static ref PORT_ANNOUNCEMENT_RE: Regex =
        matcher::compile_pattern(PORT_ANNOUNCEMENT_PATTERN).expect("port announcement regex is valid");
}

/// Everything that can stop a session from starting.
#[derive(Error, Debug)]
pub enum SessionError {
    /// An `executable_env` value could not be expanded.
    #[error(transparent)]
    Expand(#[from] ExpandError),
    /// The debugger could not be started.
    #[error(transparent)]
    Launch(#[from] LaunchError),
    /// The port announcement never arrived.
    #[error(transparent)]
    Match(#[from] MatchError),
    /// A setting has the wrong shape.
    #[error("Invalid '{key}' setting: {reason}")]
    InvalidSetting {
        /// The offending setting.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// The announced port does not fit in 16 bits.
    #[error("Adapter announced an invalid port '{0}'.")]
    InvalidPort(String),
}

/// What the caller supplies for one launch.
#[derive(Debug, Clone, Default)]
pub struct AdapterRequest {
    /// Root of the installation that ships the `adapter` script module.
    pub extension_path: PathBuf,
    /// Working directory of the debugger; inherited when `None`.
    pub workspace_root: Option<PathBuf>,
    /// Session parameters; the configured pass-through settings are added.
    pub params: Map<String, Value>,
    /// Bound on the wait for the port announcement; `None` waits forever.
    pub timeout: Option<Duration>,
}

/// A running adapter and the port it listens on.
#[derive(Debug)]
pub struct AdapterSession {
    id: Uuid,
    port: u16,
    process: ProcessHandle,
}

impl AdapterSession {
    fn new(process: ProcessHandle, port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            port,
            process,
        }
    }

    /// Unique id of this session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Port the adapter announced.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address to connect the debug adapter protocol client to.
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }

    /// `true` until the adapter process has exited.
    pub fn is_alive(&self) -> bool {
        self.process.is_alive()
    }

    /// Kills the adapter; a no-op once it has exited.
    pub fn terminate(&self) {
        self.process.terminate();
    }

    /// Resolves when the adapter process has exited.
    pub async fn wait(&self) -> ExitInfo {
        self.process.wait().await
    }

    /// The underlying process handle.
    pub fn process(&self) -> &ProcessHandle {
        &self.process
    }
}

/// Launches the debugger in TCP session mode and returns once it announced its
/// listening port.
///
/// # Errors
/// Expansion, spawn and matching failures are returned unchanged. If the
/// handshake fails the half-started process is killed when its handle drops.
pub async fn start_debug_adapter(
    config: &dyn ConfigSource,
    request: AdapterRequest,
    launcher: &Launcher,
) -> Result<AdapterSession, SessionError> {
    let AdapterRequest {
        extension_path,
        workspace_root,
        params,
        timeout,
    } = request;

    let executable = executable_setting(config)?;
    let overrides = executable_env_setting(config)?;
    let blob = params::adapter_parameters(params, config);
    let args = adapter_args(&extension_path, &blob);

    let env = environment::compose_environment(launcher.base_env(), &overrides, launcher.platform())?;

    log::debug!("Starting debug adapter '{}'", executable);
    let mut process = launcher.spawn(LaunchRequest {
        executable,
        args,
        env,
        cwd: workspace_root,
    })?;

    let announcement = matcher::wait_for_pattern(&mut process, &PORT_ANNOUNCEMENT_RE, timeout).await?;
    let digits = announcement.get(1).unwrap_or_default();
    let port: u16 = digits
        .parse()
        .map_err(|_| SessionError::InvalidPort(digits.to_string()))?;

    let session = AdapterSession::new(process, port);
    log::info!("Debug adapter session {} listening on {}", session.id(), session.endpoint());
    Ok(session)
}

/// The debugger command line: batch mode, import the adapter module, then
/// start a TCP session on an OS-assigned port with the encoded parameters.
pub fn adapter_args(extension_path: &Path, params_blob: &str) -> Vec<String> {
    let module = extension_path.join(ADAPTER_MODULE_DIR);
    vec![
        "-b".to_string(),
        "-O".to_string(),
        format!("command script import '{}'", module.display()),
        "-O".to_string(),
        format!("script adapter.run_tcp_session(0, '{params_blob}')"),
    ]
}

fn executable_setting(config: &dyn ConfigSource) -> Result<String, SessionError> {
    match config.get_or("executable", Value::from(DEFAULT_EXECUTABLE)) {
        Value::String(path) => Ok(shellexpand::tilde(&path).into_owned()),
        other => Err(SessionError::InvalidSetting {
            key: "executable",
            reason: format!("expected a string, found {other}"),
        }),
    }
}

fn executable_env_setting(config: &dyn ConfigSource) -> Result<EnvMap, SessionError> {
    let table = match config.get_or("executable_env", Value::Object(Map::new())) {
        Value::Object(table) => table,
        other => {
            return Err(SessionError::InvalidSetting {
                key: "executable_env",
                reason: format!("expected a table, found {other}"),
            });
        }
    };

    table
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(s) => Ok((name, s)),
            other => Err(SessionError::InvalidSetting {
                key: "executable_env",
                reason: format!("value of '{name}' must be a string, found {other}"),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{environment::EnvSnapshot, platform::Platform};
    use crate::system::output_log::MemorySink;
    use serde_json::json;
    use std::sync::Arc;

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn test_launcher() -> Launcher {
        Launcher::new(Platform::new("linux"), EnvSnapshot::capture(), Arc::new(MemorySink::new()))
    }

    #[test]
    fn test_adapter_args_layout() {
        let args = adapter_args(Path::new("/ext"), "eyJ9");
        assert_eq!(
            args,
            vec![
                "-b",
                "-O",
                "command script import '/ext/adapter'",
                "-O",
                "script adapter.run_tcp_session(0, 'eyJ9')",
            ]
        );
    }

    #[test]
    fn test_executable_defaults_to_lldb() {
        assert_eq!(executable_setting(&Map::new()).unwrap(), "lldb");
        assert_eq!(executable_setting(&config(json!({"executable": "lldb-18"}))).unwrap(), "lldb-18");
        assert!(matches!(
            executable_setting(&config(json!({"executable": 5}))),
            Err(SessionError::InvalidSetting { key: "executable", .. })
        ));
    }

    #[test]
    fn test_executable_env_must_hold_strings() {
        let ok = executable_env_setting(&config(json!({"executable_env": {"A": "1"}}))).unwrap();
        assert_eq!(ok.get("A").map(String::as_str), Some("1"));
        assert!(executable_env_setting(&Map::new()).unwrap().is_empty());

        let err = executable_env_setting(&config(json!({"executable_env": {"A": 1}}))).unwrap_err();
        assert!(err.to_string().contains("'A'"));
        assert!(executable_env_setting(&config(json!({"executable_env": "A=1"}))).is_err());
    }

    #[tokio::test]
    async fn test_unknown_tag_fails_before_anything_is_spawned() {
        let cfg = config(json!({
            "executable": "/nonexistent/never-spawned",
            "executable_env": {"X": "${config:foo}"},
        }));
        let result = start_debug_adapter(&cfg, AdapterRequest::default(), &test_launcher()).await;
        assert!(matches!(result, Err(SessionError::Expand(ExpandError::UnknownTag { .. }))));
    }

    #[tokio::test]
    async fn test_missing_executable_propagates_spawn_error() {
        let cfg = config(json!({"executable": "/nonexistent/lldb"}));
        let result = start_debug_adapter(&cfg, AdapterRequest::default(), &test_launcher()).await;
        match result {
            Err(SessionError::Launch(LaunchError::Spawn { executable, .. })) => {
                assert_eq!(executable, "/nonexistent/lldb");
            }
            other => panic!("expected a spawn error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    mod fake_adapter {
        use super::*;
        use base64::{Engine as _, engine::general_purpose::STANDARD};
        use std::{fs, os::unix::fs::PermissionsExt};
        use tempfile::TempDir;

        /// Writes an executable shell script standing in for the debugger.
        fn script(dir: &TempDir, body: &str) -> String {
            let path = dir.path().join("fake-lldb");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path.display().to_string()
        }

        fn request(dir: &TempDir, timeout_ms: u64) -> AdapterRequest {
            AdapterRequest {
                extension_path: dir.path().to_path_buf(),
                workspace_root: Some(dir.path().to_path_buf()),
                params: Map::new(),
                timeout: Some(Duration::from_millis(timeout_ms)),
            }
        }

        #[tokio::test]
        async fn test_session_reports_announced_port() {
            let dir = tempfile::tempdir().unwrap();
            let exe = script(&dir, "echo 'Listening on port 4711'\nexec sleep 30");
            let cfg = config(json!({"executable": exe}));

            let session = start_debug_adapter(&cfg, request(&dir, 10_000), &test_launcher()).await.unwrap();

            assert_eq!(session.port(), 4711);
            assert_eq!(session.endpoint().to_string(), "127.0.0.1:4711");
            assert!(session.is_alive());

            session.terminate();
            session.wait().await;
            assert!(!session.is_alive());
            session.terminate();
        }

        #[tokio::test]
        async fn test_arguments_environment_and_blob_reach_the_adapter() {
            let dir = tempfile::tempdir().unwrap();
            // Echo what we were given back on stdout so the test can inspect it.
            let exe = script(
                &dir,
                "printf '%s|%s|%s\\n' \"$3\" \"$5\" \"$LAUNCH_TEST_VAR\"\n\
                 echo 'Listening on port 1'\nexec sleep 30",
            );
            let cfg = config(json!({
                "executable": exe,
                "executable_env": {"LAUNCH_TEST_VAR": "pre-${env:LAUNCH_TEST_MISSING}-post"},
                "logLevel": "debug",
            }));
            let mut req = request(&dir, 10_000);
            req.params.insert("program".to_string(), json!("a.out"));

            let sink = Arc::new(MemorySink::new());
            let launcher = Launcher::new(Platform::new("linux"), EnvSnapshot::capture(), sink.clone());
            let session = start_debug_adapter(&cfg, req, &launcher).await.unwrap();
            assert_eq!(session.port(), 1);

            let first = sink
                .lines()
                .into_iter()
                .find(|l| l.contains('|'))
                .expect("the fake adapter echoes its inputs before announcing");
            let mut parts = first.split('|');
            let import = parts.next().unwrap();
            let start = parts.next().unwrap();
            let var = parts.next().unwrap();

            assert_eq!(import, format!("command script import '{}'", dir.path().join("adapter").display()));
            assert_eq!(var, "pre--post");

            let blob = start
                .strip_prefix("script adapter.run_tcp_session(0, '")
                .and_then(|s| s.strip_suffix("')"))
                .unwrap();
            let decoded: Value = serde_json::from_slice(&STANDARD.decode(blob).unwrap()).unwrap();
            assert_eq!(decoded, json!({"program": "a.out", "logLevel": "debug"}));

            session.terminate();
        }

        #[tokio::test]
        async fn test_early_exit_is_no_match_with_output() {
            let dir = tempfile::tempdir().unwrap();
            let exe = script(&dir, "echo 'error: could not import adapter'\nexit 1");
            let cfg = config(json!({"executable": exe}));

            match start_debug_adapter(&cfg, request(&dir, 10_000), &test_launcher()).await {
                Err(SessionError::Match(MatchError::NoMatch { output, exit })) => {
                    assert!(output.contains("could not import adapter"));
                    assert_eq!(exit.and_then(|e| e.code), Some(1));
                }
                other => panic!("expected NoMatch, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_silent_adapter_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let exe = script(&dir, "exec sleep 30");
            let cfg = config(json!({"executable": exe}));

            let result = start_debug_adapter(&cfg, request(&dir, 50), &test_launcher()).await;
            assert!(matches!(result, Err(SessionError::Match(MatchError::Timeout { .. }))));
        }

        #[tokio::test]
        async fn test_out_of_range_port_is_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let exe = script(&dir, "echo 'Listening on port 99999'\nexec sleep 30");
            let cfg = config(json!({"executable": exe}));

            let result = start_debug_adapter(&cfg, request(&dir, 10_000), &test_launcher()).await;
            assert!(matches!(result, Err(SessionError::InvalidPort(p)) if p == "99999"));
        }
    }
}

//! SSH-backed remote executor.
//!
//! Scripts run as `ssh ... user@addr <script_dir>/<script> <args>`; files are
//! streamed over stdin into `mkdir -p <dir> && cat > <path>`. The per-call
//! timeout and operator cancellation both stop the local ssh process only;
//! the router is not told to abort.
//!
//! Every remote command first echoes [`SESSION_MARKER`] to stderr. Seeing it
//! means the session was up and carrying the command, which separates
//! connection-setup failures from failures on an established session.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vr_types::{ConfigItem, ExecutionResult, RouterTarget};

use crate::envelope::{InFlightBatch, SequenceRegistry};
use crate::error::{TransportError, TransportResult};
use crate::executor::RemoteExecutor;
use crate::shell::{self, shellquote, StderrMarker};

/// Exit status ssh uses for its own (connection) errors.
const SSH_CONNECTION_ERROR: i32 = 255;

/// Printed on stderr by the remote shell before the command runs.
pub const SESSION_MARKER: &str = "vr-dispatch-session-open";

/// SSH transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_binary")]
    pub ssh_binary: String,

    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,

    #[serde(default = "default_ssh_key_path")]
    pub ssh_key_path: String,

    /// Directory on the router holding the scripts.
    #[serde(default = "default_script_dir")]
    pub script_dir: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_ssh_binary() -> String {
    "/usr/bin/ssh".to_string()
}

fn default_ssh_port() -> u16 {
    3922
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_key_path() -> String {
    "/root/.ssh/id_rsa.cloud".to_string()
}

fn default_script_dir() -> String {
    vr_types::VR_SCRIPT_DIR.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            ssh_binary: default_ssh_binary(),
            ssh_port: default_ssh_port(),
            ssh_user: default_ssh_user(),
            ssh_key_path: default_ssh_key_path(),
            script_dir: default_script_dir(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Executes config items on routers over SSH.
pub struct SshExecutor {
    config: SshConfig,
    sequences: SequenceRegistry,
    cancellations: DashMap<String, CancellationToken>,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            sequences: SequenceRegistry::new(),
            cancellations: DashMap::new(),
        }
    }

    /// Cancels every operation currently in flight for `target`.
    ///
    /// Returns false if nothing had been started for the target since the
    /// last cancellation.
    pub fn cancel_target(&self, target: &str) -> bool {
        match self.cancellations.remove(target) {
            Some((_, token)) => {
                info!(router = %target, "Cancelling in-flight operations");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn cancellation_token(&self, target: &str) -> CancellationToken {
        self.cancellations
            .entry(target.to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Builds the ssh argument vector for running `remote_command` on `target`.
    pub fn ssh_args(&self, target: &RouterTarget, remote_command: &str) -> Vec<String> {
        vec![
            "-p".to_string(),
            self.config.ssh_port.to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-i".to_string(),
            self.config.ssh_key_path.clone(),
            format!("{}@{}", self.config.ssh_user, target.access_ip),
            remote_command.to_string(),
        ]
    }

    /// Remote command line and stdin for an item.
    pub fn remote_command<'a>(&self, item: &'a ConfigItem) -> (String, Option<&'a str>) {
        match item {
            ConfigItem::Script { script, args } => {
                let line = format!("{}/{} {}", self.config.script_dir, script, args);
                (line.trim_end().to_string(), None)
            }
            ConfigItem::File {
                path, contents, ..
            } => {
                let destination = item.destination().unwrap_or_default();
                (
                    format!(
                        "mkdir -p {} && cat > {}",
                        shellquote(path),
                        shellquote(&destination)
                    ),
                    Some(contents.as_str()),
                )
            }
        }
    }

    fn envelope(
        &self,
        target: &RouterTarget,
        sequence: u64,
        started: Instant,
        marker: &StderrMarker,
    ) -> InFlightBatch {
        InFlightBatch::new(target.name.clone(), sequence, started.elapsed())
            .with_connection_active(marker.seen())
    }
}

/// Maps an ssh connection error onto setup vs in-use failure.
///
/// `session_started` is whether the remote shell got as far as running the
/// command.
pub fn classify_connection_failure(
    target: &str,
    stderr: &str,
    session_started: bool,
) -> TransportError {
    if session_started {
        TransportError::connection_in_use(target, stderr)
    } else {
        TransportError::connection_setup(target, stderr)
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn apply(
        &self,
        target: &RouterTarget,
        item: &ConfigItem,
        timeout: Duration,
    ) -> TransportResult<ExecutionResult> {
        let (remote_command, stdin) = self.remote_command(item);
        let marker = StderrMarker::new(SESSION_MARKER);
        let args = self.ssh_args(
            target,
            &format!("echo {} >&2; {}", marker.line(), remote_command),
        );
        let sequence = self.sequences.next(&target.name);
        let token = self.cancellation_token(&target.name);
        let started = Instant::now();

        debug!(router = %target, sequence, item = %item, "Applying config item");

        let outcome = tokio::select! {
            res = tokio::time::timeout(
                timeout,
                shell::exec(&self.config.ssh_binary, &args, stdin, Some(&marker)),
            ) => res,
            _ = token.cancelled() => {
                let batch = self.envelope(target, sequence, started, &marker);
                warn!(
                    router = %target,
                    sequence,
                    connection_active = batch.connection_active,
                    "Operation cancelled"
                );
                return Err(TransportError::OperationCancelled(batch));
            }
        };

        let result = match outcome {
            Ok(result) => result?,
            Err(_) => {
                let batch = self.envelope(target, sequence, started, &marker);
                warn!(
                    router = %target,
                    sequence,
                    timeout_secs = timeout.as_secs(),
                    connection_active = batch.connection_active,
                    "Operation timed out"
                );
                return Err(TransportError::OperationTimeout(batch));
            }
        };

        if result.exit_code == SSH_CONNECTION_ERROR {
            return Err(classify_connection_failure(
                &target.name,
                &result.stderr,
                marker.seen(),
            ));
        }

        if result.success() {
            Ok(ExecutionResult::ok(result.stdout))
        } else {
            Ok(ExecutionResult::failed(result.combined_output()))
        }
    }
}

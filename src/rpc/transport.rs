/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Errors raised while talking to the child process.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server program could not be launched.
    #[error("Failed to spawn server {program}: {source}")]
    Spawn {
        /// Program that failed to launch.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A standard stream was not captured at spawn time.
    #[error("Server {0} was not captured")]
    MissingPipe(&'static str),

    /// stdin has already been closed on our side.
    #[error("Server stdin is closed")]
    InputClosed,

    /// Writing or flushing stdin failed (typically a broken pipe).
    #[error("Write to server stdin failed: {0}")]
    Write(#[source] std::io::Error),

    /// The request could not be serialized.
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of asking the child to exit gracefully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The terminate signal was delivered.
    Requested,
    /// The child had already exited; carries its status when known.
    AlreadyExited(Option<ExitStatus>),
    /// The signal could not be delivered.
    Failed(String),
}

/// A server process with piped, line-oriented standard streams.
///
/// stdout is handed out once via [`ChildTransport::take_stdout`] for the
/// output reader. stderr is drained in the background from the moment the
/// child starts, so a chatty server never blocks on a full pipe.
pub struct ChildTransport {
    program: String,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Option<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    child: Child,
}

impl ChildTransport {
    /// Spawns the server process and starts the stderr collector.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be launched.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, TransportError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(TransportError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(TransportError::MissingPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(TransportError::MissingPipe("stderr"))?;

        debug!("Spawned server {} (pid {:?})", program, child.id());

        Ok(Self {
            program: program.to_string(),
            stdin: Mutex::new(Some(stdin)),
            stdout: Some(stdout),
            stderr: Some(tokio::spawn(collect_stderr(stderr))),
            child,
        })
    }

    /// Name of the launched program.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// OS process id, or `None` once the exit status has been collected.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Takes the child's stdout. Returns `None` after the first call.
    pub const fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Takes the stderr collector. Resolves to everything the child wrote to
    /// stderr once the stream closes.
    pub const fn take_stderr(&mut self) -> Option<JoinHandle<String>> {
        self.stderr.take()
    }

    /// Writes one line followed by `\n` and flushes immediately.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InputClosed`] after [`Self::close_input`], or
    /// [`TransportError::Write`] if the pipe is broken.
    pub async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(TransportError::InputClosed)?;

        trace!("Sending: {}", line);

        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(TransportError::Write)?;
        stdin.write_all(b"\n").await.map_err(TransportError::Write)?;
        stdin.flush().await.map_err(TransportError::Write)?;

        Ok(())
    }

    /// Closes stdin, signalling end of input. Returns `false` if it was
    /// already closed.
    ///
    /// The handle is released even when the final flush fails.
    ///
    /// # Errors
    ///
    /// Returns the flush/shutdown error, which usually means the child has
    /// already exited.
    pub async fn close_input(&self) -> std::io::Result<bool> {
        let Some(mut stdin) = self.stdin.lock().await.take() else {
            return Ok(false);
        };
        stdin.shutdown().await?;
        Ok(true)
    }

    /// Asks the child to exit.
    ///
    /// On Unix this sends `SIGTERM` through the `kill` utility; elsewhere
    /// there is no graceful signal and the child is killed outright.
    pub async fn terminate(&mut self) -> Termination {
        match self.child.try_wait() {
            Ok(Some(status)) => return Termination::AlreadyExited(Some(status)),
            Ok(None) => {}
            Err(e) => warn!("Failed to poll server status: {}", e),
        }

        let Some(pid) = self.child.id() else {
            return Termination::AlreadyExited(None);
        };

        self.send_terminate(pid).await
    }

    #[cfg(unix)]
    async fn send_terminate(&mut self, pid: u32) -> Termination {
        // unsafe is forbidden, so signal through the `kill` utility
        let status = Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Termination::Requested,
            Ok(status) => match self.child.try_wait() {
                Ok(Some(exit)) => Termination::AlreadyExited(Some(exit)),
                _ => Termination::Failed(format!("kill -TERM {pid} exited with {status}")),
            },
            Err(e) => Termination::Failed(format!("failed to run kill: {e}")),
        }
    }

    #[cfg(not(unix))]
    async fn send_terminate(&mut self, _pid: u32) -> Termination {
        match self.child.start_kill() {
            Ok(()) => Termination::Requested,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
                Termination::AlreadyExited(None)
            }
            Err(e) => Termination::Failed(e.to_string()),
        }
    }

    /// Sends the forceful kill signal without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be sent.
    pub fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    /// Waits for the child to exit. Cancel-safe.
    ///
    /// # Errors
    ///
    /// Returns an error if the exit status cannot be collected.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }
}

/// Reads stderr to the end. Invalid UTF-8 is replaced rather than rejected.
async fn collect_stderr(mut stderr: ChildStderr) -> String {
    let mut bytes = Vec::new();
    if let Err(e) = stderr.read_to_end(&mut bytes).await {
        warn!("Error reading server stderr: {}", e);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

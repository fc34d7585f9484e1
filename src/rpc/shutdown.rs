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

//! Bounded-time teardown of a server process.
//!
//! The sequence is: close stdin, request termination, wait, kill if needed,
//! join the output reader, then collect trailing stderr. Each step logs and
//! records its own failure and the next step runs regardless. No step can
//! block longer than its configured timeout.

use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::transport::{ChildTransport, Termination};

/// Upper bounds for each waiting step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimeouts {
    /// Wait for exit after the graceful terminate request.
    pub terminate: Duration,
    /// Wait for exit after the forceful kill.
    pub kill: Duration,
    /// Wait for the output reader to finish.
    pub reader_join: Duration,
    /// Pause before collecting stderr so final writes can land.
    pub stderr_settle: Duration,
    /// Wait for the stderr collector to finish.
    pub stderr: Duration,
}

impl Default for ShutdownTimeouts {
    fn default() -> Self {
        Self {
            terminate: Duration::from_secs(5),
            kill: Duration::from_secs(2),
            reader_join: Duration::from_secs(5),
            stderr_settle: Duration::from_millis(100),
            stderr: Duration::from_secs(2),
        }
    }
}

/// Outcome of closing the server's stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOutcome {
    /// stdin was open and has been closed.
    Closed,
    /// stdin had already been closed.
    AlreadyClosed,
    /// Closing failed (the child may already be gone).
    Failed(String),
}

/// How the server process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited on its own or after the terminate request.
    Exited(ExitStatus),
    /// Exited after the forceful kill.
    Killed(ExitStatus),
    /// Still running after the kill timeout.
    Unresponsive,
    /// The exit status could not be collected.
    WaitFailed(String),
}

/// Per-step record of a shutdown run.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// Result of closing stdin.
    pub input: InputOutcome,
    /// Result of the graceful terminate request.
    pub termination: Termination,
    /// How the process ended.
    pub exit: ExitOutcome,
    /// Whether the forceful kill was issued. It is issued at most once.
    pub kill_issued: bool,
    /// Time spent requesting termination and waiting for exit.
    pub process_elapsed: Duration,
    /// Whether the output reader finished within its timeout.
    pub reader_finished: bool,
    /// Trimmed trailing stderr, if the server wrote any.
    pub stderr: Option<String>,
}

impl ShutdownReport {
    /// The collected exit status, if the process was seen to exit.
    #[must_use]
    pub const fn exit_status(&self) -> Option<ExitStatus> {
        match self.exit {
            ExitOutcome::Exited(status) | ExitOutcome::Killed(status) => Some(status),
            ExitOutcome::Unresponsive | ExitOutcome::WaitFailed(_) => None,
        }
    }

    /// The exit code, if the process exited normally rather than by signal.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_status().and_then(|status| status.code())
    }
}

/// Runs the shutdown steps in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShutdownSequencer {
    timeouts: ShutdownTimeouts,
}

impl ShutdownSequencer {
    /// Creates a sequencer with the given bounds.
    #[must_use]
    pub const fn new(timeouts: ShutdownTimeouts) -> Self {
        Self { timeouts }
    }

    /// Tears the server down. Never fails; every problem ends up in the
    /// returned report and the log.
    pub async fn run(
        &self,
        transport: &mut ChildTransport,
        reader: Option<JoinHandle<()>>,
    ) -> ShutdownReport {
        let input = Self::close_input(transport).await;

        let started = Instant::now();
        let termination = Self::request_termination(transport).await;
        let (exit, kill_issued) = self.await_exit(transport).await;
        let process_elapsed = started.elapsed();

        let reader_finished = self.drain_reader(reader).await;
        let stderr = self.drain_stderr(transport).await;

        ShutdownReport {
            input,
            termination,
            exit,
            kill_issued,
            process_elapsed,
            reader_finished,
            stderr,
        }
    }

    async fn close_input(transport: &ChildTransport) -> InputOutcome {
        info!("Closing stdin of {}", transport.program());
        match transport.close_input().await {
            Ok(true) => InputOutcome::Closed,
            Ok(false) => {
                debug!("Server stdin was already closed");
                InputOutcome::AlreadyClosed
            }
            Err(e) => {
                warn!("Error closing server stdin (might be ok): {}", e);
                InputOutcome::Failed(e.to_string())
            }
        }
    }

    async fn request_termination(transport: &mut ChildTransport) -> Termination {
        info!("Requesting server termination");
        let termination = transport.terminate().await;
        match &termination {
            Termination::Requested => debug!("Terminate signal sent"),
            Termination::AlreadyExited(_) => info!("Server process already exited"),
            Termination::Failed(reason) => warn!("Error during terminate: {}", reason),
        }
        termination
    }

    /// Waits for exit, escalating to a single kill on timeout.
    async fn await_exit(&self, transport: &mut ChildTransport) -> (ExitOutcome, bool) {
        info!(
            "Waiting for server process to exit (max {:?})",
            self.timeouts.terminate
        );

        match timeout(self.timeouts.terminate, transport.wait()).await {
            Ok(Ok(status)) => {
                info!("Server process exited with {}", status);
                return (ExitOutcome::Exited(status), false);
            }
            Ok(Err(e)) => {
                error!("Error waiting for server process: {}", e);
                return (ExitOutcome::WaitFailed(e.to_string()), false);
            }
            Err(_) => warn!("Server process did not terminate gracefully, killing"),
        }

        if let Err(e) = transport.start_kill() {
            warn!("Error sending kill: {}", e);
        }

        let exit = match timeout(self.timeouts.kill, transport.wait()).await {
            Ok(Ok(status)) => {
                info!("Server process killed and exited with {}", status);
                ExitOutcome::Killed(status)
            }
            Ok(Err(e)) => {
                error!("Error waiting for killed server process: {}", e);
                ExitOutcome::WaitFailed(e.to_string())
            }
            Err(_) => {
                error!("Server process failed to exit even after kill");
                ExitOutcome::Unresponsive
            }
        };

        (exit, true)
    }

    /// Joins the reader within the timeout. A reader that overruns is aborted.
    async fn drain_reader(&self, reader: Option<JoinHandle<()>>) -> bool {
        let Some(mut handle) = reader else {
            return true;
        };

        info!(
            "Waiting for output reader to finish (max {:?})",
            self.timeouts.reader_join
        );

        match timeout(self.timeouts.reader_join, &mut handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Output reader ended abnormally: {}", e);
                true
            }
            Err(_) => {
                warn!("Output reader still running after timeout");
                handle.abort();
                false
            }
        }
    }

    async fn drain_stderr(&self, transport: &mut ChildTransport) -> Option<String> {
        tokio::time::sleep(self.timeouts.stderr_settle).await;

        let mut handle = transport.take_stderr()?;

        let text = match timeout(self.timeouts.stderr, &mut handle).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Error reading final server stderr: {}", e);
                return None;
            }
            Err(_) => {
                warn!("Server stderr still open after timeout");
                handle.abort();
                return None;
            }
        };

        let text = text.trim();
        if text.is_empty() {
            info!("No final stderr output detected");
            return None;
        }

        info!("--- Final server stderr output ---\n{}\n----------------------------------", text);
        Some(text.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use super::*;

    fn quick() -> ShutdownTimeouts {
        ShutdownTimeouts {
            terminate: Duration::from_millis(500),
            kill: Duration::from_secs(2),
            reader_join: Duration::from_secs(2),
            stderr_settle: Duration::from_millis(10),
            stderr: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_cat_exits_on_closed_stdin() {
        let mut transport = ChildTransport::spawn("cat", &[]).unwrap();
        let report = ShutdownSequencer::new(quick()).run(&mut transport, None).await;

        assert_eq!(report.input, InputOutcome::Closed);
        assert!(!report.kill_issued);
        assert!(report.exit_status().is_some());
        assert!(report.reader_finished);
        assert_eq!(report.stderr, None);
    }

    #[tokio::test]
    async fn test_reader_overrun_is_aborted() {
        let mut transport = ChildTransport::spawn("cat", &[]).unwrap();
        let stuck = tokio::spawn(std::future::pending::<()>());

        let timeouts = ShutdownTimeouts {
            reader_join: Duration::from_millis(50),
            ..quick()
        };
        let report = ShutdownSequencer::new(timeouts)
            .run(&mut transport, Some(stuck))
            .await;

        assert!(!report.reader_finished);
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = ShutdownTimeouts::default();
        assert_eq!(timeouts.terminate, Duration::from_secs(5));
        assert_eq!(timeouts.kill, Duration::from_secs(2));
        assert_eq!(timeouts.reader_join, Duration::from_secs(5));
    }
}

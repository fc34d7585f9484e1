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

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::protocol::{RequestEncoder, RequestId};
use super::reader::{self, ReaderEvent};
use super::shutdown::{ShutdownReport, ShutdownSequencer, ShutdownTimeouts};
use super::transport::{ChildTransport, TransportError};

/// A request that could not be delivered.
#[derive(Debug, Error)]
#[error("Failed to send request (id: {id}): {source}")]
pub struct SendError {
    /// Id allocated for the request. It is not reused.
    pub id: RequestId,
    /// Why delivery failed.
    #[source]
    pub source: TransportError,
}

/// Line-delimited JSON-RPC client for a server running as a child process.
///
/// Requests go out on the child's stdin. Everything the child prints on
/// stdout is forwarded, uncorrelated, to the receiver returned by
/// [`RpcClient::take_events`].
pub struct RpcClient {
    encoder: RequestEncoder,
    transport: ChildTransport,
    reader: Option<JoinHandle<()>>,
    events: Option<UnboundedReceiver<ReaderEvent>>,
}

impl RpcClient {
    /// Spawns the server process and starts the output reader task.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be launched.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, TransportError> {
        info!("Starting server process: {} {}", program, args.join(" "));

        let mut transport = ChildTransport::spawn(program, args)?;
        let stdout = transport
            .take_stdout()
            .ok_or(TransportError::MissingPipe("stdout"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = reader::spawn_reader(stdout, tx);

        Ok(Self {
            encoder: RequestEncoder::new(),
            transport,
            reader: Some(reader),
            events: Some(rx),
        })
    }

    /// Takes the receiver for server output. Returns `None` after the first call.
    ///
    /// The channel closes once the reader task has finished.
    pub const fn take_events(&mut self) -> Option<UnboundedReceiver<ReaderEvent>> {
        self.events.take()
    }

    /// OS process id of the server while it is running.
    #[must_use]
    pub fn server_pid(&self) -> Option<u32> {
        self.transport.id()
    }

    /// Sends one request and returns its id.
    ///
    /// Each call allocates exactly one id, even when delivery fails. Failures
    /// are logged here; the caller decides whether to carry on.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] if the request could not be encoded or written.
    pub async fn send(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<RequestId, SendError> {
        let (id, line) = self.encoder.encode(method, params);

        let result = match line {
            Ok(line) => {
                info!("Client request (id: {}): {}", id, line);
                self.transport.write_line(&line).await
            }
            Err(e) => Err(TransportError::from(e)),
        };

        match result {
            Ok(()) => Ok(id),
            Err(source) => {
                let err = SendError { id, source };
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// Closes the server's stdin without tearing the process down.
    ///
    /// Later calls to [`Self::send`] fail with [`TransportError::InputClosed`].
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the final flush.
    pub async fn close_input(&self) -> std::io::Result<bool> {
        self.transport.close_input().await
    }

    /// Runs the shutdown sequence and consumes the client.
    pub async fn shutdown(mut self, timeouts: ShutdownTimeouts) -> ShutdownReport {
        info!("Starting client cleanup");
        ShutdownSequencer::new(timeouts)
            .run(&mut self.transport, self.reader.take())
            .await
    }
}

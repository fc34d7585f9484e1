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

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Something the output reader observed on the server's stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    /// One line of output, without its terminator.
    Line(String),
    /// The stream reached end of file. Sent exactly once.
    Closed,
    /// Reading failed; the reader has stopped.
    Failed(String),
}

/// Spawns the background task that reads lines from `stream` until it closes.
pub fn spawn_reader<R>(stream: R, sink: UnboundedSender<ReaderEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(read_lines(stream, sink))
}

/// Reads lines until end of stream or the first error.
///
/// Every line is logged and forwarded to `sink`. Nothing here is matched
/// back to request ids. Errors are logged and end the loop; they are never
/// propagated. Events are discarded once the receiver has been dropped.
pub async fn read_lines<R>(stream: R, sink: UnboundedSender<ReaderEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!("Server response: {}", line);
                let _ = sink.send(ReaderEvent::Line(line));
            }
            Ok(None) => {
                info!("Server stdout pipe closed");
                let _ = sink.send(ReaderEvent::Closed);
                break;
            }
            Err(e) => {
                error!("Error reading server output: {}", e);
                let _ = sink.send(ReaderEvent::Failed(e.to_string()));
                break;
            }
        }
    }

    debug!("Output reader finished");
}

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// High-level client tying the transport, reader and shutdown together.
pub mod client;
/// JSON-RPC message types and the request encoder.
pub mod protocol;
/// Background reader for the server's stdout.
pub mod reader;
/// Bounded-time teardown of the server process.
pub mod shutdown;
/// Child process with piped standard streams.
pub mod transport;

pub use client::{RpcClient, SendError};
pub use protocol::{RequestEncoder, RequestId, RequestMessage, ResponseError, ResponseMessage};
pub use reader::ReaderEvent;
pub use shutdown::{
    ExitOutcome, InputOutcome, ShutdownReport, ShutdownSequencer, ShutdownTimeouts,
};
pub use transport::{ChildTransport, Termination, TransportError};

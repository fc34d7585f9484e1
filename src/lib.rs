// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! rpcpipe is a line-delimited JSON-RPC client for servers that speak over stdio.
//!
//! It launches the server as a child process, writes one request per line to
//! its stdin, streams every line the server prints, and tears the process down
//! within a bounded time budget.

/// Terminal output helpers.
pub mod cli;
/// Configuration for the server command, pacing and shutdown timeouts.
pub mod config;
/// Client, transport, reader and shutdown sequencing.
pub mod rpc;

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests for the rpcpipe binary.
//!
//! Runs the CLI against the bundled demo server with pacing turned down so
//! the scripted session finishes quickly.

use std::process::{Command, Output};

use anyhow::{Context, Result};

fn demo_server() -> &'static str {
    env!("CARGO_BIN_EXE_rpcpipe-demo-server")
}

/// Runs rpcpipe with fast pacing and an isolated user config directory.
fn run_rpcpipe(args: &[&str], startup_delay_ms: u64) -> Result<Output> {
    let config_home = tempfile::tempdir()?;

    Command::new(env!("CARGO_BIN_EXE_rpcpipe"))
        .args(args)
        .arg("--nocolor")
        .env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG")
        .env("RPCPIPE_PACING__STARTUP_DELAY_MS", startup_delay_ms.to_string())
        .env("RPCPIPE_PACING__REQUEST_DELAY_MS", "50")
        .env("RPCPIPE_PACING__SETTLE_DELAY_MS", "300")
        .env("RPCPIPE_SHUTDOWN__TERMINATE_TIMEOUT_MS", "2000")
        .env("RPCPIPE_SHUTDOWN__STDERR_SETTLE_MS", "20")
        .output()
        .context("failed to run rpcpipe")
}

#[test]
fn test_demo_session() -> Result<()> {
    let output = run_rpcpipe(&["--server", demo_server()], 100)?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("Client Request (ID: 0): initialize"));
    assert!(stdout.contains("Client Request (ID: 1): tool/run"));
    assert!(stdout.contains("Client Request (ID: 2): resource/resolve"));
    assert!(stdout.contains(r#""text":"12""#), "stdout: {stdout}");
    assert!(stdout.contains("Hello, Alice!"), "stdout: {stdout}");
    assert!(stdout.contains("Server process exited"), "stdout: {stdout}");

    // Responses are printed once, on stdout, not echoed into the log
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stdout.matches("Hello, Alice!").count(), 1);
    assert!(!stderr.contains("Hello, Alice!"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn test_call_subcommand() -> Result<()> {
    let output = run_rpcpipe(
        &[
            "--server",
            demo_server(),
            "call",
            "tool/run",
            r#"{"tool_name":"get_weather","arguments":{"city":"Paris"}}"#,
        ],
        100,
    )?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("Client Request (ID: 0): tool/run"));
    assert!(stdout.contains(r#""text":"45""#), "stdout: {stdout}");
    Ok(())
}

#[test]
fn test_tour_session() -> Result<()> {
    let output = run_rpcpipe(&["--server", demo_server(), "tour"], 100)?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("Client Request (ID: 1): tools/list"));
    assert!(stdout.contains("Client Request (ID: 2): resources/list"));
    assert!(stdout.contains(r#""name":"get_weather""#), "stdout: {stdout}");
    assert!(stdout.contains(r#""uri_template":"greeting://{name}""#), "stdout: {stdout}");
    assert!(stdout.contains(r#""text":"12""#), "stdout: {stdout}");
    assert!(stdout.contains(r#""text":"45""#), "stdout: {stdout}");
    assert!(stdout.contains(r#""mime_type":"text/plain""#), "stdout: {stdout}");
    assert!(stdout.contains("Hello, Alice!"), "stdout: {stdout}");
    Ok(())
}

#[test]
fn test_call_rejects_bad_params() -> Result<()> {
    let output = run_rpcpipe(&["--server", demo_server(), "call", "ping", "[1]"], 0)?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("params must be a JSON object"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn test_initialize_failure_exits_nonzero() -> Result<()> {
    // `true` exits at once, so initialize hits a closed pipe
    let output = run_rpcpipe(&["--server", "true"], 500)?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(!output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("Failed to send request (id: 0)"), "stdout: {stdout}");
    assert!(!stdout.contains("tool/run"));
    Ok(())
}

#[test]
fn test_missing_server_program() -> Result<()> {
    let output = run_rpcpipe(&["--server", "rpcpipe-definitely-missing"], 0)?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("rpcpipe-definitely-missing"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn test_version_flag() -> Result<()> {
    let output = Command::new(env!("CARGO_BIN_EXE_rpcpipe"))
        .arg("--version")
        .output()
        .context("failed to run rpcpipe")?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    let version = stdout.trim().strip_prefix("rpcpipe ").unwrap_or_default();
    assert!(!version.is_empty(), "stdout: {stdout}");
    assert!(!version.starts_with('v'), "stdout: {stdout}");
    Ok(())
}

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![allow(clippy::unwrap_used, clippy::panic, reason = "Tests fail loudly on unexpected results")]
//! Integration tests for the client against real child processes.
//!
//! Most tests drive the bundled demo server; a few use `sh` scripts where a
//! specific output pattern is needed.

use std::collections::HashSet;
use std::time::Duration;

use rpcpipe::rpc::{ReaderEvent, RequestId, RpcClient, ShutdownTimeouts, TransportError};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn demo_server() -> String {
    env!("CARGO_BIN_EXE_rpcpipe-demo-server").to_string()
}

fn quick_timeouts() -> ShutdownTimeouts {
    ShutdownTimeouts {
        terminate: Duration::from_secs(2),
        kill: Duration::from_secs(2),
        reader_join: Duration::from_secs(2),
        stderr_settle: Duration::from_millis(50),
        stderr: Duration::from_secs(2),
    }
}

/// Waits for the next output line, failing the test on close or timeout.
async fn next_line(events: &mut UnboundedReceiver<ReaderEvent>) -> String {
    match tokio::time::timeout(RECV_TIMEOUT, events.recv()).await {
        Ok(Some(ReaderEvent::Line(line))) => line,
        other => panic!("expected an output line, got {other:?}"),
    }
}

#[tokio::test]
async fn test_echo_end_to_end() {
    let mut client = RpcClient::spawn(&demo_server(), &["--echo".to_string()]).unwrap();
    let mut events = client.take_events().unwrap();
    assert!(client.take_events().is_none());

    let id = client.send("add", json!({"a": 5, "b": 7})).await.unwrap();
    assert_eq!(id, RequestId::Number(0));

    let line = next_line(&mut events).await;
    assert!(line.starts_with("ECHO:"), "unexpected line: {line}");
    assert!(
        line.contains(r#"{"jsonrpc":"2.0","id":0,"method":"add","params":{"a":5,"b":7}}"#),
        "payload not echoed: {line}"
    );

    let timeouts = quick_timeouts();
    let report = client.shutdown(timeouts).await;
    assert!(report.exit_status().is_some(), "no exit status: {report:?}");
    assert!(!report.kill_issued);
    assert!(report.process_elapsed <= timeouts.terminate + timeouts.kill);
    assert!(report.reader_finished);
}

#[tokio::test]
async fn test_ids_follow_send_order() {
    let mut client = RpcClient::spawn(&demo_server(), &["--echo".to_string()]).unwrap();
    let mut events = client.take_events().unwrap();

    for expected in 0..5 {
        let id = client.send("ping", json!({})).await.unwrap();
        assert_eq!(id, RequestId::Number(expected));
    }

    for expected in 0..5 {
        let line = next_line(&mut events).await;
        let payload: Value = serde_json::from_str(line.trim_start_matches("ECHO:")).unwrap();
        assert_eq!(payload["id"], expected);
    }

    client.shutdown(quick_timeouts()).await;
}

async fn send_batch(client: &RpcClient, count: usize) -> Vec<RequestId> {
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(client.send("ping", json!({})).await.unwrap());
        tokio::task::yield_now().await;
    }
    ids
}

#[tokio::test]
async fn test_concurrent_senders_get_unique_ids() {
    let client = RpcClient::spawn(&demo_server(), &["--echo".to_string()]).unwrap();

    let (a, b, c, d) = tokio::join!(
        send_batch(&client, 25),
        send_batch(&client, 25),
        send_batch(&client, 25),
        send_batch(&client, 25),
    );

    let mut seen = HashSet::new();
    for id in a.into_iter().chain(b).chain(c).chain(d) {
        assert!(seen.insert(id.clone()), "duplicate id {id}");
    }
    let expected: HashSet<RequestId> = (0..100).map(RequestId::Number).collect();
    assert_eq!(seen, expected);

    client.shutdown(quick_timeouts()).await;
}

#[tokio::test]
async fn test_send_after_input_closed_fails() {
    let client = RpcClient::spawn(&demo_server(), &[]).unwrap();

    assert!(client.close_input().await.unwrap());

    let err = client.send("ping", json!({})).await.unwrap_err();
    assert!(matches!(err.source, TransportError::InputClosed));
    // The failed request still consumed its id
    assert_eq!(err.id, RequestId::Number(0));

    let next = client.send("ping", json!({})).await.unwrap_err();
    assert_eq!(next.id, RequestId::Number(1));

    let report = client.shutdown(quick_timeouts()).await;
    assert!(report.exit_status().is_some());
}

#[tokio::test]
async fn test_demo_server_answers_tool_and_resource() {
    let mut client = RpcClient::spawn(&demo_server(), &[]).unwrap();
    let mut events = client.take_events().unwrap();

    client
        .send(
            "initialize",
            json!({
                "client_info": {"name": "integration-test", "version": "0.1.0"},
                "protocol_version": "1.0",
            }),
        )
        .await
        .unwrap();
    client
        .send(
            "tool/run",
            json!({"tool_name": "add", "arguments": {"a": 5, "b": 7}}),
        )
        .await
        .unwrap();
    client
        .send("resource/resolve", json!({"resource_uri": "greeting://Alice"}))
        .await
        .unwrap();

    let responses: Vec<Value> = [
        next_line(&mut events).await,
        next_line(&mut events).await,
        next_line(&mut events).await,
    ]
    .iter()
    .map(|line| serde_json::from_str(line).unwrap())
    .collect();

    assert!(responses[0]["result"]["server_info"].is_object());
    assert_eq!(responses[1]["result"]["content"][0]["text"], "12");
    assert_eq!(
        responses[2]["result"]["contents"][0]["text"],
        "Hello, Alice!"
    );

    let report = client.shutdown(quick_timeouts()).await;
    // The demo server logs to stderr; the sequencer hands that back
    let stderr = report.stderr.unwrap_or_default();
    assert!(stderr.contains("Demo server ready"), "stderr: {stderr}");
}

#[tokio::test]
async fn test_reader_sees_k_lines_then_one_close() {
    let args = vec!["-c".to_string(), "printf 'one\\ntwo\\nthree\\n'".to_string()];
    let mut client = RpcClient::spawn("sh", &args).unwrap();
    let mut events = client.take_events().unwrap();

    let mut collected = Vec::new();
    loop {
        match tokio::time::timeout(RECV_TIMEOUT, events.recv()).await {
            Ok(Some(event)) => collected.push(event),
            Ok(None) => break,
            Err(_) => panic!("reader did not finish, got {collected:?}"),
        }
    }

    assert_eq!(
        collected,
        vec![
            ReaderEvent::Line("one".to_string()),
            ReaderEvent::Line("two".to_string()),
            ReaderEvent::Line("three".to_string()),
            ReaderEvent::Closed,
        ]
    );

    client.shutdown(quick_timeouts()).await;
}

#[tokio::test]
async fn test_spawn_failure_is_reported() {
    let result = RpcClient::spawn("rpcpipe-definitely-missing", &[]);
    assert!(matches!(result, Err(TransportError::Spawn { .. })));
}

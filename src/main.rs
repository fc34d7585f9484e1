// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! rpcpipe CLI.
//!
//! Launches a stdio JSON-RPC server, sends it requests one line at a time,
//! prints whatever it answers, and shuts it down.

#![allow(clippy::print_stdout, reason = "CLI tool needs to output to stdout")]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rpcpipe::cli::{self, ColorConfig};
use rpcpipe::config::{Config, ServerConfig};
use rpcpipe::rpc::{ReaderEvent, RpcClient};

/// Command-line arguments for rpcpipe.
#[derive(Parser, Debug)]
#[command(name = "rpcpipe")]
#[command(about = "Line-delimited JSON-RPC client for stdio servers")]
#[command(version = env!("RPCPIPE_VERSION"))]
struct Args {
    /// The subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server command line (e.g. "python3 server.py"). Overrides the config file.
    #[arg(long, global = true)]
    server: Option<String>,

    /// Disable colored output.
    #[arg(long, global = true)]
    nocolor: bool,
}

/// Subcommands supported by rpcpipe.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scripted demo session (default if no subcommand given):
    /// initialize, call the `add` tool, resolve `greeting://Alice`.
    Demo,

    /// List tools and resources, call each tool, and read a resource.
    Tour,

    /// Send a single request and print the server's output.
    Call {
        /// Method name (e.g. "tool/run").
        method: String,

        /// Parameters as a JSON object. Defaults to `{}`.
        params: Option<String>,
    },
}

/// Entry point for the rpcpipe binary.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the server cannot be
/// launched, or the first request cannot be sent.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rpcpipe=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config.clone())?;
    if let Some(server) = &args.server {
        config.server = ServerConfig::from_command_line(server)?;
    }

    let colors = ColorConfig::new(args.nocolor);

    let steps = match args.command {
        None | Some(Command::Demo) => demo_script(&config),
        Some(Command::Tour) => tour_script(&config),
        Some(Command::Call { method, params }) => {
            vec![(method, parse_params(params.as_deref())?)]
        }
    };

    run_script(&config, &colors, steps).await
}

/// Parses the optional `params` argument into a JSON value.
fn parse_params(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(json!({}));
    };
    let value: Value = serde_json::from_str(raw).context("params must be valid JSON")?;
    if !value.is_object() {
        bail!("params must be a JSON object, got: {raw}");
    }
    Ok(value)
}

/// A running client plus the task printing its output.
struct Session {
    client: RpcClient,
    printer: JoinHandle<()>,
}

impl Session {
    fn start(config: &Config, colors: &ColorConfig) -> Result<Self> {
        let mut client = RpcClient::spawn(&config.server.command, &config.server.args)?;
        info!("Server started (pid {:?})", client.server_pid());
        let events = client
            .take_events()
            .context("server output receiver already taken")?;
        let printer = tokio::spawn(print_output(events, colors.clone()));

        Ok(Self { client, printer })
    }

    /// Sends a request and echoes it. Returns whether it was delivered.
    async fn send(&self, colors: &ColorConfig, method: &str, params: Value) -> bool {
        match self.client.send(method, params).await {
            Ok(id) => {
                println!("{}", colors.green(&format!("Client Request (ID: {id}): {method}")));
                true
            }
            Err(e) => {
                println!("{}", colors.red(&e.to_string()));
                false
            }
        }
    }

    async fn finish(self, config: &Config, colors: &ColorConfig) {
        tokio::time::sleep(config.pacing.settle_delay()).await;

        let timeouts = config.shutdown.timeouts();
        let report = self.client.shutdown(timeouts).await;
        println!("{}", colors.dim(&cli::describe_exit(&report)));

        // The printer ends when the reader drops its sender
        if tokio::time::timeout(Duration::from_secs(1), self.printer)
            .await
            .is_err()
        {
            warn!("Output printer did not finish");
        }
    }
}

/// Prints server output until the reader closes the channel.
async fn print_output(mut events: UnboundedReceiver<ReaderEvent>, colors: ColorConfig) {
    while let Some(event) = events.recv().await {
        match event {
            ReaderEvent::Line(line) => {
                println!("{}", colors.blue(&format!("Server Response: {}", line.trim())));
            }
            ReaderEvent::Closed => println!("{}", colors.dim("Server stdout pipe closed.")),
            ReaderEvent::Failed(reason) => {
                println!("{}", colors.red(&format!("Error reading server output: {reason}")));
            }
        }
    }
}

/// Builds the `initialize` params from the configured client identity.
fn initialize_params(config: &Config) -> Value {
    json!({
        "client_info": {
            "name": config.client.name,
            "version": config.client.version,
        },
        "protocol_version": config.client.protocol_version,
    })
}

/// The scripted demo session: add two numbers, then resolve a greeting.
fn demo_script(config: &Config) -> Vec<(String, Value)> {
    vec![
        ("initialize".to_string(), initialize_params(config)),
        (
            "tool/run".to_string(),
            json!({"tool_name": "add", "arguments": {"a": 5, "b": 7}}),
        ),
        (
            "resource/resolve".to_string(),
            json!({"resource_uri": "greeting://Alice"}),
        ),
    ]
}

/// A tour of everything the demo server offers, using the MCP-style
/// method names.
fn tour_script(config: &Config) -> Vec<(String, Value)> {
    vec![
        ("initialize".to_string(), initialize_params(config)),
        ("tools/list".to_string(), json!({})),
        ("resources/list".to_string(), json!({})),
        (
            "tools/call".to_string(),
            json!({"name": "add", "arguments": {"a": 5, "b": 7}}),
        ),
        (
            "tools/call".to_string(),
            json!({"name": "get_weather", "arguments": {"city": "London"}}),
        ),
        (
            "resources/read".to_string(),
            json!({"uri": "greeting://Alice"}),
        ),
    ]
}

/// Sends `steps` in order with the configured pauses, then shuts down.
///
/// # Errors
///
/// Returns an error if the server cannot be launched or the first request
/// cannot be sent. Later failures are reported and do not change the exit
/// status.
async fn run_script(
    config: &Config,
    colors: &ColorConfig,
    steps: Vec<(String, Value)>,
) -> Result<()> {
    let session = Session::start(config, colors)?;

    // Allow the server a moment to start up
    tokio::time::sleep(config.pacing.startup_delay()).await;

    for (index, (method, params)) in steps.into_iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(config.pacing.request_delay()).await;
        }

        info!("Sending {} request", method);
        if !session.send(colors, &method, params).await && index == 0 {
            error!("Failed to send {} request, shutting down", method);
            session.finish(config, colors).await;
            bail!("{method} request could not be sent");
        }
    }

    session.finish(config, colors).await;
    info!("Client finished");
    Ok(())
}

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A small demo tool server for exercising rpcpipe.
//!
//! Speaks line-delimited JSON-RPC over stdin/stdout: one request per line,
//! one response per line. Offers an `add` tool, a stub `get_weather` tool and
//! the templated `greeting://{name}` resource. With `--echo` it instead writes
//! every input line back prefixed with `ECHO:`.
//! No tokio: plain blocking std I/O.

use std::io::{BufRead, Write};

use anyhow::Result;
use clap::Parser;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use rpcpipe::rpc::protocol::{
    INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, RequestMessage, ResponseMessage,
};

/// Demo JSON-RPC server for rpcpipe.
#[derive(Parser, Debug)]
#[command(name = "rpcpipe-demo-server")]
#[command(version = env!("RPCPIPE_VERSION"))]
struct Args {
    /// Echo every input line back as `ECHO:<line>` instead of answering it.
    #[arg(long)]
    echo: bool,

    /// Name reported in the `initialize` result.
    #[arg(long, default_value = "Demo")]
    name: String,
}

/// Reading of the stub weather tool. The demo never calls a real service.
const STUB_TEMPERATURE: i64 = 45;

/// A resource addressed by a URI template such as `greeting://{name}`.
struct ResourceTemplate {
    uri_template: &'static str,
    description: &'static str,
    mime_type: &'static str,
    pattern: Regex,
    render: fn(&regex::Captures<'_>) -> String,
}

impl ResourceTemplate {
    fn new(
        uri_template: &'static str,
        description: &'static str,
        mime_type: &'static str,
        render: fn(&regex::Captures<'_>) -> String,
    ) -> Result<Self> {
        Ok(Self {
            uri_template,
            description,
            mime_type,
            pattern: template_to_regex(uri_template)?,
            render,
        })
    }

    fn resolve(&self, uri: &str) -> Option<String> {
        self.pattern.captures(uri).map(|caps| (self.render)(&caps))
    }
}

/// Compiles a URI template into an anchored regex. Each `{var}` becomes a
/// named group matching one path segment; everything else is literal.
fn template_to_regex(template: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::from("^");
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|i| open + i) else {
            break;
        };
        pattern.push_str(&regex::escape(&rest[..open]));
        pattern.push_str(&format!("(?P<{}>[^/]+)", &rest[open + 1..close]));
        rest = &rest[close + 1..];
    }

    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    Regex::new(&pattern)
}

fn render_greeting(caps: &regex::Captures<'_>) -> String {
    format!("Hello, {}!", &caps["name"])
}

/// Output sink: stdout in production, a shared buffer in tests.
type Writer = Box<dyn Write + Send>;

struct DemoServer {
    args: Args,
    resources: Vec<ResourceTemplate>,
    writer: Writer,
}

impl DemoServer {
    fn new(args: Args, writer: Writer) -> Result<Self> {
        let resources = vec![ResourceTemplate::new(
            "greeting://{name}",
            "Get a personalized greeting",
            "text/plain",
            render_greeting,
        )?];

        Ok(Self {
            args,
            resources,
            writer,
        })
    }

    /// Serves until the reader reaches end of input.
    fn run(&mut self, reader: &mut dyn BufRead) -> Result<()> {
        info!("Demo server ready (echo: {})", self.args.echo);

        for line in reader.lines() {
            let line = line?;
            if self.args.echo {
                writeln!(self.writer, "ECHO:{line}")?;
                self.writer.flush()?;
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line) {
                writeln!(self.writer, "{}", serde_json::to_string(&response)?)?;
                self.writer.flush()?;
            }
        }

        info!("Demo server shutting down (stdin closed)");
        Ok(())
    }

    /// Handles one input line. Notifications (no id) get no response.
    fn handle_line(&self, line: &str) -> Option<ResponseMessage> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!("Unparseable line: {}", e);
                return Some(ResponseMessage::error(None, PARSE_ERROR, e.to_string()));
            }
        };

        if value.get("id").is_none() {
            debug!("Ignoring notification: {}", value);
            return None;
        }

        match serde_json::from_value::<RequestMessage>(value) {
            Ok(request) => Some(self.handle_request(request)),
            Err(e) => Some(ResponseMessage::error(None, PARSE_ERROR, e.to_string())),
        }
    }

    fn handle_request(&self, request: RequestMessage) -> ResponseMessage {
        debug!("Handling request: {} (id={})", request.method, request.id);

        let result = match request.method.as_str() {
            "initialize" => Ok(self.handle_initialize(&request.params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(Self::handle_tools_list()),
            "tool/run" | "tools/call" => Self::handle_tool_run(&request.params),
            "resources/list" => Ok(self.handle_resources_list()),
            "resource/resolve" | "resources/read" => self.handle_resource_resolve(&request.params),
            other => Err((METHOD_NOT_FOUND, format!("Unknown method: {other}"))),
        };

        match result {
            Ok(value) => ResponseMessage::success(request.id, value),
            Err((code, message)) => {
                warn!("{}", message);
                ResponseMessage::error(Some(request.id), code, message)
            }
        }
    }

    fn handle_initialize(&self, params: &Value) -> Value {
        let client = params
            .get("client_info")
            .or_else(|| params.get("clientInfo"))
            .and_then(|info| info.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!("Client connecting: {}", client);

        let protocol_version = params
            .get("protocol_version")
            .or_else(|| params.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or("1.0");

        json!({
            "protocol_version": protocol_version,
            "server_info": {
                "name": self.args.name,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {
                "tools": {},
                "resources": {},
            },
        })
    }

    fn handle_tools_list() -> Value {
        json!({
            "tools": [
                {
                    "name": "add",
                    "description": "Add two numbers",
                    "input_schema": {
                        "type": "object",
                        "properties": {
                            "a": {"type": "integer"},
                            "b": {"type": "integer"},
                        },
                        "required": ["a", "b"],
                    },
                },
                {
                    "name": "get_weather",
                    "description": "Get the weather of a city",
                    "input_schema": {
                        "type": "object",
                        "properties": {"city": {"type": "string"}},
                        "required": ["city"],
                    },
                },
            ]
        })
    }

    fn handle_tool_run(params: &Value) -> Result<Value, (i64, String)> {
        let name = params
            .get("tool_name")
            .or_else(|| params.get("name"))
            .and_then(Value::as_str)
            .ok_or((INVALID_PARAMS, "Missing tool_name".to_string()))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let output = match name {
            "add" => {
                let a = int_argument(&arguments, "a")?;
                let b = int_argument(&arguments, "b")?;
                let sum = a
                    .checked_add(b)
                    .ok_or((INVALID_PARAMS, format!("{a} + {b} overflows")))?;
                sum.to_string()
            }
            "get_weather" => {
                let city = arguments
                    .get("city")
                    .and_then(Value::as_str)
                    .ok_or((INVALID_PARAMS, "Missing argument: city".to_string()))?;
                debug!("Weather lookup for {}", city);
                STUB_TEMPERATURE.to_string()
            }
            other => return Err((INVALID_PARAMS, format!("Unknown tool: {other}"))),
        };

        Ok(json!({"content": [{"type": "text", "text": output}]}))
    }

    fn handle_resources_list(&self) -> Value {
        let templates: Vec<Value> = self
            .resources
            .iter()
            .map(|r| {
                json!({
                    "uri_template": r.uri_template,
                    "description": r.description,
                    "mime_type": r.mime_type,
                })
            })
            .collect();
        json!({"resource_templates": templates})
    }

    fn handle_resource_resolve(&self, params: &Value) -> Result<Value, (i64, String)> {
        let uri = params
            .get("resource_uri")
            .or_else(|| params.get("uri"))
            .and_then(Value::as_str)
            .ok_or((INVALID_PARAMS, "Missing resource_uri".to_string()))?;

        self.resources
            .iter()
            .find_map(|r| r.resolve(uri).map(|text| (r.mime_type, text)))
            .map(|(mime_type, text)| {
                json!({"contents": [{"uri": uri, "mime_type": mime_type, "text": text}]})
            })
            .ok_or((INVALID_PARAMS, format!("Unknown resource: {uri}")))
    }
}

fn int_argument(arguments: &Value, key: &str) -> Result<i64, (i64, String)> {
    arguments
        .get(key)
        .and_then(Value::as_i64)
        .ok_or((INVALID_PARAMS, format!("Argument {key} must be an integer")))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // stderr is usually a pipe read by the client, so no ANSI colors
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("rpcpipe_demo_server=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let mut server = DemoServer::new(args, Box::new(std::io::stdout()))?;
    let mut stdin = std::io::stdin().lock();
    server.run(&mut stdin)
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    reason = "Tests use expect/unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// Write adapter for `Arc<Mutex<Vec<u8>>>` used in tests.
    struct SharedVecWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedVecWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .map_err(|e| std::io::Error::other(e.to_string()))?
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn server(echo: bool) -> (DemoServer, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let args = Args {
            echo,
            name: "Demo".to_string(),
        };
        let server = DemoServer::new(args, Box::new(SharedVecWriter(buf.clone()))).unwrap();
        (server, buf)
    }

    fn output_lines(buf: &Arc<Mutex<Vec<u8>>>) -> Vec<String> {
        String::from_utf8(buf.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn call(server: &DemoServer, method: &str, params: Value) -> Value {
        let line = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});
        let response = server.handle_line(&line.to_string()).unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[test]
    fn test_template_to_regex() {
        let re = template_to_regex("greeting://{name}").unwrap();
        assert_eq!(&re.captures("greeting://Alice").unwrap()["name"], "Alice");
        assert!(!re.is_match("greeting://"));
        assert!(!re.is_match("greeting://a/b"));
        assert!(!re.is_match("xgreeting://Alice"));

        let literal = template_to_regex("config://app.settings").unwrap();
        assert!(literal.is_match("config://app.settings"));
        assert!(!literal.is_match("config://appXsettings"));
    }

    #[test]
    fn test_add_tool() {
        let (server, _) = server(false);
        let response = call(
            &server,
            "tool/run",
            json!({"tool_name": "add", "arguments": {"a": 5, "b": 7}}),
        );
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["content"][0]["text"], "12");
    }

    #[test]
    fn test_add_rejects_non_integers() {
        let (server, _) = server(false);
        let response = call(
            &server,
            "tools/call",
            json!({"name": "add", "arguments": {"a": "5", "b": 7}}),
        );
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[test]
    fn test_weather_stub() {
        let (server, _) = server(false);
        let response = call(
            &server,
            "tool/run",
            json!({"tool_name": "get_weather", "arguments": {"city": "London"}}),
        );
        assert_eq!(response["result"]["content"][0]["text"], "45");
    }

    #[test]
    fn test_greeting_resource() {
        let (server, _) = server(false);
        let response = call(
            &server,
            "resource/resolve",
            json!({"resource_uri": "greeting://Alice"}),
        );
        let content = &response["result"]["contents"][0];
        assert_eq!(content["text"], "Hello, Alice!");
        assert_eq!(content["mime_type"], "text/plain");

        let missing = call(&server, "resources/read", json!({"uri": "weather://Paris"}));
        assert_eq!(missing["error"]["code"], INVALID_PARAMS);
    }

    #[test]
    fn test_unknown_method_and_bad_json() {
        let (server, _) = server(false);
        let response = call(&server, "tool/explode", json!({}));
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);

        let garbage = server.handle_line("{not json").unwrap();
        let garbage = serde_json::to_value(garbage).unwrap();
        assert_eq!(garbage["error"]["code"], PARSE_ERROR);
        assert!(garbage["id"].is_null());
    }

    #[test]
    fn test_notifications_get_no_response() {
        let (server, _) = server(false);
        let line = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        assert!(server.handle_line(line).is_none());
    }

    #[test]
    fn test_run_answers_each_line() {
        let (mut server, buf) = server(false);
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"client_info":{"name":"t","version":"1"},"protocol_version":"1.0"}}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n"
        );
        server.run(&mut Cursor::new(input)).unwrap();

        let lines = output_lines(&buf);
        assert_eq!(lines.len(), 2);
        let init: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(init["result"]["server_info"]["name"], "Demo");
        assert_eq!(init["result"]["protocol_version"], "1.0");
    }

    #[test]
    fn test_echo_mode() {
        let (mut server, buf) = server(true);
        let request = r#"{"jsonrpc":"2.0","id":0,"method":"add","params":{"a":5,"b":7}}"#;
        server
            .run(&mut Cursor::new(format!("{request}\nplain text\n")))
            .unwrap();

        assert_eq!(
            output_lines(&buf),
            vec![format!("ECHO:{request}"), "ECHO:plain text".to_string()]
        );
    }
}

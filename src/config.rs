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

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::rpc::ShutdownTimeouts;

/// Server launched when nothing else is configured.
pub const DEFAULT_SERVER_COMMAND: &str = "rpcpipe-demo-server";

/// Top-level rpcpipe configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// The server program to launch.
    #[serde(default)]
    pub server: ServerConfig,

    /// Identity sent in the `initialize` request.
    #[serde(default)]
    pub client: ClientConfig,

    /// Fixed pauses between requests.
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Shutdown timeouts.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// How to launch the server process.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// The command to execute (e.g., "python3")
    #[serde(default = "default_server_command")]
    pub command: String,

    /// Arguments to pass to the command
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_server_command(),
            args: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Parses a whitespace-separated command line such as `"python3 server.py"`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command line is empty.
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace();
        let command = parts
            .next()
            .ok_or_else(|| anyhow!("server command cannot be empty"))?
            .to_string();
        let args = parts.map(std::string::ToString::to_string).collect();

        Ok(Self { command, args })
    }
}

/// Client identity announced to the server.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Client name (default: "MyCustomClient")
    #[serde(default = "default_client_name")]
    pub name: String,

    /// Client version (default: "0.1.0")
    #[serde(default = "default_client_version")]
    pub version: String,

    /// Protocol version announced during `initialize`
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            version: default_client_version(),
            protocol_version: default_protocol_version(),
        }
    }
}

/// Delays in milliseconds around each request.
#[derive(Debug, Deserialize, Clone)]
pub struct PacingConfig {
    /// Pause after launch before the first request (default: 1000)
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,

    /// Pause between consecutive requests (default: 500)
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Pause after the last request before shutdown begins (default: 1000)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: default_startup_delay_ms(),
            request_delay_ms: default_request_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl PacingConfig {
    /// Delay before the first request.
    #[must_use]
    pub const fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Delay between requests.
    #[must_use]
    pub const fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Delay before shutdown starts.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Shutdown timeouts in milliseconds.
#[derive(Debug, Deserialize, Clone)]
pub struct ShutdownConfig {
    /// Wait for exit after the graceful terminate signal (default: 5000)
    #[serde(default = "default_terminate_timeout_ms")]
    pub terminate_timeout_ms: u64,

    /// Wait for exit after the forceful kill (default: 2000)
    #[serde(default = "default_kill_timeout_ms")]
    pub kill_timeout_ms: u64,

    /// Wait for the output reader to finish (default: 5000)
    #[serde(default = "default_reader_join_timeout_ms")]
    pub reader_join_timeout_ms: u64,

    /// Pause before collecting trailing stderr (default: 100)
    #[serde(default = "default_stderr_settle_ms")]
    pub stderr_settle_ms: u64,

    /// Wait for the stderr collector to finish (default: 2000)
    #[serde(default = "default_stderr_timeout_ms")]
    pub stderr_timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            terminate_timeout_ms: default_terminate_timeout_ms(),
            kill_timeout_ms: default_kill_timeout_ms(),
            reader_join_timeout_ms: default_reader_join_timeout_ms(),
            stderr_settle_ms: default_stderr_settle_ms(),
            stderr_timeout_ms: default_stderr_timeout_ms(),
        }
    }
}

impl ShutdownConfig {
    /// Converts the millisecond settings into sequencer timeouts.
    #[must_use]
    pub const fn timeouts(&self) -> ShutdownTimeouts {
        ShutdownTimeouts {
            terminate: Duration::from_millis(self.terminate_timeout_ms),
            kill: Duration::from_millis(self.kill_timeout_ms),
            reader_join: Duration::from_millis(self.reader_join_timeout_ms),
            stderr_settle: Duration::from_millis(self.stderr_settle_ms),
            stderr: Duration::from_millis(self.stderr_timeout_ms),
        }
    }
}

/// `RPCPIPE_SHUTDOWN__KILL_TIMEOUT_MS` and friends. Values stay strings
/// until deserialized, so `RPCPIPE_CLIENT__PROTOCOL_VERSION=1.0` keeps its
/// trailing zero.
fn env_source() -> config::Environment {
    config::Environment::with_prefix("RPCPIPE")
        .prefix_separator("_")
        .separator("__")
}

fn default_server_command() -> String {
    DEFAULT_SERVER_COMMAND.to_string()
}

fn default_client_name() -> String {
    "MyCustomClient".to_string()
}

fn default_client_version() -> String {
    "0.1.0".to_string()
}

fn default_protocol_version() -> String {
    "1.0".to_string()
}

const fn default_startup_delay_ms() -> u64 {
    1000
}

const fn default_request_delay_ms() -> u64 {
    500
}

const fn default_settle_delay_ms() -> u64 {
    1000
}

const fn default_terminate_timeout_ms() -> u64 {
    5000
}

const fn default_kill_timeout_ms() -> u64 {
    2000
}

const fn default_reader_join_timeout_ms() -> u64 {
    5000
}

const fn default_stderr_settle_ms() -> u64 {
    100
}

const fn default_stderr_timeout_ms() -> u64 {
    2000
}

impl Config {
    /// Load configuration from standard paths or a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if a config source cannot be read or parsed.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        Self::load_layers(dirs::config_dir(), explicit_file, env_source())
    }

    fn load_layers(
        user_config_dir: Option<PathBuf>,
        explicit_file: Option<PathBuf>,
        environment: config::Environment,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();

        // 1. Start with defaults
        builder = builder.set_default("server.command", DEFAULT_SERVER_COMMAND)?;

        // 2. Load from user config directory (~/.config/rpcpipe/config.toml)
        if let Some(config_dir) = user_config_dir {
            let config_path = config_dir.join("rpcpipe").join("config.toml");
            if config_path.exists() {
                builder = builder.add_source(config::File::from(config_path));
            }
        }

        // 3. Load from explicit file if provided
        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        // 4. Environment variables
        builder = builder.add_source(environment);

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_with(vars: &[(&str, &str)]) -> config::Environment {
        let map = vars
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        env_source().source(Some(map))
    }

    fn no_env() -> config::Environment {
        env_with(&[])
    }

    #[test]
    fn test_defaults_without_sources() -> Result<()> {
        let config = Config::load_layers(None, None, no_env())?;
        assert_eq!(config.server.command, DEFAULT_SERVER_COMMAND);
        assert!(config.server.args.is_empty());
        assert_eq!(config.client.name, "MyCustomClient");
        assert_eq!(config.client.protocol_version, "1.0");
        assert_eq!(config.pacing.request_delay(), Duration::from_millis(500));

        let timeouts = config.shutdown.timeouts();
        assert_eq!(timeouts.terminate, Duration::from_secs(5));
        assert_eq!(timeouts.kill, Duration::from_secs(2));
        assert_eq!(timeouts.reader_join, Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn test_explicit_file_overrides_defaults() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            r#"
[server]
command = "python3"
args = ["server.py"]

[shutdown]
kill_timeout_ms = 250
"#
        )?;

        let config = Config::load_layers(None, Some(file.path().to_path_buf()), no_env())?;
        assert_eq!(config.server.command, "python3");
        assert_eq!(config.server.args, vec!["server.py".to_string()]);
        assert_eq!(config.shutdown.kill_timeout_ms, 250);
        // Untouched keys keep their defaults
        assert_eq!(config.shutdown.terminate_timeout_ms, 5000);
        Ok(())
    }

    #[test]
    fn test_user_config_dir_layer() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("rpcpipe"))?;
        std::fs::write(
            dir.path().join("rpcpipe").join("config.toml"),
            "[pacing]\nstartup_delay_ms = 0\n",
        )?;

        let config = Config::load_layers(Some(dir.path().to_path_buf()), None, no_env())?;
        assert_eq!(config.pacing.startup_delay(), Duration::ZERO);
        assert_eq!(config.pacing.settle_delay_ms, 1000);
        Ok(())
    }

    #[test]
    fn test_env_overrides_keep_strings_verbatim() -> Result<()> {
        let env = env_with(&[
            ("RPCPIPE_CLIENT__PROTOCOL_VERSION", "1.0"),
            ("RPCPIPE_CLIENT__VERSION", "2.0"),
            ("RPCPIPE_SHUTDOWN__KILL_TIMEOUT_MS", "250"),
            ("RPCPIPE_PACING__STARTUP_DELAY_MS", "0"),
        ]);

        let config = Config::load_layers(None, None, env)?;
        assert_eq!(config.client.protocol_version, "1.0");
        assert_eq!(config.client.version, "2.0");
        assert_eq!(config.shutdown.kill_timeout_ms, 250);
        assert_eq!(config.pacing.startup_delay(), Duration::ZERO);
        Ok(())
    }

    #[test]
    fn test_env_overrides_file() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "[client]\nname = \"from-file\"\n")?;

        let env = env_with(&[("RPCPIPE_CLIENT__NAME", "from-env")]);
        let config = Config::load_layers(None, Some(file.path().to_path_buf()), env)?;
        assert_eq!(config.client.name, "from-env");
        Ok(())
    }

    #[test]
    fn test_server_from_command_line() -> Result<()> {
        let server = ServerConfig::from_command_line("  python3 server.py --verbose ")?;
        assert_eq!(server.command, "python3");
        assert_eq!(server.args, vec!["server.py", "--verbose"]);

        assert!(ServerConfig::from_command_line("   ").is_err());
        Ok(())
    }
}

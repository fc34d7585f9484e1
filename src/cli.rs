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

//! CLI utilities for terminal output formatting and colors.

use crossterm::tty::IsTty;
use std::io::stdout;

use crate::rpc::{ExitOutcome, ShutdownReport};

/// Configuration for color output
#[derive(Debug, Clone)]
pub struct ColorConfig {
    /// Whether ANSI colors are emitted.
    pub enabled: bool,
}

impl ColorConfig {
    /// Create a new ColorConfig, auto-detecting TTY unless nocolor is true
    pub fn new(nocolor: bool) -> Self {
        Self {
            enabled: !nocolor && stdout().is_tty(),
        }
    }

    /// ANSI escape code for green (outgoing requests)
    pub fn green(&self, s: &str) -> String {
        self.paint("32", s)
    }

    /// ANSI escape code for blue (server output)
    pub fn blue(&self, s: &str) -> String {
        self.paint("34", s)
    }

    /// ANSI escape code for red (errors)
    pub fn red(&self, s: &str) -> String {
        self.paint("31", s)
    }

    /// ANSI escape code for dim text
    pub fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }

    fn paint(&self, code: &str, s: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{s}\x1b[0m")
        } else {
            s.to_string()
        }
    }
}

/// One-line summary of how the server process ended.
pub fn describe_exit(report: &ShutdownReport) -> String {
    match &report.exit {
        ExitOutcome::Exited(status) => format!("Server process exited with {status}"),
        ExitOutcome::Killed(status) => {
            format!("Server process killed and exited with {status}")
        }
        ExitOutcome::Unresponsive => "Server process failed to exit even after kill".to_string(),
        ExitOutcome::WaitFailed(reason) => format!("Error waiting for server process: {reason}"),
    }
}

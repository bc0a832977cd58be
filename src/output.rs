//! Structured output writer supporting JSON and human-readable modes.

use crate::authority::{ControlResponse, StatusReport};
use crate::cli_style::{self, Icons, Theme};
use crate::liveness::AgentReport;
use serde::Serialize;
use steadfast_core_lock::ProtectionLevel;

/// Output mode for CLI results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Writes command results to stdout in the selected mode
#[derive(Debug, Clone)]
pub struct OutputWriter {
    pub mode: OutputMode,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            mode: if json { OutputMode::Json } else { OutputMode::Human },
        }
    }

    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    fn json<T: Serialize + ?Sized>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string(value) {
            println!("{}", json);
        }
    }

    /// Print a control response. Denials and errors go to stderr in human mode.
    pub fn response(&self, response: &ControlResponse) {
        if self.is_json() {
            self.json(response);
            return;
        }
        match response {
            ControlResponse::Status(status) => self.status(status),
            ControlResponse::Ok { message } => {
                cli_style::print_success(message.as_deref().unwrap_or("Done"))
            }
            ControlResponse::Denied { reason, challenge } => {
                eprintln!(
                    "{} {}",
                    Theme::warning(format!("{} Denied:", Icons::LOCK)),
                    sanitize_error(reason)
                );
                if let Some(text) = challenge {
                    eprintln!(
                        "  {} Type this text exactly: {}",
                        Theme::muted(Icons::ARROW_RIGHT),
                        text
                    );
                }
            }
            ControlResponse::Error { message } => {
                cli_style::print_error(&sanitize_error(message), None)
            }
        }
    }

    pub fn status(&self, status: &StatusReport) {
        if self.is_json() {
            self.json(status);
            return;
        }
        println!("{}", Theme::header("Steadfast"));
        println!("{}", cli_style::status_table(status));
    }

    pub fn agents(&self, agents: &[AgentReport]) {
        if self.is_json() {
            self.json(agents);
        } else if agents.is_empty() {
            cli_style::print_info("No agent has reported yet");
        } else {
            println!("{}", cli_style::agents_table(agents));
        }
    }

    pub fn protection(&self, level: ProtectionLevel) {
        if self.is_json() {
            self.json(&ProtectionSummary {
                level,
                capabilities: level
                    .capabilities()
                    .into_iter()
                    .map(|c| format!("{:?}", c))
                    .collect(),
            });
        } else {
            println!("{} Protection level: {}", Icons::SHIELD, Theme::header(level));
            println!("{}", cli_style::capability_table(level));
        }
    }

    /// Print an info message (suppressed in JSON mode)
    pub fn info(&self, msg: &str) {
        if !self.is_json() {
            cli_style::print_info(msg);
        }
    }

    /// Print a value as JSON, or a line of text
    pub fn line<T: Serialize>(&self, value: &T, human: &str) {
        if self.is_json() {
            self.json(value);
        } else {
            println!("{}", human);
        }
    }
}

#[derive(Debug, Serialize)]
struct ProtectionSummary {
    level: ProtectionLevel,
    capabilities: Vec<String>,
}

/// Sanitize error messages by collapsing whitespace
pub fn sanitize_error(msg: &str) -> String {
    msg.split_whitespace().collect::<Vec<&str>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_error() {
        assert_eq!(sanitize_error("a\n\tb   c\r\n"), "a b c");
        assert_eq!(sanitize_error("   "), "");
    }

    #[test]
    fn test_mode_selection() {
        assert!(OutputWriter::new(true).is_json());
        assert_eq!(OutputWriter::new(false).mode, OutputMode::Human);
    }
}

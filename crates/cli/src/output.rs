// Output format auto-detection for the CLI.
//
// TTY → human-readable text. Piped/redirected → structured JSON.
// `--json` flag forces JSON output regardless of terminal.

use serde::Serialize;
use std::io::{self, IsTerminal, Write};

use crate::client::ApiRequestError;

const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    /// Auto-detect format: JSON if `--json` was passed or stdout is not a TTY.
    pub fn detect(json_flag: bool) -> Self {
        if json_flag {
            return Self::Json;
        }
        Self::detect_from_terminal(io::stdout().is_terminal())
    }

    pub fn detect_from_terminal(is_tty: bool) -> Self {
        if is_tty {
            Self::Human
        } else {
            Self::Json
        }
    }
}

/// Write a value to stdout in the selected format.
pub fn print_output<T, F>(format: OutputFormat, value: &T, human_fn: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    write_output(&mut io::stdout().lock(), format, value, human_fn)
}

/// Write a value to a provided writer (useful for testing).
pub fn write_output<W, T, F>(
    writer: &mut W,
    format: OutputFormat,
    value: &T,
    human_fn: F,
) -> io::Result<()>
where
    W: Write,
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Human => {
            writeln!(writer, "{}", human_fn(value))
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *writer, value).map_err(io::Error::other)?;
            writeln!(writer)
        }
    }
}

/// Print a command failure to stderr with an actionable hint.
pub fn print_anyhow_error(error: &anyhow::Error) {
    let (code, message) = actionable_error(error);
    let mut err = io::stderr().lock();
    if io::stderr().is_terminal() {
        let _ = writeln!(err, "{ANSI_RED}error:{ANSI_RESET} {message}");
    } else {
        let obj = serde_json::json!({ "error": { "code": code, "message": message } });
        let _ = serde_json::to_writer(&mut err, &obj);
        let _ = writeln!(err);
    }
}

fn actionable_error(error: &anyhow::Error) -> (&'static str, String) {
    if let Some(api_error) = find_api_error(error) {
        return ("API_ERROR", format!("{}: {}", api_error.code, api_error.message));
    }

    let message = format!("{error:#}");
    let lower = message.to_ascii_lowercase();
    if lower.contains("failed to connect") || lower.contains("connection refused") {
        return (
            "DAEMON_NOT_RUNNING",
            "Daemon is not reachable. Start it with: cadenced (or pass --url)".to_string(),
        );
    }
    if lower.contains("timed out") {
        return ("NETWORK_TIMEOUT", "Daemon did not answer in time.".to_string());
    }

    ("ERROR", message)
}

pub fn find_api_error<'a>(error: &'a anyhow::Error) -> Option<&'a ApiRequestError> {
    error.chain().find_map(|cause| cause.downcast_ref::<ApiRequestError>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_tty_returns_human() {
        assert_eq!(OutputFormat::detect_from_terminal(true), OutputFormat::Human);
    }

    #[test]
    fn detect_pipe_returns_json() {
        assert_eq!(OutputFormat::detect_from_terminal(false), OutputFormat::Json);
    }

    #[test]
    fn detect_json_flag_overrides_tty() {
        assert_eq!(OutputFormat::detect(true), OutputFormat::Json);
    }

    #[test]
    fn write_output_human_format() {
        #[derive(Serialize)]
        struct Info {
            name: String,
        }
        let info = Info { name: "alice".into() };
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Human, &info, |i| format!("Name: {}", i.name))
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Name: alice\n");
    }

    #[test]
    fn write_output_json_format() {
        #[derive(Serialize)]
        struct Info {
            count: u32,
        }
        let info = Info { count: 42 };
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Json, &info, |_| {
            unreachable!("human_fn should not be called in JSON mode")
        })
        .unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(String::from_utf8(buf).unwrap().trim()).unwrap();
        assert_eq!(parsed["count"], 42);
    }

    #[test]
    fn actionable_error_for_unreachable_daemon() {
        let err = anyhow::anyhow!("failed to connect to daemon at http://127.0.0.1:7870");
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "DAEMON_NOT_RUNNING");
        assert!(message.contains("cadenced"));
    }

    #[test]
    fn actionable_error_surfaces_api_code() {
        let err = anyhow::Error::new(ApiRequestError {
            code: "VALIDATION_FAILED".into(),
            message: "unknown control action `restart`".into(),
        });
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "API_ERROR");
        assert!(message.contains("VALIDATION_FAILED"));
        assert!(message.contains("restart"));
    }
}

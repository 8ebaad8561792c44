// Consistent exit codes for the cadence CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   10 = daemon not reachable

use std::process;

use crate::client::ApiRequestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    DaemonDown = 10,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(api_err) = cause.downcast_ref::<ApiRequestError>() {
                return Self::from_api_code(&api_err.code);
            }
        }

        let msg = format!("{err:#}").to_ascii_lowercase();
        if msg.contains("failed to connect") || msg.contains("connection refused") {
            return Self::DaemonDown;
        }

        Self::Error
    }

    pub fn from_api_code(code: &str) -> Self {
        match code {
            "VALIDATION_FAILED" => Self::Usage,
            _ => Self::Error,
        }
    }

    pub fn exit(self) -> ! {
        process::exit(self.code())
    }
}

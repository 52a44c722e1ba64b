//! Error types for the core crate

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Longest stderr excerpt carried in a user-facing process error.
pub const STDERR_TAIL_CHARS: usize = 2000;

/// Failures while rewriting a backend env file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read env file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write env file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Classified outcome of a failed orchestration run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to launch '{program}': {cause}")]
    LaunchFailed { program: String, cause: String },

    #[error("process exited with code {exit_code}: {}", stderr_tail(.stderr))]
    ProcessFailed { exit_code: i32, stderr: String },

    #[error("process timed out after {} seconds", .elapsed.as_secs())]
    ProcessTimedOut { elapsed: Duration },

    #[error("empty command line")]
    EmptyCommand,

    #[error("invalid command line: {0}")]
    InvalidCommand(String),

    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while reading a produced report.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read report {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures talking to the local inference server.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("error communicating with inference server: {0}")]
    Connectivity(String),

    #[error("timeout while waiting for inference server: {0}")]
    Timeout(String),

    #[error("inference server error: status {status} - {body}")]
    Upstream { status: u16, body: String },

    #[error("malformed inference server response: {0}")]
    Malformed(String),

    #[error("inference request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InferenceError::Timeout(err.to_string())
        } else if err.is_connect() {
            InferenceError::Connectivity(err.to_string())
        } else if err.is_decode() {
            InferenceError::Malformed(err.to_string())
        } else {
            InferenceError::Other(err.to_string())
        }
    }
}

/// Failures while resolving a report for download.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("invalid report filename: {0}")]
    InvalidFilename(String),

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("report path escapes the project directory")]
    OutsideProject,

    #[error("report not found: {0}")]
    NotFound(String),

    #[error("failed to read report {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Last `STDERR_TAIL_CHARS` characters of `stderr`, trimmed.
pub fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_failed_message_contains_stderr() {
        let err = RunError::ProcessFailed {
            exit_code: 1,
            stderr: "boom\n".to_string(),
        };
        assert_eq!(err.to_string(), "process exited with code 1: boom");
    }

    #[test]
    fn test_timeout_message_contains_duration() {
        let err = RunError::ProcessTimedOut {
            elapsed: Duration::from_secs(300),
        };
        assert!(err.to_string().contains("300 seconds"));
    }

    #[test]
    fn test_stderr_tail_truncates_from_front() {
        let long = format!("{}END", "x".repeat(STDERR_TAIL_CHARS + 10));
        let tail = stderr_tail(&long);
        assert!(tail.starts_with("..."));
        assert!(tail.ends_with("END"));
        assert_eq!(tail.chars().count(), STDERR_TAIL_CHARS + 3);
    }
}

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Startup configuration failures. These are the only errors allowed to
/// terminate the tool.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required file or field is absent.
    #[error("missing configuration: {what} (looked in {path})")]
    Missing { what: String, path: PathBuf },

    /// The configuration file exists but could not be read or parsed.
    #[error("invalid configuration in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Port allocation and liveness-probe failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("no available port in {start}..{end} after {attempts} attempts")]
    NoAvailablePort { start: u16, end: u32, attempts: u32 },

    #[error("port {port} did not become {expected} within {waited:?}")]
    Timeout {
        port: u16,
        expected: &'static str,
        waited: Duration,
    },
}

/// Per-file extraction failures. Always isolated to the file that produced them.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Backend supervision failures. Recoverable: the supervisor falls back to `Stopped`.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn backend `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Port(#[from] PortError),

    #[error("backend is not running")]
    NotRunning,
}

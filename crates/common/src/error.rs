//! Error types for ovpnkit

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the ovpnkit Error
pub type Result<T> = std::result::Result<T, Error>;

/// ovpnkit error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Directory {} already exists. You might want to delete the container and its data directory.", .path.display())]
    InstanceExists { path: PathBuf },

    #[error("Directory {} does not exist. Create an OpenVPN container first.", .path.display())]
    InstanceMissing { path: PathBuf },

    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Could not detect the server address: {0}")]
    AddressDetection(String),

    #[error("No container runtime available (tried docker and podman)")]
    RuntimeUnavailable,

    #[error("Failed to spawn {program}: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed ({}): {command}", .code.map(|c| format!("exit code {c}")).unwrap_or_else(|| "terminated by signal".to_string()))]
    CommandFailed { command: String, code: Option<i32> },
}

impl Error {
    /// Process exit code for this error.
    ///
    /// External command failures pass the child's exit code through,
    /// everything else exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CommandFailed { code: Some(code), .. } if *code != 0 => *code,
            _ => 1,
        }
    }
}

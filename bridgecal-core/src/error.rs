//! Error types for the bridgecal ecosystem.

use thiserror::Error;

use crate::adapter::AdapterError;
use crate::event::Origin;

/// Process exit codes.
pub mod exit {
    pub const OK: i32 = 0;
    /// Missing or invalid configuration, provider binary not installed.
    pub const CONFIG: i32 = 2;
    /// Unrecoverable credential failure reported by an adapter.
    pub const AUTH: i32 = 3;
    /// Runtime or transient failure.
    pub const RUNTIME: i32 = 4;
}

/// Errors that can occur in bridgecal operations.
#[derive(Error, Debug)]
pub enum BridgeCalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Adapter error on {side}: {source}")]
    Adapter {
        side: Origin,
        #[source]
        source: AdapterError,
    },

    #[error("Mapping store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BridgeCalError {
    /// Map to the process exit code contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeCalError::Config(_) => exit::CONFIG,
            BridgeCalError::Adapter { source, .. } => match source {
                AdapterError::Auth(_) => exit::AUTH,
                AdapterError::NotInstalled(_) => exit::CONFIG,
                _ => exit::RUNTIME,
            },
            _ => exit::RUNTIME,
        }
    }
}

/// Result type alias for bridgecal operations.
pub type BridgeCalResult<T> = Result<T, BridgeCalError>;

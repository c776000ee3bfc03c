//! Bridge Errors
//!
//! Setup errors (`MissingArtifact`, `LoadFailed`, `SymbolNotFound`) can only
//! come out of handle construction. Everything else is per call.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the execution bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The engine library does not exist where it was expected
    #[error("missing engine artifact {path}, have you run `cargo build --release -p bfbridge-engine`?")]
    MissingArtifact { path: PathBuf },

    /// The file exists but the dynamic loader rejected it
    #[error("failed to load engine '{path}': {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    /// The library does not export one of the two entry points
    #[error("symbol '{symbol}' not found in '{path}': {reason}")]
    SymbolNotFound {
        symbol: String,
        path: PathBuf,
        reason: String,
    },

    /// The program cannot be handed over as a NUL-terminated buffer
    #[error("program contains a NUL byte at offset {position}")]
    InvalidProgram { position: usize },

    /// The engine reported `success == 0`
    #[error("native execution failed")]
    ExecutionFailure,

    /// The caller stopped waiting before a result was delivered
    #[error("execution cancelled before a result was delivered")]
    Cancelled,

    /// The dispatch worker thread could not be started
    #[error("failed to spawn dispatch worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// The dispatch worker is shut down and accepts no more calls
    #[error("dispatch worker is not running")]
    WorkerUnavailable,

    /// The submitted job panicked on the worker thread
    #[error("dispatched job panicked: {0}")]
    WorkerPanicked(String),
}

impl BridgeError {
    /// Whether this error happened while setting the bridge up
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            BridgeError::MissingArtifact { .. }
                | BridgeError::LoadFailed { .. }
                | BridgeError::SymbolNotFound { .. }
        )
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the watchdog, session bootstrap, and daemon runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings error: {0}")]
    Core(#[from] sixtyfive_core::CoreError),

    #[error("sync error: {0}")]
    Sync(#[from] sixtyfive_sync::SyncError),

    /// The OS process table could not be enumerated; ends the watch loop.
    #[error("process enumeration failed: {0}")]
    ProcessTable(String),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("{task} task join failure: {message}")]
    Task { task: &'static str, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

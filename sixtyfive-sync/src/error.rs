//! Error types for sixtyfive-sync.

use std::path::PathBuf;

use thiserror::Error;

use sixtyfive_core::{AppName, CoreError};

/// Errors surfaced by sync engine operations.
///
/// `RemoteUnavailable` and `ArchiveFailure` are scoped to one application;
/// `reconcile_all` logs them and carries on with the others.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Download or upload against the remote store failed.
    #[error("remote store unavailable for {object}: {source}")]
    RemoteUnavailable {
        object: String,
        #[source]
        source: StoreError,
    },

    /// The operation named an application that is not in the registry.
    #[error("'{0}' is not a tracked application")]
    UnknownApplication(AppName),

    /// Packing or unpacking local save data failed.
    #[error("archive failure at {path}: {source}")]
    ArchiveFailure {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    /// The store session could not be established. Fatal at startup.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Registry codec, settings, or path expansion error.
    #[error("registry error: {0}")]
    Registry(#[from] CoreError),

    /// A blocking or per-application task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Errors from a [`crate::RemoteStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("store returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The requested object does not exist.
    #[error("object '{object}' not found")]
    NotFound { object: String },

    /// The response lacked usable file metadata.
    #[error("malformed file metadata: {0}")]
    Metadata(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store is deliberately offline (in-memory store).
    #[error("store offline")]
    Offline,

    /// No valid token and no way to obtain one.
    #[error("authentication failed: {0}")]
    Authentication(String),
}

/// Errors from the archive service.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Single-file mode found no entry to extract.
    #[error("archive has no entry for '{entry}'")]
    MissingEntry { entry: String },

    /// The path to pack does not exist.
    #[error("nothing to pack at {0}")]
    NothingToPack(PathBuf),
}

/// Convenience constructor for [`ArchiveError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.into(),
        source,
    }
}

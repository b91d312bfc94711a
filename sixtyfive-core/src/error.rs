//! Error types for sixtyfive-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from registry, settings, and path operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (settings save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Settings file exists but is not valid YAML for [`crate::Settings`].
    #[error("failed to parse settings at {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The remote registry document could not be encoded or decoded.
    #[error("registry JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.sixtyfive/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A save path referenced a variable missing from the expansion table.
    #[error("unknown variable '{name}' in path '{path}'")]
    UnknownVariable { name: String, path: String },
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}

//! Local, per-machine settings.
//!
//! # Storage layout
//!
//! ```text
//! ~/.sixtyfive/
//!   settings.yaml   (optional: every field has a default; mode 0600)
//!   token.txt       (store access token, written by the auth flow)
//! ```
//!
//! # API pattern
//!
//! Every loader and writer takes an explicit `home` (`fn_at(home: &Path, …)`),
//! so tests can point it at a `TempDir`. Callers resolve the real one with
//! [`home`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::registry::REGISTRY_OBJECT;
use crate::types::HostId;

/// Default watchdog polling interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Contents of `~/.sixtyfive/settings.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Object name of the registry document in the remote store.
    pub registry_object: String,
    /// Where the store access token is kept; defaults to `~/.sixtyfive/token.txt`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,
    /// OAuth application key, needed only to issue a new token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    /// Overrides the detected host name as this machine's [`HostId`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub poll_interval_ms: u64,
    /// Extra placeholder values for save-path expansion.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry_object: REGISTRY_OBJECT.to_string(),
            token_path: None,
            app_key: None,
            app_secret: None,
            host: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            env: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Token file location, resolving the default against `home`.
    pub fn token_path_at(&self, home: &Path) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| sixtyfive_dir_at(home).join("token.txt"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Configured host override, or `detected` when none is set.
    pub fn host_id(&self, detected: impl FnOnce() -> String) -> HostId {
        match self.host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => HostId::from(host),
            _ => HostId::from(detected()),
        }
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.sixtyfive/`: pure, no I/O.
pub fn sixtyfive_dir_at(home: &Path) -> PathBuf {
    home.join(".sixtyfive")
}

/// `<home>/.sixtyfive/settings.yaml`: pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    sixtyfive_dir_at(home).join("settings.yaml")
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load settings; a missing file yields [`Settings::default`].
///
/// Returns `CoreError::SettingsParse` (with path context) on malformed YAML.
pub fn load_at(home: &Path) -> Result<Settings, CoreError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| CoreError::SettingsParse { path, source: e })
}

/// Atomically save settings: serialize → `.yaml.tmp` → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, settings: &Settings) -> Result<(), CoreError> {
    let yaml = serde_yaml::to_string(settings)?;
    write_private_at(&settings_path_at(home), yaml.as_bytes())
}

/// Atomically write `contents` to `path` with owner-only permissions.
///
/// Creates the parent directory (mode `0700`) if needed. The `.tmp` sibling is
/// in the same directory as the target, so the rename never crosses
/// filesystems.
pub fn write_private_at(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            set_dir_permissions(dir)?;
        }
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, contents).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

/// The current user's home directory.
pub fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

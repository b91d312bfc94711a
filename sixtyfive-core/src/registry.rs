//! Application registry: lookup, mutation operators, and the JSON codec.
//!
//! # Remote layout
//!
//! ```text
//! /configs.json          (registry document, see [`Config`])
//! /data/<stem>.zip       (one archive per tracked application)
//! ```
//!
//! The registry is always kept sorted by case-insensitive application name and
//! never holds two entries with the same name. Persisting the document is the
//! caller's job; nothing in this module performs I/O.

use crate::error::CoreError;
use crate::types::{AppConfig, AppName, Config, HostId};

/// Default object name of the registry document in the remote store.
pub const REGISTRY_OBJECT: &str = "configs.json";

/// Remote folder that holds per-application archives.
pub const ARCHIVE_DIR: &str = "data";

// ---------------------------------------------------------------------------
// 1. Object naming
// ---------------------------------------------------------------------------

/// Deterministic archive object name for an application.
///
/// A trailing `exe` extension is swapped for `zip` (`Game.exe` →
/// `data/Game.zip`); any other name gets `.zip` appended.
pub fn archive_object_name(name: &AppName) -> String {
    let raw = name.as_str();
    let stem = match raw.len().checked_sub(4) {
        Some(cut) if raw.is_char_boundary(cut) && raw[cut..].eq_ignore_ascii_case(".exe") => {
            &raw[..cut]
        }
        _ => raw,
    };
    format!("{ARCHIVE_DIR}/{stem}.zip")
}

// ---------------------------------------------------------------------------
// 2. Lookup and mutation
// ---------------------------------------------------------------------------

impl Config {
    /// Entry named `name`, if tracked.
    pub fn lookup(&self, name: &AppName) -> Option<&AppConfig> {
        self.applications.iter().find(|app| app.name == *name)
    }

    fn lookup_mut(&mut self, name: &AppName) -> Option<&mut AppConfig> {
        self.applications.iter_mut().find(|app| app.name == *name)
    }

    /// Names of every tracked application, in registry order.
    pub fn names(&self) -> Vec<AppName> {
        self.applications.iter().map(|app| app.name.clone()).collect()
    }

    /// Insert `app`, replacing any entry with the same name, and re-sort.
    ///
    /// Returns the replaced entry.
    pub fn add_or_update(&mut self, app: AppConfig) -> Option<AppConfig> {
        let replaced = self.remove(&app.name);
        self.applications.push(app);
        self.applications.sort_by(|a, b| a.name.cmp(&b.name));
        replaced
    }

    /// Remove the entry named `name`; `None` when it was not tracked.
    pub fn remove(&mut self, name: &AppName) -> Option<AppConfig> {
        let index = self.applications.iter().position(|app| app.name == *name)?;
        Some(self.applications.remove(index))
    }

    /// Timestamp `host` last recorded as in sync for `name`.
    pub fn last_synced(&self, name: &AppName, host: &HostId) -> Option<i64> {
        self.lookup(name)?.last_modified.get(host).copied()
    }

    /// Record `modified_ms` as `host`'s last synced time for `name`.
    ///
    /// Returns `false` when `name` is not tracked.
    pub fn record_sync(&mut self, name: &AppName, host: &HostId, modified_ms: i64) -> bool {
        match self.lookup_mut(name) {
            Some(app) => {
                app.last_modified.insert(host.clone(), modified_ms);
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // 3. JSON codec
    // -----------------------------------------------------------------------

    /// Decode a registry document, normalising order and duplicate names.
    pub fn from_json(bytes: &[u8]) -> Result<Config, CoreError> {
        let raw: Config = serde_json::from_slice(bytes)?;
        let mut config = Config::default();
        for app in raw.applications {
            config.add_or_update(app);
        }
        Ok(config)
    }

    /// Encode as pretty-printed JSON for upload.
    pub fn to_json(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

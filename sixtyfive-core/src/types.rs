//! Domain types for the Sixtyfive registry.
//!
//! The registry is a single JSON document stored remotely; every type here is
//! serializable via serde + serde_json with snake_case field names.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a tracked application; doubles as the executable base name the
/// watchdog looks for (e.g. `Game.exe`).
///
/// Equality, hashing and ordering ignore case, so `game.EXE` and `Game.exe`
/// denote the same application. The original spelling is preserved for
/// display and serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppName(pub String);

impl AppName {
    /// Case-folded form used for comparisons.
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `executable` (a process base name) refers to this application.
    pub fn matches(&self, executable: &str) -> bool {
        self.key() == executable.to_lowercase()
    }
}

impl PartialEq for AppName {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AppName {}

impl Hash for AppName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for AppName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AppName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for AppName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AppName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Stable identifier of a machine; key into [`AppConfig::last_modified`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub String);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for HostId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One tracked application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: AppName,
    /// Unexpanded local path; may contain `%VAR%` / `${VAR}` placeholders.
    pub save_path: String,
    /// `true` when `save_path` is a directory archived as a tree.
    #[serde(default)]
    pub is_folder: bool,
    /// Epoch milliseconds each host last observed as in sync with the remote.
    #[serde(default)]
    pub last_modified: BTreeMap<HostId, i64>,
}

impl AppConfig {
    /// A freshly tracked application with no sync history.
    pub fn tracked(name: AppName, save_path: impl Into<String>, is_folder: bool) -> Self {
        Self {
            name,
            save_path: save_path.into(),
            is_folder,
            last_modified: BTreeMap::new(),
        }
    }
}

/// Root of the remote registry document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub applications: Vec<AppConfig>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn newtype_display() {
        assert_eq!(AppName::from("Game.exe").to_string(), "Game.exe");
        assert_eq!(HostId::from("desk").to_string(), "desk");
    }

    #[test]
    fn app_name_ignores_case() {
        let a = AppName::from("Game.exe");
        let b = AppName::from(String::from("game.EXE"));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn app_name_orders_case_insensitively() {
        let mut names = vec![
            AppName::from("zelda.exe"),
            AppName::from("Alpha.exe"),
            AppName::from("beta.exe"),
        ];
        names.sort();
        let sorted: Vec<_> = names.iter().map(AppName::as_str).collect();
        assert_eq!(sorted, ["Alpha.exe", "beta.exe", "zelda.exe"]);
    }

    #[test]
    fn app_name_matches_executable() {
        assert!(AppName::from("Game.exe").matches("GAME.exe"));
        assert!(!AppName::from("Game.exe").matches("Game"));
    }

    #[test]
    fn app_config_defaults_missing_fields() {
        let json = r#"{"name":"Game.exe","save_path":"%APPDATA%/Game"}"#;
        let app: AppConfig = serde_json::from_str(json).expect("deserialize");
        assert!(!app.is_folder);
        assert!(app.last_modified.is_empty());
    }
}

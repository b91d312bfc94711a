//! Save-path placeholder expansion.
//!
//! Save paths are stored unexpanded in the shared registry so that one entry
//! works on every host (`%APPDATA%/Game`, `${HOME}/.local/share/game`). The
//! expansion table is built once at startup from the process environment,
//! the detected Steam library (`%STEAM%`), and the user's settings overrides, and
//! then passed around explicitly.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::CoreError;

/// Variable name under which the Steam `steamapps/common` directory is exposed.
pub const STEAM_VAR: &str = "STEAM";

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"%([^%/\\]+)%|\$\{([^}]+)\}").expect("placeholder pattern is valid")
    })
}

/// Explicit variable table used to expand `%VAR%` and `${VAR}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathExpander {
    vars: HashMap<String, String>,
}

impl PathExpander {
    /// Process environment, then the detected Steam library, then `overrides`.
    pub fn from_environment(home: &Path, overrides: &BTreeMap<String, String>) -> Self {
        let mut vars: HashMap<String, String> = std::env::vars().collect();
        if let Some(steam) = detect_steam_library(home) {
            vars.insert(STEAM_VAR.to_string(), steam.to_string_lossy().into_owned());
        }
        vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { vars }
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    fn resolve(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.vars.get(name) {
            return Some(value);
        }
        // Windows variable names are case-insensitive.
        self.vars
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Replace every placeholder in `raw`.
    ///
    /// Returns [`CoreError::UnknownVariable`] for the first placeholder that is
    /// missing from the table.
    pub fn expand(&self, raw: &str) -> Result<PathBuf, CoreError> {
        let mut out = String::with_capacity(raw.len());
        let mut last = 0;
        for caps in placeholder().captures_iter(raw) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2)))
            else {
                continue;
            };
            let value = self
                .resolve(name.as_str())
                .ok_or_else(|| CoreError::UnknownVariable {
                    name: name.as_str().to_string(),
                    path: raw.to_string(),
                })?;
            out.push_str(&raw[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&raw[last..]);
        Ok(PathBuf::from(out))
    }
}

/// Locate `<steam>/steamapps/common`, if Steam is installed.
#[cfg(windows)]
pub fn detect_steam_library(_home: &Path) -> Option<PathBuf> {
    let output = std::process::Command::new("reg")
        .args(["query", r"HKEY_CURRENT_USER\SOFTWARE\Valve\Steam", "/v", "SteamPath"])
        .output()
        .ok();
    let root = output
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .and_then(|text| parse_reg_sz(&text))
        .unwrap_or_else(|| PathBuf::from(r"C:\Program Files (x86)\Steam"));
    Some(root.join("steamapps").join("common"))
}

/// Locate `<steam>/steamapps/common`, if Steam is installed.
#[cfg(not(windows))]
pub fn detect_steam_library(home: &Path) -> Option<PathBuf> {
    [
        home.join(".steam").join("steam"),
        home.join(".local").join("share").join("Steam"),
        home.join("Library").join("Application Support").join("Steam"),
    ]
    .into_iter()
    .find(|candidate| candidate.is_dir())
    .map(|root| root.join("steamapps").join("common"))
}

/// Value of the `REG_SZ` column in `reg query` output.
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_reg_sz(text: &str) -> Option<PathBuf> {
    text.lines()
        .find_map(|line| line.split_once("REG_SZ"))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn expander() -> PathExpander {
        PathExpander::default()
            .with_var("APPDATA", "/users/me/appdata")
            .with_var("STEAM", "/games/steamapps/common")
    }

    #[test]
    fn expands_percent_placeholders() {
        let path = expander().expand("%APPDATA%/Game/saves").expect("expand");
        assert_eq!(path, PathBuf::from("/users/me/appdata/Game/saves"));
    }

    #[test]
    fn expands_braced_placeholders_and_multiple_vars() {
        let path = expander()
            .expand("${STEAM}/Foo/%APPDATA%")
            .expect("expand");
        assert_eq!(path, PathBuf::from("/games/steamapps/common/Foo//users/me/appdata"));
    }

    #[test]
    fn lookup_falls_back_to_case_insensitive_name() {
        let path = expander().expand("%appdata%/x").expect("expand");
        assert_eq!(path, PathBuf::from("/users/me/appdata/x"));
    }

    #[test]
    fn plain_path_is_untouched() {
        let path = expander().expand("/srv/saves/game.sav").expect("expand");
        assert_eq!(path, PathBuf::from("/srv/saves/game.sav"));
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let err = expander().expand("%NOPE%/x").unwrap_err();
        assert!(matches!(err, CoreError::UnknownVariable { ref name, .. } if name == "NOPE"));
        assert!(err.to_string().contains("%NOPE%/x"));
    }

    #[test]
    fn overrides_win_over_environment() {
        let home = TempDir::new().expect("home");
        let mut overrides = BTreeMap::new();
        overrides.insert("SIXTYFIVE_TEST_DIR".to_string(), "/override".to_string());
        let path = PathExpander::from_environment(home.path(), &overrides)
            .expand("%SIXTYFIVE_TEST_DIR%/a")
            .expect("expand");
        assert_eq!(path, PathBuf::from("/override/a"));
    }

    #[cfg(not(windows))]
    #[test]
    fn steam_library_detected_under_home() {
        let home = TempDir::new().expect("home");
        assert_eq!(detect_steam_library(home.path()), None);

        let root = home.path().join(".steam").join("steam");
        std::fs::create_dir_all(&root).expect("mkdir");
        assert_eq!(
            detect_steam_library(home.path()),
            Some(root.join("steamapps").join("common"))
        );
    }

    #[test]
    fn reg_query_output_is_parsed() {
        let text = "\r\nHKEY_CURRENT_USER\\SOFTWARE\\Valve\\Steam\r\n    SteamPath    REG_SZ    c:/program files (x86)/steam\r\n";
        assert_eq!(
            parse_reg_sz(text),
            Some(PathBuf::from("c:/program files (x86)/steam"))
        );
        assert_eq!(parse_reg_sz("ERROR: not found"), None);
    }
}

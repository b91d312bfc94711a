//! `sixtyfive list|path|add|remove`: registry inspection and mutation.

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use sixtyfive_core::{AppConfig, AppName, HostId};

use super::{with_session, AppArg};

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Application (executable) name, e.g. `Game.exe`.
    pub app: String,

    /// Save location; `%VAR%` and `${VAR}` placeholders are expanded.
    pub path: String,
}

impl AddArgs {
    pub fn run(self) -> Result<()> {
        let name = AppName::from(self.app.as_str());
        let path = self.path;
        let app = with_session(|session| async move {
            session
                .engine
                .add_or_update(&name, &path)
                .await
                .with_context(|| format!("failed to add {name}"))
        })?;
        println!(
            "{} {} -> {} ({})",
            "tracking".green(),
            app.name,
            app.save_path,
            kind(&app)
        );
        Ok(())
    }
}

pub fn remove(app: AppArg) -> Result<()> {
    let name = app.name();
    let removed = with_session(|session| async move {
        session
            .engine
            .remove(&name)
            .await
            .with_context(|| format!("failed to remove {name}"))
    })?;
    println!("{} {}", "removed".yellow(), removed.name);
    Ok(())
}

pub fn path(app: AppArg) -> Result<()> {
    let name = app.name();
    let path = with_session(|session| async move {
        session
            .engine
            .expanded_path(&name)
            .await
            .with_context(|| format!("failed to resolve the save path of {name}"))
    })?;
    println!("{}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct AppRow {
    #[tabled(rename = "Application")]
    name: String,
    #[tabled(rename = "Save path")]
    save_path: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "Last sync (this host)")]
    last_sync: String,
}

pub fn list() -> Result<()> {
    let (host, config) = with_session(|session| async move {
        let host = session.engine.host().clone();
        Ok::<_, anyhow::Error>((host, session.engine.snapshot().await))
    })?;

    if config.applications.is_empty() {
        println!("No applications tracked.");
        println!("Run: sixtyfive add <APP> <PATH>");
        return Ok(());
    }

    println!(
        "Sixtyfive v{} | host {} | {} applications",
        env!("CARGO_PKG_VERSION"),
        host.to_string().bold(),
        config.applications.len()
    );
    let rows: Vec<AppRow> = config
        .applications
        .iter()
        .map(|app| row(app, &host))
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn row(app: &AppConfig, host: &HostId) -> AppRow {
    AppRow {
        name: app.name.to_string(),
        save_path: app.save_path.clone(),
        kind: kind(app),
        last_sync: app
            .last_modified
            .get(host)
            .map(|ms| format_ms(*ms))
            .unwrap_or_else(|| "never".to_string()),
    }
}

fn kind(app: &AppConfig) -> &'static str {
    if app.is_folder {
        "folder"
    } else {
        "file"
    }
}

/// Epoch milliseconds as local time.
pub(crate) fn format_ms(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ms.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_shows_this_hosts_sync_or_never() {
        let mut app = AppConfig::tracked(AppName::from("Game.exe"), "%STEAM%/Game/saves", true);
        app.last_modified.insert(HostId::from("couch"), 0);

        let never = row(&app, &HostId::from("desk"));
        assert_eq!(never.last_sync, "never");
        assert_eq!(never.kind, "folder");

        let synced = row(&app, &HostId::from("couch"));
        assert_eq!(synced.last_sync, format_ms(0));
        assert_ne!(synced.last_sync, "never");
    }
}

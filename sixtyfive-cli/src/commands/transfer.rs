//! `sixtyfive push|pull|sync <APP>`

use anyhow::{Context, Result};
use colored::Colorize;

use sixtyfive_sync::SyncOutcome;

use super::apps::format_ms;
use super::{with_session, AppArg};

pub fn push(app: AppArg) -> Result<()> {
    let name = app.name();
    let outcome = with_session(|session| async move {
        session
            .engine
            .push(&name)
            .await
            .with_context(|| format!("failed to back up {name}"))
    })?;
    report(&app.app, outcome);
    Ok(())
}

pub fn pull(app: AppArg) -> Result<()> {
    let name = app.name();
    let outcome = with_session(|session| async move {
        session
            .engine
            .pull(&name)
            .await
            .with_context(|| format!("failed to restore {name}"))
    })?;
    report(&app.app, outcome);
    Ok(())
}

pub fn sync(app: AppArg) -> Result<()> {
    let name = app.name();
    let outcome = with_session(|session| async move {
        session
            .engine
            .reconcile(&name)
            .await
            .with_context(|| format!("failed to synchronize {name}"))
    })?;
    report(&app.app, outcome);
    Ok(())
}

fn report(app: &str, outcome: SyncOutcome) {
    println!("{}", describe(app, outcome));
}

fn describe(app: &str, outcome: SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Pulled { remote_modified } => {
            let at = format_ms(remote_modified);
            format!("{} {app} (remote copy from {at})", "restored".green())
        }
        SyncOutcome::Pushed { remote_modified } => {
            let at = format_ms(remote_modified);
            format!("{} {app} (uploaded at {at})", "backed up".green())
        }
        SyncOutcome::Unchanged => format!("{} {app}", "up to date".bright_black()),
    }
}

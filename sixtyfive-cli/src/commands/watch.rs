//! `sixtyfive` / `sixtyfive watch`: startup reconciliation plus the process
//! watchdog, until Ctrl-C.

use anyhow::{Context, Result};

pub fn run() -> Result<()> {
    let home = super::home()?;
    sixtyfive_daemon::start_blocking(&home).context("sixtyfive daemon stopped")
}

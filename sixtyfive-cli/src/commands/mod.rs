pub mod apps;
pub mod transfer;
pub mod watch;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use sixtyfive_core::{settings, AppName};
use sixtyfive_daemon::{build_runtime, init_tracing, open_session, Session};

/// Single application argument.
#[derive(Args, Debug)]
pub struct AppArg {
    /// Application (executable) name, e.g. `Game.exe`. Case-insensitive.
    pub app: String,
}

impl AppArg {
    pub fn name(&self) -> AppName {
        AppName::from(self.app.as_str())
    }
}

fn home() -> Result<PathBuf> {
    Ok(settings::home()?)
}

/// Open a session and run `command` against it on a fresh runtime.
pub(crate) fn with_session<F, Fut, T>(command: F) -> Result<T>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    init_tracing();
    let home = home()?;
    let runtime = build_runtime()?;
    runtime.block_on(async {
        let session = open_session(&home)
            .await
            .context("failed to open a sync session")?;
        command(session).await
    })
}

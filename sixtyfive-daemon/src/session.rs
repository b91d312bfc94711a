//! Startup: settings, path expansion, host identity, remote sign-in, and the
//! registry download. Shared by the daemon and every CLI command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sysinfo::System;
use tracing::info;

use sixtyfive_core::{settings, HostId, PathExpander, Settings};
use sixtyfive_sync::{DropboxClient, RemoteStore, SyncEngine, SyncError};

use crate::error::DaemonError;

pub struct Session {
    pub home: PathBuf,
    pub settings: Settings,
    pub engine: SyncEngine,
}

/// Sign in to Dropbox and load the registry. Authentication failures are
/// returned as [`SyncError::AuthenticationFailure`].
pub async fn open_session(home: &Path) -> Result<Session, DaemonError> {
    let settings = settings::load_at(home)?;

    let client = DropboxClient::connect(&settings, home)
        .await
        .map_err(|e| SyncError::AuthenticationFailure(e.to_string()))?;
    let user = client
        .current_user_display_name()
        .await
        .map_err(|e| SyncError::AuthenticationFailure(e.to_string()))?;
    info!(user = %user, "signed in");

    let engine = open_with_store(home, &settings, Arc::new(client)).await?;
    Ok(Session {
        home: home.to_path_buf(),
        settings,
        engine,
    })
}

/// Build the engine over an already-connected `store`.
pub async fn open_with_store(
    home: &Path,
    settings: &Settings,
    store: Arc<dyn RemoteStore>,
) -> Result<SyncEngine, DaemonError> {
    let expander = PathExpander::from_environment(home, &settings.env);
    let host = host_id(settings);
    info!(host = %host, registry = %settings.registry_object, "loading registry");
    Ok(SyncEngine::load(store, expander, host, &settings.registry_object).await?)
}

/// Configured host override, else the OS host name.
pub fn host_id(settings: &Settings) -> HostId {
    settings.host_id(|| System::host_name().unwrap_or_else(|| "localhost".to_string()))
}

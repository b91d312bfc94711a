//! Sync engine: push, pull, and timestamp reconciliation per application.
//!
//! # Decision table (`reconcile`)
//!
//! | this host's record `t` | local save | action                                  |
//! |------------------------|------------|-----------------------------------------|
//! | `t < remote`           | any        | pull                                    |
//! | `t > remote`           | any        | push                                    |
//! | `t == remote`          | any        | nothing                                 |
//! | none                   | no files   | pull                                    |
//! | none                   | present    | backup copy, then compare newest mtime  |
//!
//! All registry writes go through the engine's `RwLock`, so concurrent tasks
//! never lose each other's timestamp updates. Registry uploads are serialized
//! behind a separate gate and each one snapshots the shared copy while holding
//! it, so the last upload always carries every recorded update.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use sixtyfive_core::{archive_object_name, AppConfig, AppName, Config, HostId, PathExpander};

use crate::archive;
use crate::error::{ArchiveError, StoreError, SyncError};
use crate::store::{RemoteObject, RemoteStore};

/// What an operation did for one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Remote data was unpacked locally.
    Pulled { remote_modified: i64 },
    /// Local data was uploaded.
    Pushed { remote_modified: i64 },
    /// Local and remote already agree.
    Unchanged,
}

/// Per-application results of [`SyncEngine::reconcile_all`].
pub type ReconcileReport = Vec<(AppName, Result<SyncOutcome, SyncError>)>;

/// Shared handle; cloning is cheap and every clone sees the same registry.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    config: Arc<RwLock<Config>>,
    expander: Arc<PathExpander>,
    host: HostId,
    registry_object: Arc<str>,
    persist_gate: Arc<Mutex<()>>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        config: Config,
        expander: PathExpander,
        host: HostId,
        registry_object: &str,
    ) -> Self {
        Self {
            store,
            config: Arc::new(RwLock::new(config)),
            expander: Arc::new(expander),
            host,
            registry_object: Arc::from(registry_object),
            persist_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Download the registry document and build an engine around it.
    ///
    /// A missing document starts an empty registry; any other store failure is
    /// returned as `RemoteUnavailable`.
    pub async fn load(
        store: Arc<dyn RemoteStore>,
        expander: PathExpander,
        host: HostId,
        registry_object: &str,
    ) -> Result<Self, SyncError> {
        let config = match store.download(registry_object).await {
            Ok(object) => Config::from_json(&object.data)?,
            Err(StoreError::NotFound { .. }) => {
                warn!(object = registry_object, "no registry in store yet, starting empty");
                Config::default()
            }
            Err(source) => {
                return Err(SyncError::RemoteUnavailable {
                    object: registry_object.to_string(),
                    source,
                })
            }
        };
        debug!(apps = config.applications.len(), "registry loaded");
        Ok(Self::new(store, config, expander, host, registry_object))
    }

    pub fn host(&self) -> &HostId {
        &self.host
    }

    /// Copy of the current in-memory registry.
    pub async fn snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn app_names(&self) -> Vec<AppName> {
        self.config.read().await.names()
    }

    /// Registry entry for `name`; warns and fails with `UnknownApplication`
    /// when it is not tracked.
    pub async fn lookup(&self, name: &AppName) -> Result<AppConfig, SyncError> {
        match self.config.read().await.lookup(name) {
            Some(app) => Ok(app.clone()),
            None => {
                warn!(app = %name, "application is not tracked");
                Err(SyncError::UnknownApplication(name.clone()))
            }
        }
    }

    /// `name`'s save path with placeholders expanded.
    pub async fn expanded_path(&self, name: &AppName) -> Result<PathBuf, SyncError> {
        let app = self.lookup(name).await?;
        Ok(self.expander.expand(&app.save_path)?)
    }

    // -----------------------------------------------------------------------
    // Pull / push
    // -----------------------------------------------------------------------

    /// Restore the remote copy of `name` into its local save path.
    pub async fn pull(&self, name: &AppName) -> Result<SyncOutcome, SyncError> {
        let app = self.lookup(name).await?;
        let remote = self.download(&archive_object_name(name)).await?;
        self.restore(&app, remote).await
    }

    async fn restore(&self, app: &AppConfig, remote: RemoteObject) -> Result<SyncOutcome, SyncError> {
        let path = self.expander.expand(&app.save_path)?;
        info!(app = %app.name, path = %path.display(), is_folder = app.is_folder, "restoring");

        let RemoteObject { data, modified_ms } = remote;
        let dest = path.clone();
        let is_folder = app.is_folder;
        blocking(move || archive::unpack(&data, &dest, is_folder))
            .await?
            .map_err(|source| SyncError::ArchiveFailure { path, source })?;

        self.record(&app.name, modified_ms).await?;
        info!(app = %app.name, remote_modified = modified_ms, "restored");
        Ok(SyncOutcome::Pulled {
            remote_modified: modified_ms,
        })
    }

    /// Upload the local save data of `name`.
    pub async fn push(&self, name: &AppName) -> Result<SyncOutcome, SyncError> {
        let app = self.lookup(name).await?;
        let path = self.expander.expand(&app.save_path)?;

        let source_path = path.clone();
        let is_folder = app.is_folder;
        let data = blocking(move || archive::pack(&source_path, is_folder))
            .await?
            .map_err(|source| SyncError::ArchiveFailure { path, source })?;

        let object = archive_object_name(name);
        let remote_modified = self
            .store
            .upload(data, &object)
            .await
            .map_err(|source| unavailable(&object, source))?;

        self.record(&app.name, remote_modified).await?;
        info!(app = %app.name, remote_modified, "backed up");
        Ok(SyncOutcome::Pushed { remote_modified })
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Decide between pull, push, and nothing for `name` (see module docs).
    pub async fn reconcile(&self, name: &AppName) -> Result<SyncOutcome, SyncError> {
        let app = self.lookup(name).await?;
        let last_synced = app.last_modified.get(&self.host).copied();
        let remote = self.download(&archive_object_name(name)).await?;

        match last_synced {
            Some(local) => self.decide(&app, local, remote).await,
            None => self.first_sync(&app, remote).await,
        }
    }

    async fn decide(
        &self,
        app: &AppConfig,
        local: i64,
        remote: RemoteObject,
    ) -> Result<SyncOutcome, SyncError> {
        match local.cmp(&remote.modified_ms) {
            Ordering::Less => self.restore(app, remote).await,
            Ordering::Greater => self.push(&app.name).await,
            Ordering::Equal => {
                info!(app = %app.name, "unchanged");
                Ok(SyncOutcome::Unchanged)
            }
        }
    }

    async fn first_sync(&self, app: &AppConfig, remote: RemoteObject) -> Result<SyncOutcome, SyncError> {
        info!(app = %app.name, host = %self.host, "never synchronized on this host");
        let path = self.expander.expand(&app.save_path)?;

        let scan = path.clone();
        let local = blocking(move || -> Result<Option<(i64, PathBuf)>, ArchiveError> {
            let Some(modified) = archive::latest_modified(&scan) else {
                return Ok(None);
            };
            let backup = archive::backup_copy(&scan)?;
            Ok(Some((modified, backup)))
        })
        .await?
        .map_err(|source| SyncError::ArchiveFailure { path, source })?;

        let Some((local_modified, backup)) = local else {
            info!(app = %app.name, "no local save, adopting remote copy");
            return self.restore(app, remote).await;
        };
        info!(
            app = %app.name,
            backup = %backup.display(),
            local_modified,
            remote_modified = remote.modified_ms,
            "kept a copy of the unsynced local save"
        );

        if local_modified == remote.modified_ms {
            self.record(&app.name, remote.modified_ms).await?;
            info!(app = %app.name, "unchanged");
            return Ok(SyncOutcome::Unchanged);
        }
        self.decide(app, local_modified, remote).await
    }

    /// Reconcile every tracked application concurrently and wait for all.
    ///
    /// Failures stay scoped to their application and are logged here.
    pub async fn reconcile_all(&self) -> ReconcileReport {
        let mut tasks = JoinSet::new();
        for name in self.app_names().await {
            let engine = self.clone();
            tasks.spawn(async move {
                let result = engine.reconcile(&name).await;
                (name, result)
            });
        }

        let mut report = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, result)) => {
                    if let Err(err) = &result {
                        error!(app = %name, error = %err, "reconciliation failed");
                    }
                    report.push((name, result));
                }
                Err(err) => error!(error = %err, "reconciliation task aborted"),
            }
        }
        report.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }

    // -----------------------------------------------------------------------
    // Registry mutation
    // -----------------------------------------------------------------------

    /// Track `name` at `save_path`, replacing any previous entry, and persist.
    pub async fn add_or_update(&self, name: &AppName, save_path: &str) -> Result<AppConfig, SyncError> {
        let expanded = self.expander.expand(save_path)?;
        let app = AppConfig::tracked(name.clone(), save_path, expanded.is_dir());
        let replaced = self.config.write().await.add_or_update(app.clone());
        if replaced.is_some() {
            info!(app = %name, path = save_path, "replaced existing entry");
        }
        self.persist().await?;
        info!(app = %name, path = save_path, is_folder = app.is_folder, "configuration updated");
        Ok(app)
    }

    /// Stop tracking `name` and persist. Unknown names warn and change nothing.
    pub async fn remove(&self, name: &AppName) -> Result<AppConfig, SyncError> {
        let removed = self.config.write().await.remove(name);
        let Some(removed) = removed else {
            warn!(app = %name, "application is not tracked");
            return Err(SyncError::UnknownApplication(name.clone()));
        };
        self.persist().await?;
        info!(app = %name, "removed from configuration");
        Ok(removed)
    }

    async fn record(&self, name: &AppName, modified_ms: i64) -> Result<(), SyncError> {
        let recorded = self
            .config
            .write()
            .await
            .record_sync(name, &self.host, modified_ms);
        if !recorded {
            warn!(app = %name, "application was removed while syncing");
            return Err(SyncError::UnknownApplication(name.clone()));
        }
        self.persist().await
    }

    /// Upload the registry document.
    async fn persist(&self) -> Result<(), SyncError> {
        let _gate = self.persist_gate.lock().await;
        let json = self.config.read().await.to_json()?;
        let modified = self
            .store
            .upload(json, &self.registry_object)
            .await
            .map_err(|source| unavailable(&self.registry_object, source))?;
        debug!(modified, "registry persisted");
        Ok(())
    }

    async fn download(&self, object: &str) -> Result<RemoteObject, SyncError> {
        self.store.download(object).await.map_err(|source| {
            warn!(object, error = %source, "download failed");
            unavailable(object, source)
        })
    }
}

fn unavailable(object: &str, source: StoreError) -> SyncError {
    SyncError::RemoteUnavailable {
        object: object.to_string(),
        source,
    }
}

async fn blocking<T, F>(work: F) -> Result<T, SyncError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| SyncError::Task(err.to_string()))
}

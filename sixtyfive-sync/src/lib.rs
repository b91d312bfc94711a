//! # sixtyfive-sync
//!
//! Save-data synchronization against a remote store.
//!
//! Build a [`SyncEngine`] with [`SyncEngine::load`] and call
//! [`SyncEngine::reconcile_all`] at startup, [`SyncEngine::push`] after a
//! watched process exits, or [`SyncEngine::pull`] to restore on demand.

pub mod archive;
pub mod dropbox;
pub mod engine;
pub mod error;
pub mod store;

pub use dropbox::DropboxClient;
pub use engine::{ReconcileReport, SyncEngine, SyncOutcome};
pub use error::{ArchiveError, StoreError, SyncError};
pub use store::{MemoryStore, RemoteObject, RemoteStore};

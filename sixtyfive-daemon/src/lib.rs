//! Daemon side of sixtyfive: process watchdog, session bootstrap, and the
//! watch-and-backup runtime.

mod error;
mod runtime;
pub mod session;
pub mod watchdog;

pub use error::DaemonError;
pub use runtime::{build_runtime, init_tracing, run, start_blocking, ReconcileSummary};
pub use session::{open_session, open_with_store, Session};
pub use watchdog::{
    LiveProcess, ProcessExit, ProcessTable, ProcessWatchdog, SysinfoTable, WatchHandle,
};

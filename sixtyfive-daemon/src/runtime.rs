use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use sixtyfive_core::AppName;
use sixtyfive_sync::{ReconcileReport, SyncEngine, SyncOutcome};

use crate::error::{io_err, DaemonError};
use crate::session::open_session;
use crate::watchdog::{ProcessExit, ProcessTable, ProcessWatchdog, SysinfoTable};

/// Counts from the startup reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub pulled: usize,
    pub pushed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    pub fn from_report(report: &ReconcileReport) -> Self {
        let mut summary = Self::default();
        for (_, result) in report {
            match result {
                Ok(SyncOutcome::Pulled { .. }) => summary.pulled += 1,
                Ok(SyncOutcome::Pushed { .. }) => summary.pushed += 1,
                Ok(SyncOutcome::Unchanged) => summary.unchanged += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }
}

/// Multi-thread runtime used by the daemon and the CLI commands.
pub fn build_runtime() -> Result<Runtime, DaemonError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))
}

/// Sign in, reconcile, and watch until Ctrl-C. Blocks the current thread.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = build_runtime()?;
    runtime.block_on(async {
        let session = open_session(home).await?;
        let interval = session.settings.poll_interval();

        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let signal_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received ctrl-c, shutting down"),
                Err(err) => error!(error = %err, "ctrl-c handler failed, shutting down"),
            }
            let _ = shutdown_tx.send(());
        });

        let result = run(
            session.engine,
            Arc::new(SysinfoTable::new()),
            interval,
            shutdown_rx,
        )
        .await;
        signal_handle.abort();
        result
    })
}

/// Startup reconciliation, then push after every watched process exit.
///
/// Returns `Ok` on shutdown and an error when the watchdog stops.
pub async fn run(
    engine: SyncEngine,
    table: Arc<dyn ProcessTable>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let report = engine.reconcile_all().await;
    let summary = ReconcileSummary::from_report(&report);
    info!(
        pulled = summary.pulled,
        pushed = summary.pushed,
        unchanged = summary.unchanged,
        failed = summary.failed,
        "startup reconciliation finished"
    );

    let (watchdog, mut exits) = ProcessWatchdog::new(table, interval);
    let handle = watchdog.handle();
    for name in engine.app_names().await {
        handle.register(name);
    }
    let mut watchdog_task = tokio::spawn(watchdog.run());
    let mut pushes: JoinSet<(AppName, bool)> = JoinSet::new();

    let result = loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break Ok(()),
            joined = &mut watchdog_task => {
                break match handle_join("watchdog", joined) {
                    Ok(()) => Err(DaemonError::ChannelClosed("watchdog stopped")),
                    Err(err) => Err(err),
                };
            }
            exit = exits.recv() => {
                let Some(ProcessExit { name, pid }) = exit else {
                    break Err(DaemonError::ChannelClosed("process exits"));
                };
                handle.register(name.clone());
                info!(app = %name, pid, "backing up after exit");
                let engine = engine.clone();
                pushes.spawn(async move {
                    let ok = match engine.push(&name).await {
                        Ok(_) => true,
                        Err(err) => {
                            error!(app = %name, error = %err, "backup after exit failed");
                            false
                        }
                    };
                    (name, ok)
                });
            }
            Some(done) = pushes.join_next() => log_push(done),
        }
    };

    watchdog_task.abort();
    if !pushes.is_empty() {
        info!(in_flight = pushes.len(), "waiting for backups to finish");
    }
    while let Some(done) = pushes.join_next().await {
        log_push(done);
    }
    result
}

fn log_push(done: Result<(AppName, bool), tokio::task::JoinError>) {
    match done {
        Ok((name, true)) => info!(app = %name, "backup after exit finished"),
        Ok((_, false)) => {}
        Err(err) => warn!(error = %err, "backup task aborted"),
    }
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task {
            task,
            message: err.to_string(),
        }),
    }
}

/// Install the global `tracing` subscriber on stderr. `RUST_LOG` overrides `info`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

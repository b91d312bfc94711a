//! Process watchdog: polls the OS process table for registered executable
//! names and publishes one [`ProcessExit`] per observed process instance.
//!
//! A registered name sits in the pending set until a live process with that
//! base name shows up. It then leaves the pending set and an exit
//! continuation follows the process id until it disappears. The name is only
//! watched again once the consumer calls [`WatchHandle::register`].

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, System};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sixtyfive_core::AppName;

use crate::error::DaemonError;

/// One entry of a process-table snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveProcess {
    pub pid: u32,
    /// Executable base name, e.g. `Game.exe`.
    pub name: String,
}

/// Exit notification for a watched process instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub name: AppName,
    pub pid: u32,
}

/// Source of process information.
pub trait ProcessTable: Send + Sync + 'static {
    /// Every live process. An error ends the watch loop.
    fn snapshot(&self) -> Result<Vec<LiveProcess>, DaemonError>;

    /// Whether `pid` still refers to a running process.
    fn is_alive(&self, pid: u32) -> bool;
}

// ---------------------------------------------------------------------------
// sysinfo-backed table
// ---------------------------------------------------------------------------

/// [`ProcessTable`] over the host OS via `sysinfo`.
pub struct SysinfoTable {
    system: Mutex<System>,
}

impl SysinfoTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn system(&self) -> MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SysinfoTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoTable {
    fn snapshot(&self) -> Result<Vec<LiveProcess>, DaemonError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(DaemonError::ProcessTable(
                "process listing is not supported on this platform".into(),
            ));
        }
        let mut system = self.system();
        system.refresh_processes_specifics(ProcessRefreshKind::new());
        let processes: Vec<LiveProcess> = system
            .processes()
            .iter()
            .map(|(pid, process)| LiveProcess {
                pid: pid.as_u32(),
                name: process.name().to_string(),
            })
            .collect();
        // At least this process is always listed.
        if processes.is_empty() {
            return Err(DaemonError::ProcessTable("process table is empty".into()));
        }
        Ok(processes)
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.system().refresh_process_specifics(Pid::from_u32(pid), ProcessRefreshKind::new())
    }
}

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

/// Cloneable registration handle onto a watchdog's pending set.
#[derive(Debug, Clone, Default)]
pub struct WatchHandle {
    pending: Arc<Mutex<BTreeSet<AppName>>>,
}

impl WatchHandle {
    fn pending_set(&self) -> MutexGuard<'_, BTreeSet<AppName>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Watch for the next start of `name`. Returns `false` if it was already
    /// pending.
    pub fn register(&self, name: AppName) -> bool {
        let added = self.pending_set().insert(name.clone());
        if added {
            debug!(app = %name, "watching");
        }
        added
    }

    pub fn is_pending(&self, name: &AppName) -> bool {
        self.pending_set().contains(name)
    }

    /// Names waiting to be observed, sorted.
    pub fn pending(&self) -> Vec<AppName> {
        self.pending_set().iter().cloned().collect()
    }

    /// Take every pending name that matches a live process; the first
    /// matching process in snapshot order wins.
    fn claim(&self, processes: &[LiveProcess]) -> Vec<(AppName, u32)> {
        let mut pending = self.pending_set();
        if pending.is_empty() {
            return Vec::new();
        }
        processes
            .iter()
            .filter_map(|process| {
                let name = pending.iter().find(|n| n.matches(&process.name))?.clone();
                pending.remove(&name);
                Some((name, process.pid))
            })
            .collect()
    }
}

pub struct ProcessWatchdog {
    table: Arc<dyn ProcessTable>,
    handle: WatchHandle,
    interval: Duration,
    exits: mpsc::UnboundedSender<ProcessExit>,
}

impl ProcessWatchdog {
    /// Build a watchdog and the receiving end of its exit channel.
    pub fn new(
        table: Arc<dyn ProcessTable>,
        interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ProcessExit>) {
        let (exits, rx) = mpsc::unbounded_channel();
        let watchdog = Self {
            table,
            handle: WatchHandle::default(),
            interval,
            exits,
        };
        (watchdog, rx)
    }

    pub fn handle(&self) -> WatchHandle {
        self.handle.clone()
    }

    /// Poll forever. Returns only when the process table cannot be read.
    pub async fn run(self) -> Result<(), DaemonError> {
        info!(interval_ms = self.interval.as_millis() as u64, "process watchdog started");
        loop {
            self.poll_once().await?;
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn poll_once(&self) -> Result<(), DaemonError> {
        let table = self.table.clone();
        let processes = blocking(move || table.snapshot()).await??;
        for (name, pid) in self.handle.claim(&processes) {
            info!(app = %name, pid, "started");
            tokio::spawn(follow_exit(
                self.table.clone(),
                name,
                pid,
                self.interval,
                self.exits.clone(),
            ));
        }
        Ok(())
    }
}

/// Exit continuation: waits for `pid` to disappear, then reports once.
async fn follow_exit(
    table: Arc<dyn ProcessTable>,
    name: AppName,
    pid: u32,
    interval: Duration,
    exits: mpsc::UnboundedSender<ProcessExit>,
) {
    loop {
        tokio::time::sleep(interval).await;
        let reader = table.clone();
        match blocking(move || reader.is_alive(pid)).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                warn!(app = %name, pid, error = %err, "liveness check failed, treating as exited");
                break;
            }
        }
    }
    info!(app = %name, pid, "exited");
    if exits.send(ProcessExit { name, pid }).is_err() {
        debug!(pid, "exit receiver dropped");
    }
}

/// Process-table reads scan `/proc` or call into Win32; keep them off the
/// runtime threads.
async fn blocking<T, F>(work: F) -> Result<T, DaemonError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| DaemonError::Task {
            task: "process table",
            message: err.to_string(),
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::{self, ThreadId};
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::time::sleep;

    const TICK: Duration = Duration::from_millis(100);

    /// Scriptable process table.
    #[derive(Default)]
    pub(crate) struct FakeTable {
        processes: Mutex<Vec<LiveProcess>>,
        broken: AtomicBool,
        readers: Mutex<Vec<ThreadId>>,
    }

    impl FakeTable {
        pub(crate) fn spawn(&self, pid: u32, name: &str) {
            self.processes.lock().unwrap().push(LiveProcess {
                pid,
                name: name.to_string(),
            });
        }

        pub(crate) fn kill(&self, pid: u32) {
            self.processes.lock().unwrap().retain(|p| p.pid != pid);
        }

        pub(crate) fn break_enumeration(&self) {
            self.broken.store(true, Ordering::SeqCst);
        }

        /// Threads that have read the table so far.
        fn readers(&self) -> Vec<ThreadId> {
            self.readers.lock().unwrap().clone()
        }

        fn note_reader(&self) {
            self.readers.lock().unwrap().push(thread::current().id());
        }
    }

    impl ProcessTable for FakeTable {
        fn snapshot(&self) -> Result<Vec<LiveProcess>, DaemonError> {
            self.note_reader();
            if self.broken.load(Ordering::SeqCst) {
                return Err(DaemonError::ProcessTable("access denied".into()));
            }
            Ok(self.processes.lock().unwrap().clone())
        }

        fn is_alive(&self, pid: u32) -> bool {
            self.note_reader();
            self.processes.lock().unwrap().iter().any(|p| p.pid == pid)
        }
    }

    fn start(table: &Arc<FakeTable>) -> (WatchHandle, mpsc::UnboundedReceiver<ProcessExit>) {
        let (watchdog, exits) = ProcessWatchdog::new(table.clone(), TICK);
        let handle = watchdog.handle();
        tokio::spawn(watchdog.run());
        (handle, exits)
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn exit_is_reported_once_and_rearms_on_register() {
        let table = Arc::new(FakeTable::default());
        table.spawn(7, "Game.exe");
        let (handle, mut exits) = start(&table);
        let game = AppName::from("game.EXE");
        assert!(handle.register(game.clone()));

        sleep(TICK * 2).await;
        assert!(!handle.is_pending(&game), "observed process leaves pending");

        table.kill(7);
        let exit = exits.recv().await.expect("exit event");
        assert_eq!(exit, ProcessExit { name: game.clone(), pid: 7 });

        sleep(TICK * 5).await;
        assert!(matches!(exits.try_recv(), Err(TryRecvError::Empty)));
        assert!(handle.pending().is_empty(), "not re-armed without register");

        assert!(handle.register(game.clone()));
        assert!(handle.is_pending(&game));
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn restart_is_ignored_until_registered_again() {
        let table = Arc::new(FakeTable::default());
        table.spawn(1, "Game.exe");
        let (handle, mut exits) = start(&table);
        handle.register(AppName::from("Game.exe"));

        sleep(TICK * 2).await;
        table.kill(1);
        assert_eq!(exits.recv().await.expect("first exit").pid, 1);

        table.spawn(2, "Game.exe");
        sleep(TICK * 3).await;
        table.kill(2);
        sleep(TICK * 3).await;
        assert!(matches!(exits.try_recv(), Err(TryRecvError::Empty)));

        table.spawn(3, "Game.exe");
        handle.register(AppName::from("Game.exe"));
        sleep(TICK * 2).await;
        table.kill(3);
        assert_eq!(exits.recv().await.expect("second exit").pid, 3);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn only_first_matching_process_is_followed() {
        let table = Arc::new(FakeTable::default());
        table.spawn(10, "Game.exe");
        table.spawn(11, "Game.exe");
        let (handle, mut exits) = start(&table);
        handle.register(AppName::from("Game.exe"));

        sleep(TICK * 2).await;
        table.kill(11);
        sleep(TICK * 3).await;
        assert!(matches!(exits.try_recv(), Err(TryRecvError::Empty)));

        table.kill(10);
        assert_eq!(exits.recv().await.expect("exit").pid, 10);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn absent_name_stays_pending() {
        let table = Arc::new(FakeTable::default());
        table.spawn(5, "Other.exe");
        let (handle, mut exits) = start(&table);
        let game = AppName::from("Game.exe");
        handle.register(game.clone());
        assert!(!handle.register(game.clone()), "second register is a no-op");

        sleep(TICK * 10).await;
        assert!(handle.is_pending(&game));
        assert!(matches!(exits.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn enumeration_failure_ends_run() {
        let table = Arc::new(FakeTable::default());
        let (watchdog, _exits) = ProcessWatchdog::new(table.clone(), TICK);
        let task = tokio::spawn(watchdog.run());

        sleep(TICK * 3).await;
        table.break_enumeration();

        let result = task.await.expect("join");
        assert!(matches!(result, Err(DaemonError::ProcessTable(_))));
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn table_is_read_off_the_runtime_thread() {
        let table = Arc::new(FakeTable::default());
        table.spawn(7, "Game.exe");
        let (handle, mut exits) = start(&table);
        handle.register(AppName::from("Game.exe"));

        sleep(TICK * 3).await;
        table.kill(7);
        exits.recv().await.expect("exit event");

        let runtime_thread = thread::current().id();
        let readers = table.readers();
        assert!(readers.len() >= 2, "snapshot and liveness reads recorded");
        assert!(
            readers.iter().all(|id| *id != runtime_thread),
            "process table must be read on blocking threads"
        );
    }

    #[test]
    fn sysinfo_table_lists_this_process() {
        let table = SysinfoTable::new();
        let me = std::process::id();
        let processes = table.snapshot().expect("snapshot");
        assert!(processes.iter().any(|p| p.pid == me));
        assert!(table.is_alive(me));
    }
}

//! Process lifecycle management
//!
//! This module owns the process table and everything that moves a
//! process between states: creation, signal-driven stops and kills,
//! exit, zombie bookkeeping and reaping. The manager behind the global
//! lock is the coarse process-table lock of the concurrency model; all
//! cross-process mutation happens through it.

use spin::Mutex;

pub mod exit;
pub mod manager;
pub mod process;
pub mod wait;

pub use manager::{ProcessManager, INIT_PID, MAX_PROCESSES};
pub use process::{AlarmTimer, Process, ProcessId, ProcessState, WaitTarget};

/// Wrapper tying the manager guard's lifetime to the global lock
pub struct ProcessManagerGuard {
    _guard: spin::MutexGuard<'static, Option<ProcessManager>>,
}

impl core::ops::Deref for ProcessManagerGuard {
    type Target = Option<ProcessManager>;

    fn deref(&self) -> &Self::Target {
        &*self._guard
    }
}

impl core::ops::DerefMut for ProcessManagerGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self._guard
    }
}

/// Global process manager
pub static PROCESS_MANAGER: Mutex<Option<ProcessManager>> = Mutex::new(None);

/// Initialize the process management system
pub fn init() {
    let manager = ProcessManager::new();
    *PROCESS_MANAGER.lock() = Some(manager);
    log::info!("Process management initialized");
}

/// Tear down the process management system
pub fn shutdown() {
    *PROCESS_MANAGER.lock() = None;
    log::info!("Process management shut down");
}

/// Get a reference to the global process manager
pub fn manager() -> ProcessManagerGuard {
    let guard = PROCESS_MANAGER.lock();
    ProcessManagerGuard { _guard: guard }
}

/// Execute a function with the global process manager
pub fn with_process_manager<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut ProcessManager) -> R,
{
    let mut manager_lock = PROCESS_MANAGER.lock();
    manager_lock.as_mut().map(f)
}

/// Get the current process ID
pub fn current_pid() -> Option<ProcessId> {
    let manager_lock = PROCESS_MANAGER.lock();
    let manager = manager_lock.as_ref()?;
    manager.current_pid()
}

/// Exit the current process
pub fn exit_current(exit_code: i32) {
    log::debug!("exit_current called with code {}", exit_code);

    if let Some(pid) = current_pid() {
        if let Some(ref mut manager) = *PROCESS_MANAGER.lock() {
            exit::process_exit(manager, pid, exit_code);
        } else {
            log::error!("Process manager not available!");
        }
    } else {
        log::error!("No current PID set!");
    }
}

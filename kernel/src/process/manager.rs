//! Process manager - the table every subsystem operates through
//!
//! Owns the pid-indexed process table, the ready queue and the aggregate
//! statistics. Cross-process mutation (a parent touching a child's
//! zombie links, a child waking its parent) always happens through a
//! `&mut ProcessManager`, which in the running kernel sits behind the
//! global process-table lock (see `process::manager()`).

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use super::exit::ExitStats;
use super::{Process, ProcessId, ProcessState};
use crate::error::KernelError;
use crate::signal::delivery::DeliveryStats;
use crate::syscall::SyscallStats;

/// Fixed capacity of the process table
pub const MAX_PROCESSES: usize = 256;

/// The init process adopts orphans and reaps their zombies
pub const INIT_PID: ProcessId = ProcessId::new(1);

/// Process manager handles all processes in the system
pub struct ProcessManager {
    /// All processes indexed by PID
    processes: BTreeMap<ProcessId, Process>,

    /// Currently running process
    current_pid: Option<ProcessId>,

    /// Next available PID
    next_pid: AtomicU64,

    /// Queue of ready processes
    ready_queue: Vec<ProcessId>,

    /// Aggregate signal-delivery statistics
    pub signal_stats: DeliveryStats,

    /// Aggregate exit/zombie statistics
    pub exit_stats: ExitStats,

    /// Per-syscall counters
    pub syscall_stats: SyscallStats,
}

impl ProcessManager {
    /// Create a new process manager
    pub fn new() -> Self {
        ProcessManager {
            processes: BTreeMap::new(),
            current_pid: None,
            next_pid: AtomicU64::new(1), // PIDs start at 1 (0 is kernel)
            ready_queue: Vec::new(),
            signal_stats: DeliveryStats::default(),
            exit_stats: ExitStats::default(),
            syscall_stats: SyscallStats::default(),
        }
    }

    /// Create a new process and place it on the ready queue
    ///
    /// The first process created gets pid 1 and becomes init. A child
    /// inherits its parent's uid and session.
    pub fn create_process(
        &mut self,
        name: String,
        parent: Option<ProcessId>,
        uid: u32,
    ) -> Result<ProcessId, KernelError> {
        if self.processes.len() >= MAX_PROCESSES {
            log::warn!("Process table full ({} entries)", MAX_PROCESSES);
            return Err(KernelError::ResourceExhausted);
        }
        if let Some(ppid) = parent {
            if !self.processes.contains_key(&ppid) {
                return Err(KernelError::NoSuchProcess);
            }
        }

        let pid = ProcessId::new(self.next_pid.fetch_add(1, Ordering::SeqCst));
        let mut process = Process::new(pid, name.clone(), parent, uid);

        if let Some(parent_proc) = parent.and_then(|ppid| self.processes.get_mut(&ppid)) {
            parent_proc.add_child(pid);
            process.uid = parent_proc.uid;
            process.sid = parent_proc.sid;
        }

        self.ready_queue.push(pid);
        self.processes.insert(pid, process);

        log::info!("Created process {} (PID {})", name, pid.as_u64());
        Ok(pid)
    }

    /// Get the current process ID
    pub fn current_pid(&self) -> Option<ProcessId> {
        self.current_pid
    }

    /// Set the current process ID (for direct execution)
    pub fn set_current_pid(&mut self, pid: ProcessId) {
        self.current_pid = Some(pid);
        if let Some(process) = self.processes.get_mut(&pid) {
            process.set_running();
        }
    }

    pub(crate) fn clear_current(&mut self, pid: ProcessId) {
        if self.current_pid == Some(pid) {
            self.current_pid = None;
        }
    }

    /// Get a reference to a process
    pub fn get_process(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.get(&pid)
    }

    /// Get a mutable reference to a process
    pub fn get_process_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.processes.get_mut(&pid)
    }

    /// Remove a process record, freeing its table slot
    pub fn remove_process(&mut self, pid: ProcessId) -> Option<Process> {
        self.ready_queue.retain(|&p| p != pid);
        self.clear_current(pid);
        self.processes.remove(&pid)
    }

    /// Put a process on the ready queue if it is not already there
    pub fn add_to_ready_queue(&mut self, pid: ProcessId) {
        if !self.ready_queue.contains(&pid) {
            self.ready_queue.push(pid);
        }
    }

    /// Take a process off the ready queue
    pub fn remove_from_ready_queue(&mut self, pid: ProcessId) {
        self.ready_queue.retain(|&p| p != pid);
    }

    pub fn is_ready_queued(&self, pid: ProcessId) -> bool {
        self.ready_queue.contains(&pid)
    }

    /// Get the next ready process to run
    ///
    /// Simple round-robin; the real scheduler policy lives outside this
    /// crate, this is the contract it is reached through.
    pub fn schedule_next(&mut self) -> Option<ProcessId> {
        if let Some(pid) = self.ready_queue.first().cloned() {
            self.ready_queue.remove(0);
            self.ready_queue.push(pid);

            if let Some(old_pid) = self.current_pid {
                if let Some(old_process) = self.processes.get_mut(&old_pid) {
                    if old_process.state == ProcessState::Running {
                        old_process.set_ready();
                    }
                }
            }

            if let Some(new_process) = self.processes.get_mut(&pid) {
                new_process.set_running();
            }

            self.current_pid = Some(pid);
            Some(pid)
        } else {
            None
        }
    }

    /// Get all process IDs
    pub fn all_pids(&self) -> Vec<ProcessId> {
        self.processes.keys().cloned().collect()
    }

    /// Get process count
    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    /// Debug print all processes
    pub fn debug_processes(&self) {
        log::info!("=== Process List ===");
        for (pid, process) in &self.processes {
            log::info!(
                "  PID {}: {} - {:?}",
                pid.as_u64(),
                process.name,
                process.state
            );
        }
        log::info!("Current PID: {:?}", self.current_pid);
        log::info!("Ready queue: {:?}", self.ready_queue.iter().map(|p| p.as_u64()).collect::<Vec<_>>());
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn first_process_is_init() {
        let mut mgr = ProcessManager::new();
        let pid = mgr.create_process("init".to_string(), None, 0).unwrap();
        assert_eq!(pid, INIT_PID);
        assert!(mgr.is_ready_queued(pid));
    }

    #[test]
    fn children_inherit_uid_and_session() {
        let mut mgr = ProcessManager::new();
        let init = mgr.create_process("init".to_string(), None, 0).unwrap();
        let shell = mgr
            .create_process("shell".to_string(), Some(init), 1000)
            .unwrap();
        let child = mgr
            .create_process("child".to_string(), Some(shell), 0)
            .unwrap();

        // uid argument is overridden by inheritance for non-orphans
        let shell_proc = mgr.get_process(shell).unwrap();
        assert_eq!(shell_proc.uid, 0);
        let child_proc = mgr.get_process(child).unwrap();
        assert_eq!(child_proc.parent, Some(shell));
        assert_eq!(child_proc.sid, shell_proc.sid);
        assert!(mgr.get_process(shell).unwrap().children.contains(&child));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut mgr = ProcessManager::new();
        let err = mgr.create_process("orphan".to_string(), Some(ProcessId::new(42)), 0);
        assert_eq!(err, Err(KernelError::NoSuchProcess));
    }

    #[test]
    fn table_capacity_is_enforced() {
        let mut mgr = ProcessManager::new();
        for i in 0..MAX_PROCESSES {
            mgr.create_process(alloc::format!("p{}", i), None, 0).unwrap();
        }
        assert_eq!(
            mgr.create_process("one-too-many".to_string(), None, 0),
            Err(KernelError::ResourceExhausted)
        );
    }

    #[test]
    fn schedule_next_round_robins() {
        let mut mgr = ProcessManager::new();
        let a = mgr.create_process("a".to_string(), None, 0).unwrap();
        let b = mgr.create_process("b".to_string(), None, 0).unwrap();

        assert_eq!(mgr.schedule_next(), Some(a));
        assert_eq!(mgr.get_process(a).unwrap().state, ProcessState::Running);
        assert_eq!(mgr.schedule_next(), Some(b));
        assert_eq!(mgr.get_process(a).unwrap().state, ProcessState::Ready);
        assert_eq!(mgr.get_process(b).unwrap().state, ProcessState::Running);
    }

    #[test]
    fn remove_process_clears_queue_and_current() {
        let mut mgr = ProcessManager::new();
        let a = mgr.create_process("a".to_string(), None, 0).unwrap();
        mgr.set_current_pid(a);
        assert!(mgr.remove_process(a).is_some());
        assert_eq!(mgr.current_pid(), None);
        assert!(!mgr.is_ready_queued(a));
        assert!(mgr.get_process(a).is_none());
    }
}

//! Process structure and lifecycle states

use crate::signal::delivery::{HandlerFrame, SignalDeliveryState};
use crate::signal::mask::SignalMaskState;
use alloc::string::String;
use alloc::vec::Vec;

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl ProcessId {
    pub const fn new(id: u64) -> Self {
        ProcessId(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Process is ready to run
    Ready,
    /// Process is currently running
    Running,
    /// Process is blocked waiting for something
    Blocked,
    /// Process was stopped by a stop signal, resumable via SIGCONT
    Stopped,
    /// Process has exited but has not been reaped yet
    Zombie,
    /// Process is fully gone; its table slot is being released
    Terminated,
}

/// Which child a blocked parent is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    /// wait() / waitpid(-1): any child will do
    AnyChild,
    /// waitpid(pid): this specific child
    Child(ProcessId),
}

impl WaitTarget {
    pub fn matches(&self, pid: ProcessId) -> bool {
        match self {
            WaitTarget::AnyChild => true,
            WaitTarget::Child(want) => *want == pid,
        }
    }
}

/// One-shot alarm timer, decremented by explicit timer ticks
///
/// `remaining == 0` means disabled. The timer interrupt calls `tick`
/// with the elapsed tick count; expiry fires SIGALRM once.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlarmTimer {
    remaining: u64,
}

impl AlarmTimer {
    /// Arm the alarm, returning the ticks that were left on a previous one
    pub fn set(&mut self, ticks: u64) -> u64 {
        let old = self.remaining;
        self.remaining = ticks;
        old
    }

    pub fn cancel(&mut self) -> u64 {
        self.set(0)
    }

    pub fn is_active(&self) -> bool {
        self.remaining > 0
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Advance by `elapsed` ticks; true when the alarm just expired
    pub fn tick(&mut self, elapsed: u64) -> bool {
        if self.remaining == 0 {
            return false;
        }
        if elapsed >= self.remaining {
            self.remaining = 0;
            true
        } else {
            self.remaining -= elapsed;
            false
        }
    }
}

/// A process as seen by the signal and lifecycle core
///
/// Parent/child/zombie relationships are `ProcessId` handles resolved
/// through the process table, never direct references; a child appears
/// in exactly one of `children` / `zombie_children`.
pub struct Process {
    /// Unique process identifier
    pub id: ProcessId,

    /// Process name (for logging)
    pub name: String,

    /// Current state
    pub state: ProcessState,

    /// Owning user, consulted by the kill permission check
    pub uid: u32,

    /// Session ID; SIGCONT may cross user boundaries within a session
    pub sid: ProcessId,

    /// Parent process ID (if any)
    pub parent: Option<ProcessId>,

    /// Live (not yet exited) children
    pub children: Vec<ProcessId>,

    /// Exited but unreaped children
    pub zombie_children: Vec<ProcessId>,

    /// Exit code recorded at exit time
    pub exit_code: i32,

    /// Terminating signal, 0 for a normal exit
    pub killed_by_signal: u32,

    /// Tick timestamp of the exit transition
    pub exit_time: u64,

    /// Per-signal pending queues and delivery bookkeeping
    pub signals: SignalDeliveryState,

    /// Blocked set, action table, alternate stack
    pub sigmask: SignalMaskState,

    /// Saved contexts of dispatched user handlers, popped by sigreturn
    pub handler_frames: Vec<HandlerFrame>,

    /// Set while blocked in wait/waitpid
    pub waiting_for_child: Option<WaitTarget>,

    /// Deposited by the wake path; the resumed wait call returns it
    pub wait_result: Option<(ProcessId, i32)>,

    /// Signal that stopped the process, 0 when not stopped
    pub stopped_by_signal: u32,

    /// A stop transition not yet reported through WUNTRACED
    pub stopped_pending_report: bool,

    /// A continue transition not yet reported through WCONTINUED
    pub continued_pending_report: bool,

    /// One-shot SIGALRM timer
    pub alarm: AlarmTimer,

    // Resource accounting consumed by the exit cleanup hooks. The real
    // tables live in their own subsystems; the counts are what the
    // cleanup contract returns.
    pub open_files: u32,
    pub ipc_handles: u32,
    pub timers: u32,
}

impl Process {
    /// Create a new process record
    pub fn new(id: ProcessId, name: String, parent: Option<ProcessId>, uid: u32) -> Self {
        Process {
            id,
            name,
            state: ProcessState::Ready,
            uid,
            // A process starts as its own session leader unless it
            // inherits one; the manager fixes this up on spawn.
            sid: id,
            parent,
            children: Vec::new(),
            zombie_children: Vec::new(),
            exit_code: 0,
            killed_by_signal: 0,
            exit_time: 0,
            signals: SignalDeliveryState::new(),
            sigmask: SignalMaskState::new(),
            handler_frames: Vec::new(),
            waiting_for_child: None,
            wait_result: None,
            stopped_by_signal: 0,
            stopped_pending_report: false,
            continued_pending_report: false,
            alarm: AlarmTimer::default(),
            open_files: 0,
            ipc_handles: 0,
            timers: 0,
        }
    }

    /// Mark process as running
    pub fn set_running(&mut self) {
        self.state = ProcessState::Running;
    }

    /// Mark process as ready
    pub fn set_ready(&mut self) {
        self.state = ProcessState::Ready;
    }

    /// Mark process as blocked
    pub fn set_blocked(&mut self) {
        self.state = ProcessState::Blocked;
    }

    pub fn is_zombie(&self) -> bool {
        self.state == ProcessState::Zombie
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, ProcessState::Zombie | ProcessState::Terminated)
    }

    /// True while the process can still receive and act on signals
    pub fn is_alive(&self) -> bool {
        !self.is_terminated()
    }

    /// Fast mirror of the pending-signal bitmask
    pub fn pending_signals(&self) -> u64 {
        self.signals.pending_mask()
    }

    pub fn add_child(&mut self, child: ProcessId) {
        self.children.push(child);
    }

    pub fn remove_child(&mut self, child: ProcessId) {
        self.children.retain(|&id| id != child);
    }

    pub fn remove_zombie_child(&mut self, child: ProcessId) {
        self.zombie_children.retain(|&id| id != child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_timer_one_shot() {
        let mut alarm = AlarmTimer::default();
        assert!(!alarm.tick(100));
        assert_eq!(alarm.set(10), 0);
        assert!(alarm.is_active());
        assert!(!alarm.tick(4));
        assert_eq!(alarm.remaining(), 6);
        assert!(alarm.tick(6));
        assert!(!alarm.is_active());
        assert!(!alarm.tick(1));
    }

    #[test]
    fn alarm_set_returns_previous_remaining() {
        let mut alarm = AlarmTimer::default();
        alarm.set(30);
        alarm.tick(10);
        assert_eq!(alarm.set(5), 20);
        assert_eq!(alarm.cancel(), 5);
    }

    #[test]
    fn wait_target_matching() {
        let pid = ProcessId::new(7);
        assert!(WaitTarget::AnyChild.matches(pid));
        assert!(WaitTarget::Child(pid).matches(pid));
        assert!(!WaitTarget::Child(ProcessId::new(8)).matches(pid));
    }
}

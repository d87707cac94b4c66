//! System call boundary for the signal and process-lifecycle core
//!
//! Validates and marshals user-supplied arguments into the subsystems
//! below, and maps kernel errors onto negative errno values. The
//! architecture-specific trap entry and copy-from/to-user plumbing live
//! outside this crate; these functions are what the dispatcher calls
//! once arguments are in kernel space.

pub mod errno;
pub mod signal;
pub mod wait;

use crate::error::KernelError;

/// System call result type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallResult {
    /// Success, with the return value
    Ok(u64),
    /// Failure, carrying the errno value
    Err(u64),
    /// The caller was blocked; the dispatcher resumes the call through
    /// `wait::complete_wait` once the process is woken
    Blocked,
}

impl SyscallResult {
    pub(crate) fn from_error(err: KernelError) -> Self {
        SyscallResult::Err(err.errno() as u64)
    }

    /// The success value, if any
    pub fn ok(self) -> Option<u64> {
        match self {
            SyscallResult::Ok(v) => Some(v),
            _ => None,
        }
    }

    /// The errno value, if any
    pub fn err(self) -> Option<u64> {
        match self {
            SyscallResult::Err(e) => Some(e),
            _ => None,
        }
    }
}

/// Per-syscall invocation counters
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallStats {
    pub signal_calls: u64,
    pub sigaction_calls: u64,
    pub kill_calls: u64,
    pub sigprocmask_calls: u64,
    pub sigpending_calls: u64,
    pub sigsuspend_calls: u64,
    pub sigqueue_calls: u64,
    pub sigwait_calls: u64,
    pub sigaltstack_calls: u64,
    pub alarm_calls: u64,
    pub pause_calls: u64,
    pub wait_calls: u64,
    pub exit_calls: u64,
    pub invalid_signals: u64,
    pub permission_denied: u64,
}

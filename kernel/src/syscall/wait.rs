//! exit/wait/waitpid system calls

use super::errno::*;
use super::SyscallResult;
use crate::error::KernelError;
use crate::process::wait::{
    finish_wait, process_wait_any, process_wait_pid, WaitOptions, WaitOutcome,
};
use crate::process::{exit, ProcessId, ProcessManager};

/// exit(status) - terminate the calling process
///
/// In the running kernel this does not return to the caller; the
/// dispatcher schedules away after the state transition.
pub fn sys_exit(mgr: &mut ProcessManager, status: i32) -> SyscallResult {
    mgr.syscall_stats.exit_calls += 1;
    let Some(pid) = mgr.current_pid() else {
        log::error!("sys_exit: no current process");
        return SyscallResult::Err(ESRCH as u64);
    };
    log::info!(
        "sys_exit called by process {} with status {}",
        pid.as_u64(),
        status
    );
    exit::process_exit(mgr, pid, status);
    SyscallResult::Ok(0)
}

/// waitpid(pid, status, options) - wait for a child to change state
///
/// `pid > 0` waits for that child; `0`/`-1` wait for any child; other
/// negative values (process groups) are not implemented. Returns the
/// reaped child's pid, `0` under WNOHANG with nothing ready, or ECHILD
/// when no matching child exists. `SyscallResult::Blocked` means the
/// caller was put to sleep; once the wake path has run, the dispatcher
/// finishes the call through `complete_wait`.
pub fn sys_waitpid(
    mgr: &mut ProcessManager,
    pid: i64,
    status_out: Option<&mut i32>,
    options: u32,
) -> SyscallResult {
    mgr.syscall_stats.wait_calls += 1;
    let Some(parent) = mgr.current_pid() else {
        return SyscallResult::Err(ESRCH as u64);
    };

    let options = WaitOptions::from_bits_truncate(options);
    let outcome = match pid {
        p if p > 0 => process_wait_pid(mgr, parent, ProcessId::new(p as u64), options),
        0 | -1 => process_wait_any(mgr, parent, options),
        _ => {
            log::warn!("sys_waitpid: process groups not implemented (pid={})", pid);
            return SyscallResult::Err(ENOSYS as u64);
        }
    };

    match outcome {
        Ok(WaitOutcome::Collected { pid, status }) => {
            if let Some(out) = status_out {
                *out = status;
            }
            SyscallResult::Ok(pid.as_u64())
        }
        Ok(WaitOutcome::NotReady) => SyscallResult::Ok(0),
        Ok(WaitOutcome::Blocked) => SyscallResult::Blocked,
        Err(e) => SyscallResult::from_error(e),
    }
}

/// wait(status) - wait for any child
pub fn sys_wait(mgr: &mut ProcessManager, status_out: Option<&mut i32>) -> SyscallResult {
    sys_waitpid(mgr, -1, status_out, 0)
}

/// Finish a wait that blocked
///
/// Called on the syscall-return path once the woken parent is scheduled
/// again; the wake path has already deposited the reaped pid and status
/// in the wait slot.
pub fn complete_wait(mgr: &mut ProcessManager, status_out: Option<&mut i32>) -> SyscallResult {
    let Some(parent) = mgr.current_pid() else {
        return SyscallResult::Err(ESRCH as u64);
    };
    match finish_wait(mgr, parent) {
        Some((pid, status)) => {
            if let Some(out) = status_out {
                *out = status;
            }
            SyscallResult::Ok(pid.as_u64())
        }
        // Woken without a result: interrupted wait
        None => SyscallResult::from_error(KernelError::WouldBlock),
    }
}

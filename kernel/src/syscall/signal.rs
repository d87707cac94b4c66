//! Signal-related system calls
//!
//! This module implements the signal syscalls:
//! - signal/sigaction - install handlers
//! - kill/sigqueue - send signals
//! - sigprocmask/sigpending/sigsuspend - mask management
//! - sigwaitinfo/sigtimedwait - synchronous signal consumption
//! - sigaltstack, alarm, pause
//!
//! The "current process" is whatever the manager says is running; the
//! trap dispatcher establishes that before calling in.

use super::errno::*;
use super::SyscallResult;
use crate::error::KernelError;
use crate::process::{Process, ProcessId, ProcessManager};
use crate::signal::constants::*;
use crate::signal::delivery::{
    deliver_pending, signal_generate, signal_take_pending, DeliverFlags,
};
use crate::signal::types::{
    MaskHow, SigAction, SigHandler, SigInfo, SigSet, SigVal, SignalSource, StackT,
};

/// Check permission to send a signal from one process to another
///
/// Root may signal anything; otherwise the uids must match, with the
/// POSIX exception that SIGCONT may travel within a session.
fn check_signal_permission(sender: &Process, target: &Process, sig: u32) -> bool {
    if sender.uid == 0 {
        return true;
    }
    if sender.id == target.id {
        return true;
    }
    if sender.uid == target.uid {
        return true;
    }
    if sig == SIGCONT && sender.sid == target.sid {
        return true;
    }
    false
}

fn current(mgr: &ProcessManager) -> Result<ProcessId, KernelError> {
    mgr.current_pid().ok_or(KernelError::NoSuchProcess)
}

/// signal(sig, handler) - install a simple signal handler
///
/// Returns the previous handler in its raw SIG_DFL/SIG_IGN/address
/// encoding.
pub fn sys_signal(mgr: &mut ProcessManager, sig: u32, handler: u64) -> SyscallResult {
    mgr.syscall_stats.signal_calls += 1;
    let pid = match current(mgr) {
        Ok(pid) => pid,
        Err(e) => return SyscallResult::from_error(e),
    };

    if !is_valid_signal(sig) || !is_catchable(sig) {
        mgr.syscall_stats.invalid_signals += 1;
        return SyscallResult::Err(EINVAL as u64);
    }

    let Some(proc) = mgr.get_process_mut(pid) else {
        return SyscallResult::Err(ESRCH as u64);
    };
    match proc
        .sigmask
        .install_handler(sig, SigHandler::from_raw(handler))
    {
        Ok(old) => SyscallResult::Ok(old.to_raw()),
        Err(e) => SyscallResult::from_error(e),
    }
}

/// sigaction(sig, act, oldact) - install a signal action
pub fn sys_sigaction(
    mgr: &mut ProcessManager,
    sig: u32,
    act: Option<&SigAction>,
    oldact: Option<&mut SigAction>,
) -> SyscallResult {
    mgr.syscall_stats.sigaction_calls += 1;
    let pid = match current(mgr) {
        Ok(pid) => pid,
        Err(e) => return SyscallResult::from_error(e),
    };

    let result = {
        let Some(proc) = mgr.get_process_mut(pid) else {
            return SyscallResult::Err(ESRCH as u64);
        };
        match act {
            Some(new_action) => proc.sigmask.set_action(sig, *new_action),
            None => proc.sigmask.action(sig),
        }
    };
    let previous = match result {
        Ok(action) => action,
        Err(e) => {
            mgr.syscall_stats.invalid_signals += 1;
            return SyscallResult::from_error(e);
        }
    };
    if let Some(out) = oldact {
        *out = previous;
    }
    SyscallResult::Ok(0)
}

/// kill(pid, sig) - send a signal to a process
///
/// `sig == 0` probes for existence and permission without sending.
/// Process groups and broadcast (pid <= 0) are not implemented.
pub fn sys_kill(mgr: &mut ProcessManager, pid: i64, sig: u32) -> SyscallResult {
    mgr.syscall_stats.kill_calls += 1;
    let sender = match current(mgr) {
        Ok(pid) => pid,
        Err(e) => return SyscallResult::from_error(e),
    };

    if sig != 0 && !is_valid_signal(sig) {
        mgr.syscall_stats.invalid_signals += 1;
        return SyscallResult::Err(EINVAL as u64);
    }

    if pid <= 0 {
        log::warn!("sys_kill: process groups not implemented (pid={})", pid);
        return SyscallResult::Err(ENOSYS as u64);
    }

    let target = ProcessId::new(pid as u64);
    let permitted = {
        let Some(target_proc) = mgr.get_process(target) else {
            return SyscallResult::Err(ESRCH as u64);
        };
        if target_proc.is_terminated() {
            return SyscallResult::Err(ESRCH as u64);
        }
        let Some(sender_proc) = mgr.get_process(sender) else {
            return SyscallResult::Err(ESRCH as u64);
        };
        if check_signal_permission(sender_proc, target_proc, sig) {
            Some((sender_proc.id.as_u64(), sender_proc.uid))
        } else {
            None
        }
    };
    let Some((sender_pid, sender_uid)) = permitted else {
        mgr.syscall_stats.permission_denied += 1;
        return SyscallResult::Err(EPERM as u64);
    };

    if sig == 0 {
        return SyscallResult::Ok(0);
    }

    let info = SigInfo::new(sig, SignalSource::Process).with_sender(sender_pid, sender_uid);
    match signal_generate(
        mgr,
        target,
        sig,
        Some(info),
        SignalSource::Process,
        DeliverFlags::empty(),
    ) {
        Ok(()) => SyscallResult::Ok(0),
        Err(e) => SyscallResult::from_error(e),
    }
}

/// sigprocmask(how, set) - change the blocked mask
///
/// Returns the previous mask. With no set, the current mask is returned
/// unchanged. Newly unblocked pending signals are delivered before
/// returning to userspace.
pub fn sys_sigprocmask(mgr: &mut ProcessManager, how: i32, set: Option<u64>) -> SyscallResult {
    mgr.syscall_stats.sigprocmask_calls += 1;
    let pid = match current(mgr) {
        Ok(pid) => pid,
        Err(e) => return SyscallResult::from_error(e),
    };

    let Some(mask) = set else {
        let Some(proc) = mgr.get_process(pid) else {
            return SyscallResult::Err(ESRCH as u64);
        };
        return SyscallResult::Ok(proc.sigmask.blocked());
    };

    let how = match MaskHow::from_raw(how) {
        Ok(how) => how,
        Err(e) => return SyscallResult::from_error(e),
    };

    let old = {
        let Some(proc) = mgr.get_process_mut(pid) else {
            return SyscallResult::Err(ESRCH as u64);
        };
        proc.sigmask.mask_change(how, SigSet::from_mask(mask))
    };

    if matches!(how, MaskHow::Unblock | MaskHow::SetMask) {
        let _ = deliver_pending(mgr, pid);
    }
    SyscallResult::Ok(old)
}

/// sigpending() - the set of pending signals
pub fn sys_sigpending(mgr: &mut ProcessManager) -> SyscallResult {
    mgr.syscall_stats.sigpending_calls += 1;
    let pid = match current(mgr) {
        Ok(pid) => pid,
        Err(e) => return SyscallResult::from_error(e),
    };
    let Some(proc) = mgr.get_process(pid) else {
        return SyscallResult::Err(ESRCH as u64);
    };
    SyscallResult::Ok(proc.pending_signals())
}

/// sigsuspend(mask) - install a temporary mask and wait for a signal
///
/// The mask swap is atomic with respect to delivery; the call always
/// returns EINTR after any pending deliverable signal has been taken,
/// with the original mask restored.
pub fn sys_sigsuspend(mgr: &mut ProcessManager, mask: u64) -> SyscallResult {
    mgr.syscall_stats.sigsuspend_calls += 1;
    let pid = match current(mgr) {
        Ok(pid) => pid,
        Err(e) => return SyscallResult::from_error(e),
    };

    {
        let Some(proc) = mgr.get_process_mut(pid) else {
            return SyscallResult::Err(ESRCH as u64);
        };
        proc.sigmask.suspend(SigSet::from_mask(mask));
    }
    let _ = deliver_pending(mgr, pid);
    if let Some(proc) = mgr.get_process_mut(pid) {
        proc.sigmask.restore();
    }
    SyscallResult::Err(EINTR as u64)
}

/// sigqueue(pid, sig, value) - queue a real-time signal with a payload
pub fn sys_sigqueue(mgr: &mut ProcessManager, pid: u64, sig: u32, value: SigVal) -> SyscallResult {
    mgr.syscall_stats.sigqueue_calls += 1;
    let sender = match current(mgr) {
        Ok(pid) => pid,
        Err(e) => return SyscallResult::from_error(e),
    };

    if !is_realtime_signal(sig) {
        mgr.syscall_stats.invalid_signals += 1;
        return SyscallResult::Err(EINVAL as u64);
    }

    let target = ProcessId::new(pid);
    let permitted = {
        let Some(target_proc) = mgr.get_process(target) else {
            return SyscallResult::Err(ESRCH as u64);
        };
        let Some(sender_proc) = mgr.get_process(sender) else {
            return SyscallResult::Err(ESRCH as u64);
        };
        if check_signal_permission(sender_proc, target_proc, sig) {
            Some((sender_proc.id.as_u64(), sender_proc.uid))
        } else {
            None
        }
    };
    let Some((sender_pid, sender_uid)) = permitted else {
        mgr.syscall_stats.permission_denied += 1;
        return SyscallResult::Err(EPERM as u64);
    };

    let info = SigInfo::new(sig, SignalSource::Process)
        .with_sender(sender_pid, sender_uid)
        .with_value(value);
    match signal_generate(
        mgr,
        target,
        sig,
        Some(info),
        SignalSource::Process,
        DeliverFlags::QUEUE,
    ) {
        Ok(()) => SyscallResult::Ok(0),
        Err(e) => SyscallResult::from_error(e),
    }
}

/// sigwaitinfo(set, info) - take a pending signal from the set
pub fn sys_sigwaitinfo(
    mgr: &mut ProcessManager,
    set: u64,
    info_out: Option<&mut SigInfo>,
) -> SyscallResult {
    sys_sigtimedwait(mgr, set, info_out, None)
}

/// sigtimedwait(set, info, timeout) - bounded wait for a signal in set
///
/// Signal waiting is a separate mechanism from child waiting and never
/// touches the wait-for-child slot. The bounded wait is a repetition of
/// this non-blocking poll; with nothing deliverable the call reports
/// EAGAIN and the dispatcher re-polls until the timeout elapses.
pub fn sys_sigtimedwait(
    mgr: &mut ProcessManager,
    set: u64,
    info_out: Option<&mut SigInfo>,
    _timeout_ticks: Option<u64>,
) -> SyscallResult {
    mgr.syscall_stats.sigwait_calls += 1;
    let pid = match current(mgr) {
        Ok(pid) => pid,
        Err(e) => return SyscallResult::from_error(e),
    };

    let Some(proc) = mgr.get_process_mut(pid) else {
        return SyscallResult::Err(ESRCH as u64);
    };
    match signal_take_pending(proc, SigSet::from_mask(set)) {
        Some(info) => {
            let sig = info.signo;
            if let Some(out) = info_out {
                *out = info;
            }
            SyscallResult::Ok(sig as u64)
        }
        None => SyscallResult::Err(EAGAIN as u64),
    }
}

/// sigaltstack(stack, oldstack) - configure the alternate signal stack
pub fn sys_sigaltstack(
    mgr: &mut ProcessManager,
    stack: Option<&StackT>,
    old_out: Option<&mut StackT>,
) -> SyscallResult {
    mgr.syscall_stats.sigaltstack_calls += 1;
    let pid = match current(mgr) {
        Ok(pid) => pid,
        Err(e) => return SyscallResult::from_error(e),
    };

    let Some(proc) = mgr.get_process_mut(pid) else {
        return SyscallResult::Err(ESRCH as u64);
    };
    let previous = match stack {
        Some(new_stack) => match proc.sigmask.set_alt_stack(*new_stack) {
            Ok(old) => old,
            Err(e) => return SyscallResult::from_error(e),
        },
        None => proc.sigmask.alt_stack(),
    };
    if let Some(out) = old_out {
        *out = previous;
    }
    SyscallResult::Ok(0)
}

/// alarm(ticks) - arm the one-shot SIGALRM timer
///
/// Returns the ticks remaining on a previously armed alarm, 0 if none.
pub fn sys_alarm(mgr: &mut ProcessManager, ticks: u64) -> SyscallResult {
    mgr.syscall_stats.alarm_calls += 1;
    let pid = match current(mgr) {
        Ok(pid) => pid,
        Err(e) => return SyscallResult::from_error(e),
    };
    let Some(proc) = mgr.get_process_mut(pid) else {
        return SyscallResult::Err(ESRCH as u64);
    };
    SyscallResult::Ok(proc.alarm.set(ticks))
}

/// pause() - wait until a signal is delivered
///
/// Equivalent to sigsuspend with the current mask: drains deliverable
/// signals and reports EINTR.
pub fn sys_pause(mgr: &mut ProcessManager) -> SyscallResult {
    mgr.syscall_stats.pause_calls += 1;
    let pid = match current(mgr) {
        Ok(pid) => pid,
        Err(e) => return SyscallResult::from_error(e),
    };
    let _ = deliver_pending(mgr, pid);
    SyscallResult::Err(EINTR as u64)
}

//! Process termination state machine
//!
//! Drives processes from RUNNING through ZOMBIE to TERMINATED, plus the
//! STOPPED side-state.
//! `process_exit` never blocks and never fails: resource-cleanup steps
//! are best-effort, individually logged, and a partial failure still
//! produces a reapable zombie. Leaving a process stuck as a zombie over
//! a minor cleanup failure would be worse than a leaked resource.

use super::manager::INIT_PID;
use super::{wait, ProcessId, ProcessManager, ProcessState};
use crate::signal::constants::signal_name;
use crate::time;

/// Aggregate exit statistics, kept on the process manager
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitStats {
    /// Total processes that have exited
    pub total_exits: u64,
    /// Processes that exited with code 0
    pub normal_exits: u64,
    /// Processes terminated by signals
    pub killed_processes: u64,
    /// Current zombie count
    pub zombie_count: u64,
    /// Children reparented to init so far
    pub orphan_count: u64,
    /// Total resources released by cleanup hooks
    pub resources_cleaned: u64,
}

/// Exit a process: record status, release resources, become a zombie
///
/// The final transition to TERMINATED happens when the parent reaps the
/// zombie; a process with no parent is reaped here immediately.
pub fn process_exit(mgr: &mut ProcessManager, pid: ProcessId, exit_code: i32) {
    let parent = {
        let proc = match mgr.get_process_mut(pid) {
            Some(p) => p,
            None => {
                log::error!("process_exit: no process with pid {}", pid.as_u64());
                return;
            }
        };
        if proc.is_terminated() {
            log::warn!("Process {} already terminating", pid.as_u64());
            return;
        }

        log::info!(
            "Process {} ({}) exiting with code {}",
            pid.as_u64(),
            proc.name,
            exit_code
        );

        proc.state = ProcessState::Zombie;
        proc.exit_code = exit_code;
        proc.exit_time = time::get_ticks();
        proc.waiting_for_child = None;
        proc.parent
    };

    mgr.remove_from_ready_queue(pid);
    mgr.clear_current(pid);

    let cleaned = run_cleanup(mgr, pid);
    mgr.exit_stats.resources_cleaned += cleaned as u64;

    wait::reparent_children(mgr, pid);

    mgr.exit_stats.total_exits += 1;
    if exit_code == 0 {
        mgr.exit_stats.normal_exits += 1;
    }
    mgr.exit_stats.zombie_count += 1;
    log::info!("Process {} entered zombie state", pid.as_u64());

    match parent {
        Some(ppid) if mgr.get_process(ppid).is_some() => {
            wait::notify_parent(mgr, pid, exit_code);
        }
        _ => {
            // No one will ever wait for this process; free the slot now
            log::debug!("Process {} has no parent, reaping immediately", pid.as_u64());
            mgr.exit_stats.zombie_count -= 1;
            mgr.remove_process(pid);
        }
    }
}

/// Terminate a process as if by an uncaught fatal signal
///
/// Records the signal and exits through the normal path with the
/// conventional `128 + signal` exit code; the reaped wait status carries
/// the signal number in its low bits.
pub fn process_kill(mgr: &mut ProcessManager, pid: ProcessId, sig: u32) {
    let Some(proc) = mgr.get_process_mut(pid) else {
        log::error!("process_kill: no process with pid {}", pid.as_u64());
        return;
    };
    if proc.is_terminated() {
        return;
    }

    log::info!(
        "Killing process {} ({}) with signal {} ({})",
        pid.as_u64(),
        proc.name,
        sig,
        signal_name(sig)
    );
    proc.killed_by_signal = sig;
    mgr.exit_stats.killed_processes += 1;
    process_exit(mgr, pid, 128 + sig as i32);
}

/// Emergency termination for unrecoverable kernel errors
///
/// Skips the zombie interval and parent notification entirely: the slot
/// is freed right away. The process tree is kept consistent by moving
/// any children to init.
pub fn process_force_kill(mgr: &mut ProcessManager, pid: ProcessId) {
    if mgr.get_process(pid).is_none() {
        return;
    }
    log::error!("Force killing process {}", pid.as_u64());

    wait::reparent_children(mgr, pid);

    // Unlink from the parent without generating SIGCHLD
    let parent = mgr.get_process(pid).and_then(|p| p.parent);
    if let Some(ppid) = parent {
        if let Some(parent_proc) = mgr.get_process_mut(ppid) {
            parent_proc.remove_child(pid);
            parent_proc.remove_zombie_child(pid);
        }
    }

    if let Some(mut proc) = mgr.remove_process(pid) {
        proc.state = ProcessState::Terminated;
        proc.signals.clear_all();
    }
    log::info!("Process {} force killed", pid.as_u64());
}

/// Stop a process (default action of SIGSTOP/SIGTSTP/SIGTTIN/SIGTTOU)
///
/// A pure state transition: no resource cleanup, resumable via SIGCONT.
pub fn process_stop(mgr: &mut ProcessManager, pid: ProcessId, sig: u32) {
    let Some(proc) = mgr.get_process_mut(pid) else {
        return;
    };
    if proc.is_terminated() || proc.state == ProcessState::Stopped {
        return;
    }
    proc.state = ProcessState::Stopped;
    proc.stopped_by_signal = sig;
    proc.stopped_pending_report = true;
    proc.continued_pending_report = false;
    mgr.remove_from_ready_queue(pid);
    mgr.clear_current(pid);
}

/// Resume a stopped process (default action of SIGCONT)
///
/// Returns true when the process was actually resumed.
pub fn process_continue(mgr: &mut ProcessManager, pid: ProcessId) -> bool {
    let Some(proc) = mgr.get_process_mut(pid) else {
        return false;
    };
    if proc.state != ProcessState::Stopped {
        return false;
    }
    proc.state = ProcessState::Ready;
    proc.stopped_by_signal = 0;
    proc.stopped_pending_report = false;
    proc.continued_pending_report = true;
    mgr.add_to_ready_queue(pid);
    true
}

/// Run the resource-cleanup hooks for an exiting process
///
/// Each step returns a count and never fails the overall exit; the real
/// tables live in their own subsystems and are reached through these
/// contracts.
fn run_cleanup(mgr: &mut ProcessManager, pid: ProcessId) -> u32 {
    let Some(proc) = mgr.get_process_mut(pid) else {
        return 0;
    };

    let files = core::mem::take(&mut proc.open_files);
    log::debug!("Closed {} file descriptors for process {}", files, pid.as_u64());

    let ipc = core::mem::take(&mut proc.ipc_handles);
    log::debug!("Cleaned up {} IPC resources for process {}", ipc, pid.as_u64());

    let mut timers = core::mem::take(&mut proc.timers);
    if proc.alarm.is_active() {
        proc.alarm.cancel();
        timers += 1;
    }
    log::debug!("Cancelled {} timers for process {}", timers, pid.as_u64());

    let signals = proc.signals.clear_all();
    proc.sigmask.reset();
    proc.handler_frames.clear();
    log::debug!(
        "Dropped {} queued signals for process {}",
        signals,
        pid.as_u64()
    );

    files + ipc + timers + signals
}

/// Sweep zombies whose parent never reaped them
///
/// Force-reaps zombies older than `max_age` ticks; called periodically
/// by the housekeeping path. Returns the number reaped.
pub fn reap_old_zombies(mgr: &mut ProcessManager, max_age: u64) -> u32 {
    let now = time::get_ticks();
    let mut reaped = 0;
    for pid in mgr.all_pids() {
        let expired = mgr
            .get_process(pid)
            .map(|p| p.is_zombie() && now.saturating_sub(p.exit_time) > max_age)
            .unwrap_or(false);
        if expired {
            log::warn!("Force reaping old zombie process {}", pid.as_u64());
            let parent = mgr.get_process(pid).and_then(|p| p.parent);
            if let Some(ppid) = parent {
                if let Some(parent_proc) = mgr.get_process_mut(ppid) {
                    parent_proc.remove_zombie_child(pid);
                }
            }
            mgr.exit_stats.zombie_count -= 1;
            mgr.remove_process(pid);
            reaped += 1;
        }
    }
    if reaped > 0 {
        log::info!("Cleaned up {} old zombie processes", reaped);
    }
    reaped
}

/// True when `pid` is the init process, which must never exit
pub fn is_init(pid: ProcessId) -> bool {
    pid == INIT_PID
}

//! Zombie bookkeeping and the wait/waitpid coordinator
//!
//! A dying child moves from its parent's live-child list to the zombie
//! list; a blocked parent is represented by its own process record (state
//! BLOCKED plus the wait slot), there is no separate wait-queue node. The
//! wake path deposits the reaped pid and encoded status directly into the
//! parent's wait slot, condition-variable style; the resumed wait call
//! just picks the result up.

use super::exit::is_init;
use super::manager::INIT_PID;
use super::{ProcessId, ProcessManager, ProcessState, WaitTarget};
use crate::error::KernelError;
use crate::signal::constants::SIGCHLD;
use crate::signal::delivery::{signal_generate, DeliverFlags};
use crate::signal::types::{SigInfo, SignalSource};

bitflags::bitflags! {
    /// Options accepted by wait/waitpid
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WaitOptions: u32 {
        /// Return immediately if no child is ready
        const WNOHANG = 1;
        /// Also report stopped children
        const WUNTRACED = 2;
        /// Also report continued children
        const WCONTINUED = 4;
    }
}

/// Wait-status bit layout helpers
///
/// Low 7 bits carry the terminating signal (0 for a normal exit), bits
/// 8..=15 the exit code. The layout is part of the userspace ABI and must
/// not change.
pub mod wstatus {
    /// Encode the status of an exited process
    pub fn from_exit(exit_code: i32, killed_by_signal: u32) -> i32 {
        if killed_by_signal > 0 {
            (killed_by_signal & 0x7f) as i32
        } else {
            (exit_code & 0xff) << 8
        }
    }

    /// Encode a stop report (WUNTRACED)
    pub fn from_stop(sig: u32) -> i32 {
        (((sig & 0xff) as i32) << 8) | 0x7f
    }

    /// The status reported for a continued child (WCONTINUED)
    pub const CONTINUED: i32 = 0xffff;

    pub fn exited(status: i32) -> bool {
        status & 0x7f == 0
    }

    pub fn exit_status(status: i32) -> i32 {
        (status & 0xff00) >> 8
    }

    pub fn term_sig(status: i32) -> i32 {
        status & 0x7f
    }

    /// The documented two's-complement trick on the low 7 bits
    pub fn signaled(status: i32) -> bool {
        ((((status & 0x7f) + 1) as i8) >> 1) > 0
    }

    pub fn stopped(status: i32) -> bool {
        status & 0xff == 0x7f
    }

    pub fn stop_sig(status: i32) -> i32 {
        exit_status(status)
    }

    pub fn continued(status: i32) -> bool {
        status == CONTINUED
    }
}

/// Result of a wait attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A child was reaped (or a stop/continue was reported); the wait is
    /// complete
    Collected { pid: ProcessId, status: i32 },
    /// WNOHANG was set and no child was ready
    NotReady,
    /// The caller was blocked; the wake path will deposit the result in
    /// its wait slot
    Blocked,
}

/// Notify the parent that `child` exited
///
/// Generates a best-effort SIGCHLD, moves the child onto the parent's
/// zombie list, and wakes the parent if it is blocked in wait.
pub fn notify_parent(mgr: &mut ProcessManager, child: ProcessId, exit_status: i32) {
    let (parent, child_killed_by) = {
        let Some(child_proc) = mgr.get_process(child) else {
            return;
        };
        let Some(parent) = child_proc.parent else {
            return;
        };
        (parent, child_proc.killed_by_signal)
    };

    log::debug!(
        "Notifying parent {} of child {} exit (status {})",
        parent.as_u64(),
        child.as_u64(),
        exit_status
    );

    let info = SigInfo::new(SIGCHLD, SignalSource::Kernel)
        .with_child(child.as_u64(), wstatus::from_exit(exit_status, child_killed_by));
    // Best-effort: a full queue must not stall the exit path
    let _ = signal_generate(
        mgr,
        parent,
        SIGCHLD,
        Some(info),
        SignalSource::Kernel,
        DeliverFlags::COALESCE,
    );

    if let Some(parent_proc) = mgr.get_process_mut(parent) {
        parent_proc.remove_child(child);
        parent_proc.zombie_children.push(child);
    }

    wake_waiting_parent(mgr, parent, child);
}

/// Wake a parent blocked in wait if it is waiting for this child
///
/// Copies the encoded status into the parent's wait slot, reaps the
/// zombie, clears the wait fields, and hands the parent back to the
/// ready queue. Returns true when the parent was woken.
pub fn wake_waiting_parent(mgr: &mut ProcessManager, parent: ProcessId, child: ProcessId) -> bool {
    let waiting = {
        let Some(parent_proc) = mgr.get_process(parent) else {
            return false;
        };
        parent_proc.state == ProcessState::Blocked
            && parent_proc
                .waiting_for_child
                .map(|t| t.matches(child))
                .unwrap_or(false)
    };
    if !waiting {
        return false;
    }

    let status = match reap_zombie(mgr, parent, child) {
        Ok(status) => status,
        Err(_) => return false,
    };

    if let Some(parent_proc) = mgr.get_process_mut(parent) {
        parent_proc.wait_result = Some((child, status));
        parent_proc.waiting_for_child = None;
        parent_proc.set_ready();
    }
    mgr.add_to_ready_queue(parent);
    log::debug!(
        "Woke parent {} waiting for child {}",
        parent.as_u64(),
        child.as_u64()
    );
    true
}

/// Reap a zombie child: collect its status and free the table slot
pub fn reap_zombie(
    mgr: &mut ProcessManager,
    parent: ProcessId,
    zombie: ProcessId,
) -> Result<i32, KernelError> {
    let status = {
        let Some(zombie_proc) = mgr.get_process(zombie) else {
            return Err(KernelError::NoSuchProcess);
        };
        if !zombie_proc.is_zombie() {
            log::error!("Attempt to reap non-zombie process {}", zombie.as_u64());
            return Err(KernelError::InvalidArgument);
        }
        wstatus::from_exit(zombie_proc.exit_code, zombie_proc.killed_by_signal)
    };

    if let Some(parent_proc) = mgr.get_process_mut(parent) {
        parent_proc.remove_zombie_child(zombie);
    }
    mgr.exit_stats.zombie_count -= 1;
    mgr.remove_process(zombie);

    log::info!("Zombie process {} reaped", zombie.as_u64());
    Ok(status)
}

/// Wait for any child (wait / waitpid(-1))
pub fn process_wait_any(
    mgr: &mut ProcessManager,
    parent: ProcessId,
    options: WaitOptions,
) -> Result<WaitOutcome, KernelError> {
    process_wait(mgr, parent, WaitTarget::AnyChild, options)
}

/// Wait for a specific child (waitpid(pid))
pub fn process_wait_pid(
    mgr: &mut ProcessManager,
    parent: ProcessId,
    pid: ProcessId,
    options: WaitOptions,
) -> Result<WaitOutcome, KernelError> {
    process_wait(mgr, parent, WaitTarget::Child(pid), options)
}

fn process_wait(
    mgr: &mut ProcessManager,
    parent: ProcessId,
    target: WaitTarget,
    options: WaitOptions,
) -> Result<WaitOutcome, KernelError> {
    if mgr.get_process(parent).is_none() {
        return Err(KernelError::NoSuchProcess);
    }

    // Stop/continue reports come before zombie reaping so a stopped
    // child cannot be starved behind a stream of exiting siblings
    if options.contains(WaitOptions::WUNTRACED) {
        if let Some(pid) = find_stopped(mgr, parent, target) {
            if let Some(proc) = mgr.get_process_mut(pid) {
                proc.stopped_pending_report = false;
                let sig = proc.stopped_by_signal;
                return Ok(WaitOutcome::Collected {
                    pid,
                    status: wstatus::from_stop(sig),
                });
            }
        }
    }
    if options.contains(WaitOptions::WCONTINUED) {
        if let Some(pid) = find_continued(mgr, parent, target) {
            if let Some(proc) = mgr.get_process_mut(pid) {
                proc.continued_pending_report = false;
                return Ok(WaitOutcome::Collected {
                    pid,
                    status: wstatus::CONTINUED,
                });
            }
        }
    }

    if let Some(zombie) = find_zombie_child(mgr, parent, target) {
        let status = reap_zombie(mgr, parent, zombie)?;
        return Ok(WaitOutcome::Collected {
            pid: zombie,
            status,
        });
    }

    if !has_matching_child(mgr, parent, target) {
        return Err(KernelError::NoSuchChild);
    }

    if options.contains(WaitOptions::WNOHANG) {
        return Ok(WaitOutcome::NotReady);
    }

    // Block: the process record itself is the wait-queue entry
    {
        let Some(parent_proc) = mgr.get_process_mut(parent) else {
            return Err(KernelError::NoSuchProcess);
        };
        parent_proc.waiting_for_child = Some(target);
        parent_proc.wait_result = None;
        parent_proc.set_blocked();
    }
    mgr.remove_from_ready_queue(parent);
    mgr.clear_current(parent);
    mgr.schedule_next();
    log::debug!(
        "Process {} blocked waiting for {:?}",
        parent.as_u64(),
        target
    );
    Ok(WaitOutcome::Blocked)
}

/// Collect the result deposited by the wake path
///
/// The syscall-return path calls this when a process blocked in wait is
/// rescheduled.
pub fn finish_wait(mgr: &mut ProcessManager, parent: ProcessId) -> Option<(ProcessId, i32)> {
    mgr.get_process_mut(parent)?.wait_result.take()
}

/// Move every child of a dying process under init
///
/// Live and zombie children alike are relinked, preserving their own
/// state; init thereafter reaps the already-zombied ones.
pub fn reparent_children(mgr: &mut ProcessManager, parent: ProcessId) {
    if is_init(parent) {
        return;
    }
    let (children, zombies) = {
        let Some(parent_proc) = mgr.get_process_mut(parent) else {
            return;
        };
        (
            core::mem::take(&mut parent_proc.children),
            core::mem::take(&mut parent_proc.zombie_children),
        )
    };
    if children.is_empty() && zombies.is_empty() {
        return;
    }

    let init_exists = mgr.get_process(INIT_PID).is_some();
    let adopted = children.len() as u64;

    for &child in children.iter().chain(zombies.iter()) {
        if let Some(child_proc) = mgr.get_process_mut(child) {
            child_proc.parent = if init_exists { Some(INIT_PID) } else { None };
        }
        log::debug!(
            "Reparenting process {} from {} to init",
            child.as_u64(),
            parent.as_u64()
        );
    }

    if let Some(init_proc) = mgr.get_process_mut(INIT_PID) {
        init_proc.children.extend(children);
        init_proc.zombie_children.extend(zombies);
    }

    if adopted > 0 {
        mgr.exit_stats.orphan_count += adopted;
        log::info!(
            "Reparented {} children of process {} to init",
            adopted,
            parent.as_u64()
        );
    }
}

fn find_zombie_child(
    mgr: &ProcessManager,
    parent: ProcessId,
    target: WaitTarget,
) -> Option<ProcessId> {
    let parent_proc = mgr.get_process(parent)?;
    parent_proc
        .zombie_children
        .iter()
        .copied()
        .find(|&pid| target.matches(pid))
}

fn find_stopped(
    mgr: &ProcessManager,
    parent: ProcessId,
    target: WaitTarget,
) -> Option<ProcessId> {
    let parent_proc = mgr.get_process(parent)?;
    parent_proc.children.iter().copied().find(|&pid| {
        target.matches(pid)
            && mgr
                .get_process(pid)
                .map(|p| p.state == ProcessState::Stopped && p.stopped_pending_report)
                .unwrap_or(false)
    })
}

fn find_continued(
    mgr: &ProcessManager,
    parent: ProcessId,
    target: WaitTarget,
) -> Option<ProcessId> {
    let parent_proc = mgr.get_process(parent)?;
    parent_proc.children.iter().copied().find(|&pid| {
        target.matches(pid)
            && mgr
                .get_process(pid)
                .map(|p| p.continued_pending_report)
                .unwrap_or(false)
    })
}

fn has_matching_child(mgr: &ProcessManager, parent: ProcessId, target: WaitTarget) -> bool {
    let Some(parent_proc) = mgr.get_process(parent) else {
        return false;
    };
    parent_proc
        .children
        .iter()
        .chain(parent_proc.zombie_children.iter())
        .any(|&pid| target.matches(pid))
}

//! Signal delivery engine
//!
//! Implements the generate, mask-check, queue/coalesce, deliver
//! pipeline. Signals travel per-process through 63 bounded priority
//! queues; delivery walks priority levels from CRITICAL down to the
//! real-time range, so a SIGSEGV always preempts a pending SIGCHLD and
//! real-time signals drain in number-then-arrival order.
//!
//! Delivery runs synchronously in the generating context when the target
//! is RUNNING; there is no delivery thread, and `deliver_pending` must
//! never block.

use super::constants::*;
use super::queue::SignalQueue;
use super::types::{
    default_action, MaskHow, SaFlags, SigAction, SigHandler, SigInfo, SigSet,
    SignalDefaultAction, SignalSource,
};
use crate::error::KernelError;
use crate::process::{exit, Process, ProcessId, ProcessManager, ProcessState};
use crate::time;
use alloc::vec::Vec;

bitflags::bitflags! {
    /// Flags steering signal generation and delivery
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeliverFlags: u32 {
        /// Asynchronous delivery
        const ASYNC = 0x01;
        /// Synchronous delivery
        const SYNC = 0x02;
        /// Force delivery, bypassing the blocked mask at queue time
        const FORCE = 0x04;
        /// Allow merging with an already-pending instance
        const COALESCE = 0x08;
        /// Queue only; do not trigger synchronous delivery
        const QUEUE = 0x10;
    }
}

/// Aggregate delivery statistics, kept on the process manager
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryStats {
    /// Total signals generated (queued)
    pub signals_generated: u64,
    /// Total signals delivered
    pub signals_delivered: u64,
    /// Generations deferred by the blocked mask (pending bit only)
    pub signals_blocked: u64,
    /// Signals dropped because a queue was full
    pub signals_discarded: u64,
    /// Generations merged into an already-pending instance
    pub signals_coalesced: u64,
    /// Deliveries that failed
    pub delivery_failures: u64,
    /// Rolling average delivery time in ticks
    pub average_delivery_time: u64,
    /// Worst-case delivery time in ticks
    pub max_delivery_time: u64,
    /// Queue overflow events
    pub queue_overflows: u64,
}

impl DeliveryStats {
    pub(crate) fn record_delivery(&mut self, elapsed: u64) {
        self.signals_delivered += 1;
        self.average_delivery_time = (self.average_delivery_time + elapsed) / 2;
        if elapsed > self.max_delivery_time {
            self.max_delivery_time = elapsed;
        }
    }

    pub fn reset(&mut self) {
        *self = DeliveryStats::default();
    }
}

/// Saved hand-off record for a dispatched user handler
///
/// The CPU-frame setup that actually enters the handler is an external
/// mechanism; this records what it needs and what sigreturn restores.
#[derive(Debug, Clone, Copy)]
pub struct HandlerFrame {
    /// Signal being handled
    pub signal: u32,
    /// User-space handler entry point
    pub entry: u64,
    /// Signal information passed to the handler
    pub info: SigInfo,
    /// Blocked mask to restore when the handler returns
    pub saved_mask: u64,
}

/// What a single delivery did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Disposition was ignore (explicit or default)
    Ignored,
    /// A user handler hand-off was set up
    HandlerDispatched,
    /// Default action terminated the process
    Terminated,
    /// Default action stopped the process
    Stopped,
    /// Default action resumed a stopped process
    Continued,
}

/// Per-process signal delivery state
pub struct SignalDeliveryState {
    /// Per-signal pending queues, indexed by `sig - 1`
    queues: Vec<SignalQueue>,
    /// Bitmask of signals with at least one pending instance
    pending_mask: u64,
    /// Queued entries across all queues
    total_pending: u32,
    /// Guards against re-entrant delivery
    delivery_active: bool,
    /// Signal currently being delivered, 0 when idle
    current_signal: u32,
    /// Signals delivered to this process
    delivered_count: u32,
    /// Tick timestamp of the last delivery pass
    last_delivery_time: u64,
}

impl SignalDeliveryState {
    pub fn new() -> Self {
        SignalDeliveryState {
            queues: (1..=NSIG).map(SignalQueue::new).collect(),
            pending_mask: 0,
            total_pending: 0,
            delivery_active: false,
            current_signal: 0,
            delivered_count: 0,
            last_delivery_time: 0,
        }
    }

    #[inline]
    pub fn pending_mask(&self) -> u64 {
        self.pending_mask
    }

    pub fn total_pending(&self) -> u32 {
        self.total_pending
    }

    pub fn delivered_count(&self) -> u32 {
        self.delivered_count
    }

    pub fn last_delivery_time(&self) -> u64 {
        self.last_delivery_time
    }

    #[inline]
    pub fn delivery_active(&self) -> bool {
        self.delivery_active
    }

    pub fn current_signal(&self) -> u32 {
        self.current_signal
    }

    /// Check whether a signal is pending; `sig == 0` asks "any signal?"
    pub fn is_pending(&self, sig: u32) -> bool {
        if sig == 0 {
            self.pending_mask != 0
        } else {
            (self.pending_mask & sig_mask(sig)) != 0
        }
    }

    /// Fast check used before walking queues
    pub fn has_deliverable(&self, blocked: u64) -> bool {
        (self.pending_mask & !blocked) != 0
    }

    pub fn queue_len(&self, sig: u32) -> u32 {
        if is_valid_signal(sig) {
            self.queues[(sig - 1) as usize].len()
        } else {
            0
        }
    }

    pub(crate) fn set_pending_bit(&mut self, sig: u32) {
        self.pending_mask |= sig_mask(sig);
    }

    pub(crate) fn clear_pending_bit(&mut self, sig: u32) {
        self.pending_mask &= !sig_mask(sig);
    }

    /// Queue an instance and account for it
    pub(crate) fn enqueue(
        &mut self,
        sig: u32,
        info: SigInfo,
        flags: DeliverFlags,
    ) -> Result<(), KernelError> {
        self.queues[(sig - 1) as usize].enqueue(sig, info, flags)?;
        self.pending_mask |= sig_mask(sig);
        self.total_pending += 1;
        Ok(())
    }

    /// Dequeue the next queued instance of a signal, fixing up the
    /// pending bit when the queue drains
    pub(crate) fn take_queued(&mut self, sig: u32) -> Option<SigInfo> {
        let queue = &mut self.queues[(sig - 1) as usize];
        let entry = queue.dequeue()?;
        self.total_pending -= 1;
        if queue.is_empty() {
            self.pending_mask &= !sig_mask(sig);
        }
        Some(entry.info)
    }

    pub(crate) fn set_delivery_active(&mut self, active: bool) {
        self.delivery_active = active;
    }

    pub(crate) fn set_current_signal(&mut self, sig: u32) {
        self.current_signal = sig;
    }

    pub(crate) fn finish_delivery_pass(&mut self, delivered: u32) {
        self.delivery_active = false;
        self.last_delivery_time = time::get_ticks();
        self.delivered_count += delivered;
    }

    /// Drop every queued instance and pending bit; returns entries freed
    pub fn clear_all(&mut self) -> u32 {
        let mut cleared = 0;
        for queue in self.queues.iter_mut() {
            cleared += queue.clear();
        }
        self.pending_mask = 0;
        self.total_pending = 0;
        cleared
    }

    #[cfg(test)]
    pub(crate) fn shrink_queue_for_test(&mut self, sig: u32, cap: u32) {
        self.queues[(sig - 1) as usize].set_capacity_for_test(cap);
    }
}

impl Default for SignalDeliveryState {
    fn default() -> Self {
        Self::new()
    }
}

enum GenOutcome {
    BlockedPendingOnly,
    Coalesced,
    Queued { trigger: bool },
    Overflow,
}

/// Generate a signal toward a process
///
/// The entry point for every signal source: hardware traps, `kill`,
/// timers, and the exit path itself. Validates, consults the target's
/// blocked mask, then queues, coalesces, or drops the instance. If the
/// target is currently RUNNING and no delivery is in flight, pending
/// signals are delivered synchronously before returning.
pub fn signal_generate(
    mgr: &mut ProcessManager,
    target: ProcessId,
    sig: u32,
    info: Option<SigInfo>,
    source: SignalSource,
    flags: DeliverFlags,
) -> Result<(), KernelError> {
    if !is_valid_signal(sig) {
        return Err(KernelError::InvalidArgument);
    }

    let outcome = {
        let proc = mgr
            .get_process_mut(target)
            .ok_or(KernelError::NoSuchProcess)?;
        if proc.is_terminated() {
            log::debug!(
                "Dropping {} for dead process {}",
                signal_name(sig),
                target.as_u64()
            );
            return Ok(());
        }

        let blocked = proc.sigmask.is_blocked(sig);
        if blocked && !flags.contains(DeliverFlags::FORCE) && !is_realtime_signal(sig) {
            // Duplicate blocked standard signals are represented once,
            // by the pending bit alone; RT signals must not be lost and
            // keep queueing below.
            proc.signals.set_pending_bit(sig);
            GenOutcome::BlockedPendingOnly
        } else if flags.contains(DeliverFlags::COALESCE)
            && can_coalesce(sig)
            && proc.signals.is_pending(sig)
        {
            // First-wins: the queued instance keeps its original payload
            GenOutcome::Coalesced
        } else if proc.signals.total_pending() >= MAX_PENDING_SIGNALS {
            GenOutcome::Overflow
        } else {
            let mut signal_info = info.unwrap_or_else(|| SigInfo::new(sig, source));
            signal_info.timestamp = time::get_ticks();
            match proc.signals.enqueue(sig, signal_info, flags) {
                Ok(()) => {
                    let trigger = proc.state == ProcessState::Running
                        && !proc.signals.delivery_active()
                        && !flags.contains(DeliverFlags::QUEUE);
                    GenOutcome::Queued { trigger }
                }
                Err(_) => GenOutcome::Overflow,
            }
        }
    };

    match outcome {
        GenOutcome::BlockedPendingOnly => {
            mgr.signal_stats.signals_blocked += 1;
            Ok(())
        }
        GenOutcome::Coalesced => {
            mgr.signal_stats.signals_coalesced += 1;
            Ok(())
        }
        GenOutcome::Overflow => {
            mgr.signal_stats.signals_discarded += 1;
            mgr.signal_stats.queue_overflows += 1;
            log::warn!(
                "Signal queue full, dropping {} for process {}",
                signal_name(sig),
                target.as_u64()
            );
            Err(KernelError::QueueFull)
        }
        GenOutcome::Queued { trigger } => {
            mgr.signal_stats.signals_generated += 1;
            if trigger {
                let _ = deliver_pending(mgr, target);
            }
            Ok(())
        }
    }
}

/// Deliver every deliverable pending signal to a process
///
/// Walks priority levels from CRITICAL to the deepest RT level; at each
/// level drains the matching queues unless the mask defers them. Refuses
/// re-entry while a delivery pass is already active. Returns the number
/// of signals delivered.
pub fn deliver_pending(mgr: &mut ProcessManager, pid: ProcessId) -> Result<u32, KernelError> {
    {
        let proc = mgr.get_process_mut(pid).ok_or(KernelError::NoSuchProcess)?;
        if !proc.is_alive() {
            return Ok(0);
        }
        if proc.signals.delivery_active() {
            return Ok(0);
        }
        if !proc.signals.has_deliverable(proc.sigmask.blocked()) {
            return Ok(0);
        }
        proc.signals.set_delivery_active(true);
    }

    let mut delivered = 0u32;
    'sweep: for priority in PRIORITY_CRITICAL..=PRIORITY_MAX {
        for sig in 1..=NSIG {
            if signal_priority(sig) != priority {
                continue;
            }
            loop {
                let info = {
                    let proc = match mgr.get_process_mut(pid) {
                        Some(p) => p,
                        None => break 'sweep,
                    };
                    if !proc.is_alive() {
                        break 'sweep;
                    }
                    if !proc.signals.is_pending(sig) || proc.sigmask.is_blocked(sig) {
                        break;
                    }
                    match proc.signals.take_queued(sig) {
                        Some(info) => info,
                        None => {
                            // Pending bit without a queued entry: a
                            // standard signal deferred while blocked.
                            proc.signals.clear_pending_bit(sig);
                            SigInfo::new(sig, SignalSource::Kernel)
                        }
                    }
                };

                match deliver_immediate(mgr, pid, sig, info) {
                    Ok(outcome) => {
                        delivered += 1;
                        match outcome {
                            DeliveryOutcome::Terminated | DeliveryOutcome::Stopped => break 'sweep,
                            // Only one user handler can be entered per
                            // return to userspace
                            DeliveryOutcome::HandlerDispatched => break 'sweep,
                            DeliveryOutcome::Ignored | DeliveryOutcome::Continued => {}
                        }
                    }
                    Err(_) => {
                        mgr.signal_stats.delivery_failures += 1;
                        break 'sweep;
                    }
                }
            }
        }
    }

    if let Some(proc) = mgr.get_process_mut(pid) {
        proc.signals.finish_delivery_pass(delivered);
    }
    Ok(delivered)
}

/// Deliver one signal instance right now
///
/// Resolves the disposition and either ignores, hands off to the user
/// handler mechanism, or dispatches the default action, which for
/// fatal/stop/continue signals drives the termination state machine.
pub fn deliver_immediate(
    mgr: &mut ProcessManager,
    pid: ProcessId,
    sig: u32,
    info: SigInfo,
) -> Result<DeliveryOutcome, KernelError> {
    if !is_valid_signal(sig) {
        return Err(KernelError::InvalidArgument);
    }
    let start = time::get_ticks();

    let action = {
        let proc = mgr.get_process_mut(pid).ok_or(KernelError::NoSuchProcess)?;
        proc.signals.set_current_signal(sig);
        proc.sigmask.action(sig)?
    };

    log::debug!(
        "Delivering signal {} ({}) to process {}",
        sig,
        signal_name(sig),
        pid.as_u64()
    );

    let outcome = match action.handler {
        SigHandler::Ignore => {
            log::debug!("Signal {} ignored by process {}", sig, pid.as_u64());
            DeliveryOutcome::Ignored
        }
        SigHandler::Handler(entry) => dispatch_to_handler(mgr, pid, sig, info, entry, &action),
        SigHandler::Default => dispatch_default_action(mgr, pid, sig),
    };

    mgr.signal_stats.record_delivery(time::get_ticks() - start);
    if let Some(proc) = mgr.get_process_mut(pid) {
        proc.signals.set_current_signal(0);
    }
    Ok(outcome)
}

/// Record the hand-off to a user-defined handler
///
/// The external handler-entry mechanism consumes the frame; here the
/// handler's signal mask takes effect and the previous mask is saved for
/// sigreturn.
fn dispatch_to_handler(
    mgr: &mut ProcessManager,
    pid: ProcessId,
    sig: u32,
    info: SigInfo,
    entry: u64,
    action: &SigAction,
) -> DeliveryOutcome {
    if let Some(proc) = mgr.get_process_mut(pid) {
        let saved_mask = proc.sigmask.blocked();
        let mut block = action.mask.to_mask();
        if !action.flags.contains(SaFlags::NODEFER) {
            block |= sig_mask(sig);
        }
        proc.sigmask
            .mask_change(MaskHow::Block, SigSet::from_mask(block));
        proc.handler_frames.push(HandlerFrame {
            signal: sig,
            entry,
            info,
            saved_mask,
        });
        log::info!(
            "Signal {} delivered to handler at {:#x} for process {}",
            sig,
            entry,
            pid.as_u64()
        );
    }
    DeliveryOutcome::HandlerDispatched
}

/// Return from a user signal handler (the sigreturn path)
///
/// Pops the most recent handler frame and restores the blocked mask it
/// saved.
pub fn signal_handler_return(mgr: &mut ProcessManager, pid: ProcessId) -> Result<(), KernelError> {
    let proc = mgr.get_process_mut(pid).ok_or(KernelError::NoSuchProcess)?;
    let frame = proc
        .handler_frames
        .pop()
        .ok_or(KernelError::InvalidArgument)?;
    proc.sigmask
        .mask_change(MaskHow::SetMask, SigSet::from_mask(frame.saved_mask));
    log::debug!(
        "Process {} returned from handler for signal {}",
        pid.as_u64(),
        frame.signal
    );
    Ok(())
}

/// Dispatch a signal's default action
fn dispatch_default_action(mgr: &mut ProcessManager, pid: ProcessId, sig: u32) -> DeliveryOutcome {
    match default_action(sig) {
        SignalDefaultAction::Terminate => {
            log::info!(
                "Process {} terminated by signal {} ({})",
                pid.as_u64(),
                sig,
                signal_name(sig)
            );
            exit::process_kill(mgr, pid, sig);
            DeliveryOutcome::Terminated
        }
        SignalDefaultAction::Stop => {
            log::info!(
                "Process {} stopped by signal {} ({})",
                pid.as_u64(),
                sig,
                signal_name(sig)
            );
            exit::process_stop(mgr, pid, sig);
            DeliveryOutcome::Stopped
        }
        SignalDefaultAction::Continue => {
            if exit::process_continue(mgr, pid) {
                log::info!(
                    "Process {} continued by signal {} ({})",
                    pid.as_u64(),
                    sig,
                    signal_name(sig)
                );
                DeliveryOutcome::Continued
            } else {
                DeliveryOutcome::Ignored
            }
        }
        SignalDefaultAction::Ignore => {
            log::debug!(
                "Signal {} ({}) ignored (default) by process {}",
                sig,
                signal_name(sig),
                pid.as_u64()
            );
            DeliveryOutcome::Ignored
        }
    }
}

/// Take the next pending signal out of the requested set
///
/// Used by sigwaitinfo/sigtimedwait. Honors priority order and, unlike
/// normal delivery, takes signals regardless of the blocked mask (the
/// caller is expected to have them blocked).
pub fn signal_take_pending(proc: &mut Process, set: SigSet) -> Option<SigInfo> {
    for priority in PRIORITY_CRITICAL..=PRIORITY_MAX {
        for sig in 1..=NSIG {
            if signal_priority(sig) != priority || !set.contains(sig) {
                continue;
            }
            if !proc.signals.is_pending(sig) {
                continue;
            }
            if let Some(info) = proc.signals.take_queued(sig) {
                return Some(info);
            }
            proc.signals.clear_pending_bit(sig);
            return Some(SigInfo::new(sig, SignalSource::Kernel));
        }
    }
    None
}

/// Timer interrupt entry point: advance time and fire expired alarms
///
/// Returns the number of alarms that fired.
pub fn timer_tick(mgr: &mut ProcessManager, elapsed: u64) -> u32 {
    time::advance_ticks(elapsed);
    let mut fired = 0;
    for pid in mgr.all_pids() {
        let expired = match mgr.get_process_mut(pid) {
            Some(proc) if proc.is_alive() => proc.alarm.tick(elapsed),
            _ => false,
        };
        if expired {
            log::debug!("Alarm expired for process {}", pid.as_u64());
            let info = SigInfo::new(SIGALRM, SignalSource::Timer);
            let _ = signal_generate(
                mgr,
                pid,
                SIGALRM,
                Some(info),
                SignalSource::Timer,
                DeliverFlags::empty(),
            );
            fired += 1;
        }
    }
    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::types::SigVal;
    use crate::test_support::{manager_with_init, spawn};

    fn install_handler(mgr: &mut ProcessManager, pid: ProcessId, sig: u32, entry: u64) {
        mgr.get_process_mut(pid)
            .unwrap()
            .sigmask
            .install_handler(sig, SigHandler::Handler(entry))
            .unwrap();
    }

    fn block(mgr: &mut ProcessManager, pid: ProcessId, sig: u32) {
        let set = SigSet::from_mask(sig_mask(sig));
        mgr.get_process_mut(pid)
            .unwrap()
            .sigmask
            .mask_change(MaskHow::Block, set);
    }

    fn unblock(mgr: &mut ProcessManager, pid: ProcessId, sig: u32) {
        let set = SigSet::from_mask(sig_mask(sig));
        mgr.get_process_mut(pid)
            .unwrap()
            .sigmask
            .mask_change(MaskHow::Unblock, set);
    }

    #[test]
    fn invalid_signal_is_rejected_without_side_effects() {
        let (mut mgr, init) = manager_with_init();
        let err = signal_generate(
            &mut mgr,
            init,
            0,
            None,
            SignalSource::Kernel,
            DeliverFlags::empty(),
        );
        assert_eq!(err, Err(KernelError::InvalidArgument));
        let err = signal_generate(
            &mut mgr,
            init,
            NSIG + 1,
            None,
            SignalSource::Kernel,
            DeliverFlags::empty(),
        );
        assert_eq!(err, Err(KernelError::InvalidArgument));
        assert_eq!(mgr.signal_stats.signals_generated, 0);
        assert_eq!(mgr.get_process(init).unwrap().pending_signals(), 0);
    }

    #[test]
    fn unknown_pid_is_rejected() {
        let (mut mgr, _) = manager_with_init();
        let err = signal_generate(
            &mut mgr,
            ProcessId::new(99),
            SIGTERM,
            None,
            SignalSource::Kernel,
            DeliverFlags::empty(),
        );
        assert_eq!(err, Err(KernelError::NoSuchProcess));
    }

    #[test]
    fn priority_order_segv_before_chld_before_rt() {
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "victim");
        for sig in [SIGCHLD, SIGSEGV, 40] {
            install_handler(&mut mgr, pid, sig, 0x1000 + sig as u64);
        }
        // generate in "wrong" order; the process is Ready so nothing
        // delivers synchronously
        for sig in [SIGCHLD, 40, SIGSEGV] {
            signal_generate(
                &mut mgr,
                pid,
                sig,
                None,
                SignalSource::Kernel,
                DeliverFlags::empty(),
            )
            .unwrap();
        }

        let mut seen = alloc::vec::Vec::new();
        for _ in 0..3 {
            assert!(deliver_pending(&mut mgr, pid).unwrap() >= 1);
            let frame = *mgr
                .get_process(pid)
                .unwrap()
                .handler_frames
                .last()
                .unwrap();
            seen.push(frame.signal);
            signal_handler_return(&mut mgr, pid).unwrap();
        }
        assert_eq!(seen, alloc::vec![SIGSEGV, SIGCHLD, 40]);
    }

    #[test]
    fn sig_ign_disposition_is_idempotent() {
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "quiet");
        mgr.get_process_mut(pid)
            .unwrap()
            .sigmask
            .install_handler(SIGUSR1, SigHandler::Ignore)
            .unwrap();

        signal_generate(
            &mut mgr,
            pid,
            SIGUSR1,
            None,
            SignalSource::Process,
            DeliverFlags::empty(),
        )
        .unwrap();
        let delivered = deliver_pending(&mut mgr, pid).unwrap();
        assert_eq!(delivered, 1);

        let proc = mgr.get_process(pid).unwrap();
        assert_eq!(proc.state, ProcessState::Ready);
        assert_eq!(proc.pending_signals(), 0);
        assert_eq!(proc.signals.queue_len(SIGUSR1), 0);
        assert_eq!(mgr.signal_stats.signals_delivered, 1);
    }

    #[test]
    fn coalescable_signal_blocked_three_times_delivers_once() {
        // Scenario: SIGHUP generated three times with COALESCE while
        // blocked collapses to a single pending instance and a single
        // delivery after unblocking.
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "hupped");
        block(&mut mgr, pid, SIGHUP);

        for _ in 0..3 {
            signal_generate(
                &mut mgr,
                pid,
                SIGHUP,
                None,
                SignalSource::Process,
                DeliverFlags::COALESCE,
            )
            .unwrap();
        }
        {
            let proc = mgr.get_process(pid).unwrap();
            assert!(proc.signals.is_pending(SIGHUP));
            // blocked standard signals are represented by the bit alone
            assert_eq!(proc.signals.queue_len(SIGHUP), 0);
        }
        assert_eq!(mgr.signal_stats.signals_blocked, 3);

        unblock(&mut mgr, pid, SIGHUP);
        let delivered = deliver_pending(&mut mgr, pid).unwrap();
        assert_eq!(delivered, 1);
        // SIGHUP's default disposition is fatal
        assert!(mgr.get_process(pid).unwrap().is_zombie());
    }

    #[test]
    fn coalesce_while_unblocked_keeps_first_instance() {
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "coalesced");
        install_handler(&mut mgr, pid, SIGHUP, 0x2000);

        let first = SigInfo::new(SIGHUP, SignalSource::Process).with_sender(11, 0);
        let second = SigInfo::new(SIGHUP, SignalSource::Process).with_sender(22, 0);
        signal_generate(
            &mut mgr,
            pid,
            SIGHUP,
            Some(first),
            SignalSource::Process,
            DeliverFlags::COALESCE,
        )
        .unwrap();
        signal_generate(
            &mut mgr,
            pid,
            SIGHUP,
            Some(second),
            SignalSource::Process,
            DeliverFlags::COALESCE,
        )
        .unwrap();

        assert_eq!(mgr.signal_stats.signals_coalesced, 1);
        let proc = mgr.get_process_mut(pid).unwrap();
        assert_eq!(proc.signals.queue_len(SIGHUP), 1);
        // first-wins: the surviving payload is the first sender's
        let info = proc.signals.take_queued(SIGHUP).unwrap();
        assert_eq!(info.sender_pid, 11);
    }

    #[test]
    fn rt_signals_queue_in_fifo_order_with_payloads() {
        // Scenario: five RT instances with distinct payloads all queue
        // and drain in enqueue order.
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "rt");
        install_handler(&mut mgr, pid, 40, 0x3000);

        for v in 0..5 {
            let info = SigInfo::new(40, SignalSource::Process).with_value(SigVal::Int(v));
            signal_generate(
                &mut mgr,
                pid,
                40,
                Some(info),
                SignalSource::Process,
                DeliverFlags::QUEUE,
            )
            .unwrap();
        }
        assert_eq!(mgr.get_process(pid).unwrap().signals.queue_len(40), 5);

        // beyond capacity the instance is dropped and counted
        mgr.get_process_mut(pid)
            .unwrap()
            .signals
            .shrink_queue_for_test(40, 5);
        let err = signal_generate(
            &mut mgr,
            pid,
            40,
            Some(SigInfo::new(40, SignalSource::Process).with_value(SigVal::Int(99))),
            SignalSource::Process,
            DeliverFlags::QUEUE,
        );
        assert_eq!(err, Err(KernelError::QueueFull));
        assert_eq!(mgr.signal_stats.signals_discarded, 1);
        assert_eq!(mgr.signal_stats.queue_overflows, 1);

        for v in 0..5 {
            deliver_pending(&mut mgr, pid).unwrap();
            let frame = *mgr
                .get_process(pid)
                .unwrap()
                .handler_frames
                .last()
                .unwrap();
            assert_eq!(frame.signal, 40);
            assert_eq!(frame.info.value, SigVal::Int(v));
            signal_handler_return(&mut mgr, pid).unwrap();
        }
        assert_eq!(mgr.get_process(pid).unwrap().signals.queue_len(40), 0);
    }

    #[test]
    fn blocked_rt_signals_still_queue() {
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "rt-blocked");
        install_handler(&mut mgr, pid, 35, 0x4000);
        block(&mut mgr, pid, 35);

        signal_generate(
            &mut mgr,
            pid,
            35,
            None,
            SignalSource::Process,
            DeliverFlags::empty(),
        )
        .unwrap();
        {
            let proc = mgr.get_process(pid).unwrap();
            assert_eq!(proc.signals.queue_len(35), 1);
            assert!(proc.signals.is_pending(35));
        }
        // delivery is deferred while blocked
        assert_eq!(deliver_pending(&mut mgr, pid).unwrap(), 0);

        unblock(&mut mgr, pid, 35);
        assert_eq!(deliver_pending(&mut mgr, pid).unwrap(), 1);
    }

    #[test]
    fn force_flag_queues_past_the_mask() {
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "forced");
        block(&mut mgr, pid, SIGTERM);

        signal_generate(
            &mut mgr,
            pid,
            SIGTERM,
            None,
            SignalSource::Kernel,
            DeliverFlags::FORCE,
        )
        .unwrap();
        // a real entry was queued, not just the pending bit
        assert_eq!(mgr.get_process(pid).unwrap().signals.queue_len(SIGTERM), 1);
    }

    #[test]
    fn delivery_refuses_reentry() {
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "reentrant");
        signal_generate(
            &mut mgr,
            pid,
            SIGUSR1,
            None,
            SignalSource::Kernel,
            DeliverFlags::empty(),
        )
        .unwrap();
        mgr.get_process_mut(pid)
            .unwrap()
            .signals
            .set_delivery_active(true);
        assert_eq!(deliver_pending(&mut mgr, pid).unwrap(), 0);
        mgr.get_process_mut(pid)
            .unwrap()
            .signals
            .set_delivery_active(false);
        assert_eq!(deliver_pending(&mut mgr, pid).unwrap(), 1);
    }

    #[test]
    fn handler_mask_applies_and_sigreturn_restores() {
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "masked-handler");
        let mut during = SigSet::empty();
        during.add(SIGUSR2).unwrap();
        mgr.get_process_mut(pid)
            .unwrap()
            .sigmask
            .set_action(
                SIGUSR1,
                SigAction {
                    handler: SigHandler::Handler(0x5000),
                    mask: during,
                    flags: SaFlags::empty(),
                },
            )
            .unwrap();

        signal_generate(
            &mut mgr,
            pid,
            SIGUSR1,
            None,
            SignalSource::Process,
            DeliverFlags::empty(),
        )
        .unwrap();
        deliver_pending(&mut mgr, pid).unwrap();

        {
            let proc = mgr.get_process(pid).unwrap();
            // the handler's mask plus the signal itself are blocked
            assert!(proc.sigmask.is_blocked(SIGUSR1));
            assert!(proc.sigmask.is_blocked(SIGUSR2));
            assert_eq!(proc.handler_frames.len(), 1);
        }

        signal_handler_return(&mut mgr, pid).unwrap();
        let proc = mgr.get_process(pid).unwrap();
        assert!(!proc.sigmask.is_blocked(SIGUSR1));
        assert!(!proc.sigmask.is_blocked(SIGUSR2));

        // sigreturn without a frame is an error
        assert_eq!(
            signal_handler_return(&mut mgr, pid),
            Err(KernelError::InvalidArgument)
        );
    }

    #[test]
    fn running_target_gets_synchronous_delivery() {
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "running");
        mgr.set_current_pid(pid);
        install_handler(&mut mgr, pid, SIGUSR1, 0x6000);

        signal_generate(
            &mut mgr,
            pid,
            SIGUSR1,
            None,
            SignalSource::Process,
            DeliverFlags::empty(),
        )
        .unwrap();
        // delivered in the generating call, nothing left pending
        let proc = mgr.get_process(pid).unwrap();
        assert_eq!(proc.handler_frames.len(), 1);
        assert_eq!(proc.pending_signals(), 0);
    }

    #[test]
    fn queue_flag_defers_synchronous_delivery() {
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "queued");
        mgr.set_current_pid(pid);
        install_handler(&mut mgr, pid, SIGUSR1, 0x7000);

        signal_generate(
            &mut mgr,
            pid,
            SIGUSR1,
            None,
            SignalSource::Process,
            DeliverFlags::QUEUE,
        )
        .unwrap();
        let proc = mgr.get_process(pid).unwrap();
        assert!(proc.handler_frames.is_empty());
        assert!(proc.signals.is_pending(SIGUSR1));
    }

    #[test]
    fn take_pending_honors_the_requested_set_and_priority() {
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "waiter");
        for sig in [SIGUSR1, SIGSEGV] {
            block(&mut mgr, pid, sig);
            signal_generate(
                &mut mgr,
                pid,
                sig,
                None,
                SignalSource::Process,
                DeliverFlags::FORCE,
            )
            .unwrap();
        }

        let mut set = SigSet::empty();
        set.add(SIGUSR1).unwrap();
        set.add(SIGSEGV).unwrap();
        let proc = mgr.get_process_mut(pid).unwrap();
        let first = signal_take_pending(proc, set).unwrap();
        assert_eq!(first.signo, SIGSEGV);
        let second = signal_take_pending(proc, set).unwrap();
        assert_eq!(second.signo, SIGUSR1);
        assert!(signal_take_pending(proc, set).is_none());
    }

    #[test]
    fn is_pending_with_zero_asks_for_any_signal() {
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "anyone");
        assert!(!mgr.get_process(pid).unwrap().signals.is_pending(0));
        signal_generate(
            &mut mgr,
            pid,
            SIGUSR2,
            None,
            SignalSource::Kernel,
            DeliverFlags::QUEUE,
        )
        .unwrap();
        let proc = mgr.get_process(pid).unwrap();
        assert!(proc.signals.is_pending(0));
        assert!(proc.signals.is_pending(SIGUSR2));
        assert!(!proc.signals.is_pending(SIGUSR1));
    }

    #[test]
    fn timer_tick_fires_expired_alarms() {
        let (mut mgr, init) = manager_with_init();
        let pid = spawn(&mut mgr, init, "alarmed");
        mgr.get_process_mut(pid).unwrap().alarm.set(5);

        assert_eq!(timer_tick(&mut mgr, 3), 0);
        assert!(!mgr.get_process(pid).unwrap().signals.is_pending(SIGALRM));
        assert_eq!(timer_tick(&mut mgr, 2), 1);
        assert!(mgr.get_process(pid).unwrap().signals.is_pending(SIGALRM));
        // one-shot: no refire
        assert_eq!(timer_tick(&mut mgr, 10), 0);
    }
}

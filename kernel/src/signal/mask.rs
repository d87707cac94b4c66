//! Per-process signal mask and disposition table
//!
//! Owns the blocked set, the saved mask used by sigsuspend, the 63-entry
//! action table and the alternate signal stack. SIGKILL and SIGSTOP are
//! enforced here: they can never be blocked and their actions can never
//! be replaced, so the delivery engine does not re-check them per call.

use super::constants::*;
use super::types::{MaskHow, SaFlags, SigAction, SigHandler, SigSet, StackT};
use crate::error::KernelError;

/// Per-process signal mask state
///
/// Note: the action table is boxed; 63 entries inline would bloat every
/// process record and the table is cold next to the masks.
#[derive(Clone)]
pub struct SignalMaskState {
    /// Blocked signals bitmap (sigprocmask)
    blocked: u64,
    /// Mask saved by `suspend`, restored by `restore`
    saved_mask: u64,
    /// Whether a suspend is in effect
    suspended: bool,
    /// Signal actions, indexed by `sig - 1`
    actions: alloc::boxed::Box<[SigAction; NSIG as usize]>,
    /// Alternate signal stack configuration
    alt_stack: StackT,
    /// Number of mask changes, for diagnostics
    mask_change_count: u32,
}

impl Default for SignalMaskState {
    fn default() -> Self {
        SignalMaskState {
            blocked: 0,
            saved_mask: 0,
            suspended: false,
            actions: alloc::boxed::Box::new([SigAction::default(); NSIG as usize]),
            alt_stack: StackT::default(),
            mask_change_count: 0,
        }
    }
}

impl SignalMaskState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current blocked mask
    #[inline]
    pub fn blocked(&self) -> u64 {
        self.blocked
    }

    /// Check if a signal is currently blocked
    ///
    /// Unblockable signals are never blocked.
    #[inline]
    pub fn is_blocked(&self, sig: u32) -> bool {
        (self.blocked & sig_mask(sig) & !UNCATCHABLE_SIGNALS) != 0
    }

    /// Atomically update the blocked set, returning the previous mask
    ///
    /// Attempts to block SIGKILL/SIGSTOP are silently stripped rather
    /// than rejected, matching POSIX sigprocmask.
    pub fn mask_change(&mut self, how: MaskHow, set: SigSet) -> u64 {
        let old = self.blocked;
        match how {
            MaskHow::Block => self.blocked |= set.to_mask(),
            MaskHow::Unblock => self.blocked &= !set.to_mask(),
            MaskHow::SetMask => self.blocked = set.to_mask(),
        }
        self.blocked &= !UNCATCHABLE_SIGNALS;
        self.mask_change_count += 1;
        old
    }

    /// Install a temporary mask for sigsuspend, saving the current one
    pub fn suspend(&mut self, mask: SigSet) {
        self.saved_mask = self.blocked;
        self.suspended = true;
        self.blocked = mask.to_mask() & !UNCATCHABLE_SIGNALS;
        self.mask_change_count += 1;
    }

    /// Restore the mask saved by `suspend`
    ///
    /// No-op when no suspend is in effect.
    pub fn restore(&mut self) {
        if self.suspended {
            self.blocked = self.saved_mask;
            self.suspended = false;
            self.mask_change_count += 1;
        }
    }

    /// Get the action installed for a signal
    pub fn action(&self, sig: u32) -> Result<SigAction, KernelError> {
        if !is_valid_signal(sig) {
            return Err(KernelError::InvalidArgument);
        }
        Ok(self.actions[(sig - 1) as usize])
    }

    /// Replace the action for a signal, returning the previous one
    ///
    /// Fails for SIGKILL/SIGSTOP and out-of-range signals. Unblockable
    /// signals are stripped from the handler mask.
    pub fn set_action(&mut self, sig: u32, mut act: SigAction) -> Result<SigAction, KernelError> {
        if !is_valid_signal(sig) || !is_catchable(sig) {
            return Err(KernelError::InvalidArgument);
        }
        act.mask = SigSet::from_mask(act.mask.to_mask() & !UNCATCHABLE_SIGNALS);
        let old = self.actions[(sig - 1) as usize];
        self.actions[(sig - 1) as usize] = act;
        Ok(old)
    }

    /// Install a simple handler (the signal(2) interface)
    ///
    /// Resets the handler mask and flags, returning the previous handler.
    pub fn install_handler(
        &mut self,
        sig: u32,
        handler: SigHandler,
    ) -> Result<SigHandler, KernelError> {
        let old = self.set_action(
            sig,
            SigAction {
                handler,
                mask: SigSet::empty(),
                flags: SaFlags::empty(),
            },
        )?;
        Ok(old.handler)
    }

    /// Check if a user handler is installed
    pub fn has_custom_handler(&self, sig: u32) -> bool {
        is_valid_signal(sig)
            && matches!(
                self.actions[(sig - 1) as usize].handler,
                SigHandler::Handler(_)
            )
    }

    /// Check if the signal is explicitly ignored
    pub fn is_ignored(&self, sig: u32) -> bool {
        is_valid_signal(sig)
            && matches!(self.actions[(sig - 1) as usize].handler, SigHandler::Ignore)
    }

    /// The alternate signal stack configuration
    pub fn alt_stack(&self) -> StackT {
        self.alt_stack
    }

    /// Replace the alternate signal stack, returning the previous one
    ///
    /// An enabled stack smaller than MINSIGSTKSZ is rejected.
    pub fn set_alt_stack(&mut self, stack: StackT) -> Result<StackT, KernelError> {
        if stack.ss_flags & SS_DISABLE == 0 && stack.ss_size < MINSIGSTKSZ {
            return Err(KernelError::InvalidArgument);
        }
        let old = self.alt_stack;
        self.alt_stack = stack;
        Ok(old)
    }

    /// Number of mask changes since creation
    pub fn mask_change_count(&self) -> u32 {
        self.mask_change_count
    }

    /// Drop all handlers and masks; used by exit cleanup
    pub fn reset(&mut self) {
        self.blocked = 0;
        self.saved_mask = 0;
        self.suspended = false;
        for act in self.actions.iter_mut() {
            *act = SigAction::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_kill_and_stop_is_silently_stripped() {
        let mut state = SignalMaskState::new();
        let mut set = SigSet::empty();
        set.add(SIGKILL).unwrap();
        set.add(SIGSTOP).unwrap();
        set.add(SIGTERM).unwrap();
        state.mask_change(MaskHow::Block, set);
        assert!(!state.is_blocked(SIGKILL));
        assert!(!state.is_blocked(SIGSTOP));
        assert!(state.is_blocked(SIGTERM));
    }

    #[test]
    fn mask_change_returns_previous_mask() {
        let mut state = SignalMaskState::new();
        let mut set = SigSet::empty();
        set.add(SIGHUP).unwrap();
        assert_eq!(state.mask_change(MaskHow::Block, set), 0);
        let old = state.mask_change(MaskHow::SetMask, SigSet::empty());
        assert_eq!(old, sig_mask(SIGHUP));
        assert_eq!(state.blocked(), 0);
    }

    #[test]
    fn unblock_removes_only_named_signals() {
        let mut state = SignalMaskState::new();
        let mut both = SigSet::empty();
        both.add(SIGHUP).unwrap();
        both.add(SIGUSR1).unwrap();
        state.mask_change(MaskHow::Block, both);
        let mut one = SigSet::empty();
        one.add(SIGHUP).unwrap();
        state.mask_change(MaskHow::Unblock, one);
        assert!(!state.is_blocked(SIGHUP));
        assert!(state.is_blocked(SIGUSR1));
    }

    #[test]
    fn set_action_rejects_kill_stop_and_bad_numbers() {
        let mut state = SignalMaskState::new();
        let act = SigAction {
            handler: SigHandler::Handler(0x4000),
            mask: SigSet::empty(),
            flags: SaFlags::empty(),
        };
        assert_eq!(
            state.set_action(SIGKILL, act),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(
            state.set_action(SIGSTOP, act),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(state.set_action(0, act), Err(KernelError::InvalidArgument));
        assert_eq!(
            state.set_action(NSIG + 1, act),
            Err(KernelError::InvalidArgument)
        );
        assert!(state.set_action(SIGTERM, act).is_ok());
        assert!(state.has_custom_handler(SIGTERM));
    }

    #[test]
    fn set_action_strips_uncatchable_from_handler_mask() {
        let mut state = SignalMaskState::new();
        let mut mask = SigSet::empty();
        mask.add(SIGKILL).unwrap();
        mask.add(SIGUSR1).unwrap();
        state
            .set_action(
                SIGTERM,
                SigAction {
                    handler: SigHandler::Ignore,
                    mask,
                    flags: SaFlags::empty(),
                },
            )
            .unwrap();
        let installed = state.action(SIGTERM).unwrap();
        assert!(!installed.mask.contains(SIGKILL));
        assert!(installed.mask.contains(SIGUSR1));
        assert!(state.is_ignored(SIGTERM));
    }

    #[test]
    fn install_handler_returns_previous_and_resets_flags() {
        let mut state = SignalMaskState::new();
        let old = state
            .install_handler(SIGUSR1, SigHandler::Handler(0x1000))
            .unwrap();
        assert_eq!(old, SigHandler::Default);
        let old = state.install_handler(SIGUSR1, SigHandler::Ignore).unwrap();
        assert_eq!(old, SigHandler::Handler(0x1000));
        assert_eq!(
            state.install_handler(SIGKILL, SigHandler::Ignore),
            Err(KernelError::InvalidArgument)
        );
    }

    #[test]
    fn suspend_and_restore() {
        let mut state = SignalMaskState::new();
        let mut orig = SigSet::empty();
        orig.add(SIGHUP).unwrap();
        state.mask_change(MaskHow::SetMask, orig);

        let mut tmp = SigSet::empty();
        tmp.add(SIGUSR2).unwrap();
        state.suspend(tmp);
        assert!(state.is_blocked(SIGUSR2));
        assert!(!state.is_blocked(SIGHUP));

        state.restore();
        assert!(state.is_blocked(SIGHUP));
        assert!(!state.is_blocked(SIGUSR2));

        // restore without a suspend is a no-op
        state.restore();
        assert_eq!(state.blocked(), sig_mask(SIGHUP));
    }

    #[test]
    fn alt_stack_validation() {
        let mut state = SignalMaskState::new();
        let too_small = StackT {
            ss_sp: 0x8000_0000,
            ss_flags: 0,
            ss_size: MINSIGSTKSZ - 1,
        };
        assert_eq!(
            state.set_alt_stack(too_small),
            Err(KernelError::InvalidArgument)
        );

        let ok = StackT {
            ss_sp: 0x8000_0000,
            ss_flags: 0,
            ss_size: MINSIGSTKSZ,
        };
        let old = state.set_alt_stack(ok).unwrap();
        assert_eq!(old.ss_flags, SS_DISABLE);
        assert_eq!(state.alt_stack().ss_sp, 0x8000_0000);

        // disabling does not require a size
        let disable = StackT::default();
        assert!(state.set_alt_stack(disable).is_ok());
    }
}

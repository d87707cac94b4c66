//! Signal-related data structures

use super::constants::*;
use crate::error::KernelError;
use crate::time;

bitflags::bitflags! {
    /// sigaction flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SaFlags: u64 {
        /// Provide siginfo to the handler
        const SIGINFO = 0x0000_0004;
        /// Provide a restorer function
        const RESTORER = 0x0400_0000;
        /// Use the alternate signal stack
        const ONSTACK = 0x0800_0000;
        /// Restart interrupted syscalls
        const RESTART = 0x1000_0000;
        /// Don't block the signal during its own handler
        const NODEFER = 0x4000_0000;
    }
}

/// A set of signals over the 1..=63 signal-number space
///
/// Thin wrapper over the bitmask representation used throughout the
/// delivery path; bit `sig - 1` represents signal `sig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SigSet(u64);

impl SigSet {
    /// The empty set
    pub const fn empty() -> Self {
        SigSet(0)
    }

    /// The set of every valid signal
    pub const fn filled() -> Self {
        SigSet(sig_mask(NSIG) | (sig_mask(NSIG) - 1))
    }

    /// Build a set from a raw bitmask; bits outside 1..=NSIG are dropped
    pub const fn from_mask(mask: u64) -> Self {
        SigSet(mask & Self::filled().0)
    }

    /// The raw bitmask representation
    pub const fn to_mask(self) -> u64 {
        self.0
    }

    /// Add a signal to the set
    pub fn add(&mut self, sig: u32) -> Result<(), KernelError> {
        if !is_valid_signal(sig) {
            return Err(KernelError::InvalidArgument);
        }
        self.0 |= sig_mask(sig);
        Ok(())
    }

    /// Remove a signal from the set
    pub fn remove(&mut self, sig: u32) -> Result<(), KernelError> {
        if !is_valid_signal(sig) {
            return Err(KernelError::InvalidArgument);
        }
        self.0 &= !sig_mask(sig);
        Ok(())
    }

    /// Test membership; false for invalid signal numbers
    pub fn contains(&self, sig: u32) -> bool {
        (self.0 & sig_mask(sig)) != 0
    }

    /// Number of signals in the set
    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Union with another set
    pub fn or(self, other: SigSet) -> SigSet {
        SigSet(self.0 | other.0)
    }

    /// Intersection with another set
    pub fn and(self, other: SigSet) -> SigSet {
        SigSet(self.0 & other.0)
    }

    /// Complement within the valid signal space
    pub fn not(self) -> SigSet {
        SigSet(!self.0 & Self::filled().0)
    }
}

/// Where a signal came from, recorded in `SigInfo::code`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    /// Hardware exception (page fault, illegal instruction, ...)
    Hardware,
    /// Timer expiration
    Timer,
    /// kill/sigqueue from another process
    Process,
    /// Kernel-generated (exit notification, ...)
    Kernel,
    /// Interrupt handler
    Interrupt,
}

impl SignalSource {
    pub fn as_code(self) -> i32 {
        match self {
            SignalSource::Hardware => 1,
            SignalSource::Timer => 2,
            SignalSource::Process => 3,
            SignalSource::Kernel => 4,
            SignalSource::Interrupt => 5,
        }
    }
}

/// Value payload carried by queued (real-time) signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigVal {
    #[default]
    None,
    Int(i32),
    Ptr(u64),
}

/// Signal information accompanying every queued signal instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigInfo {
    /// Signal number
    pub signo: u32,
    /// Associated error number, 0 if none
    pub errno: i32,
    /// Generation source code
    pub code: i32,
    /// Sending process ID, 0 if not process-originated
    pub sender_pid: u64,
    /// Sending user ID
    pub sender_uid: u32,
    /// Exit status or signal (SIGCHLD)
    pub status: i32,
    /// Value payload (sigqueue)
    pub value: SigVal,
    /// Faulting address (SIGSEGV, SIGBUS)
    pub addr: u64,
    /// Trap number that caused the signal
    pub trapno: u32,
    /// Timer overrun count (SIGALRM and friends)
    pub overrun: i32,
    /// Generation timestamp in kernel ticks
    pub timestamp: u64,
}

impl SigInfo {
    /// Create signal information for a freshly generated signal
    pub fn new(sig: u32, source: SignalSource) -> Self {
        SigInfo {
            signo: sig,
            errno: 0,
            code: source.as_code(),
            sender_pid: 0,
            sender_uid: 0,
            status: 0,
            value: SigVal::None,
            addr: 0,
            trapno: 0,
            overrun: 0,
            timestamp: time::get_ticks(),
        }
    }

    /// Record the sending process
    pub fn with_sender(mut self, pid: u64, uid: u32) -> Self {
        self.sender_pid = pid;
        self.sender_uid = uid;
        self
    }

    /// Record the faulting address (SIGSEGV, SIGBUS)
    pub fn with_addr(mut self, addr: u64, trapno: u32) -> Self {
        self.addr = addr;
        self.trapno = trapno;
        self
    }

    /// Record the exiting child (SIGCHLD)
    pub fn with_child(mut self, child_pid: u64, exit_status: i32) -> Self {
        self.sender_pid = child_pid;
        self.status = exit_status;
        self
    }

    /// Attach a sigqueue value payload
    pub fn with_value(mut self, value: SigVal) -> Self {
        self.value = value;
        self
    }

    /// Record timer overrun (SIGALRM and friends)
    pub fn with_timer(mut self, overrun: i32) -> Self {
        self.overrun = overrun;
        self
    }
}

/// Disposition installed for a signal
///
/// A tagged variant rather than a raw handler pointer compared against
/// SIG_DFL/SIG_IGN sentinels; `Handler` carries the user entry point the
/// (external) handler-execution mechanism jumps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigHandler {
    #[default]
    Default,
    Ignore,
    Handler(u64),
}

impl SigHandler {
    /// Encode as the classic SIG_DFL(0)/SIG_IGN(1)/address ABI value
    pub fn to_raw(self) -> u64 {
        match self {
            SigHandler::Default => 0,
            SigHandler::Ignore => 1,
            SigHandler::Handler(addr) => addr,
        }
    }

    /// Decode from the classic ABI value
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            0 => SigHandler::Default,
            1 => SigHandler::Ignore,
            addr => SigHandler::Handler(addr),
        }
    }
}

/// Signal handler configuration (sigaction)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SigAction {
    /// What to do when the signal is delivered
    pub handler: SigHandler,
    /// Signals to block while the handler runs
    pub mask: SigSet,
    /// SA_* flags
    pub flags: SaFlags,
}

/// Alternate signal stack configuration (matches Linux stack_t)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackT {
    /// Base address of the alternate stack
    pub ss_sp: u64,
    /// SS_ONSTACK / SS_DISABLE
    pub ss_flags: u32,
    /// Size of the alternate stack in bytes
    pub ss_size: usize,
}

impl Default for StackT {
    fn default() -> Self {
        StackT {
            ss_sp: 0,
            ss_flags: SS_DISABLE,
            ss_size: 0,
        }
    }
}

/// How sigprocmask combines the supplied set with the blocked set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskHow {
    Block,
    Unblock,
    SetMask,
}

impl MaskHow {
    pub fn from_raw(how: i32) -> Result<Self, KernelError> {
        match how {
            SIG_BLOCK => Ok(MaskHow::Block),
            SIG_UNBLOCK => Ok(MaskHow::Unblock),
            SIG_SETMASK => Ok(MaskHow::SetMask),
            _ => Err(KernelError::InvalidArgument),
        }
    }
}

/// Default action for a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDefaultAction {
    /// Terminate the process
    Terminate,
    /// Ignore the signal
    Ignore,
    /// Stop (pause) the process
    Stop,
    /// Continue a stopped process
    Continue,
}

/// Get the default action for a signal
pub fn default_action(sig: u32) -> SignalDefaultAction {
    let mask = sig_mask(sig);
    if mask & IGNORED_BY_DEFAULT != 0 {
        SignalDefaultAction::Ignore
    } else if mask & STOP_BY_DEFAULT != 0 {
        SignalDefaultAction::Stop
    } else if mask & CONTINUE_BY_DEFAULT != 0 {
        SignalDefaultAction::Continue
    } else {
        // Everything else, real-time signals included, is fatal
        SignalDefaultAction::Terminate
    }
}

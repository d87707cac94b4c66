//! Kernel error taxonomy
//!
//! Typed errors shared by the signal and process subsystems. The syscall
//! boundary maps these onto negative errno values; inside the kernel they
//! travel as ordinary `Result`s.

use crate::syscall::errno;

/// Errors produced by the signal/process core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Bad signal number, unknown pid, malformed argument
    InvalidArgument,
    /// Sender lacks the rights to signal the target
    PermissionDenied,
    /// No process with the requested pid
    NoSuchProcess,
    /// wait/waitpid with no matching live-or-zombie child
    NoSuchChild,
    /// Process table full, pending-signal budget exhausted
    ResourceExhausted,
    /// A bounded signal queue is at capacity; the signal was dropped
    QueueFull,
    /// The operation would block the caller
    WouldBlock,
    /// Requested semantics (e.g. process groups) are not implemented
    NotSupported,
}

impl KernelError {
    /// The errno value surfaced at the syscall boundary
    pub fn errno(self) -> i32 {
        match self {
            KernelError::InvalidArgument => errno::EINVAL,
            KernelError::PermissionDenied => errno::EPERM,
            KernelError::NoSuchProcess => errno::ESRCH,
            KernelError::NoSuchChild => errno::ECHILD,
            KernelError::ResourceExhausted => errno::ENOMEM,
            KernelError::QueueFull => errno::EAGAIN,
            KernelError::WouldBlock => errno::EAGAIN,
            KernelError::NotSupported => errno::ENOSYS,
        }
    }
}

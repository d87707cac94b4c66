//! Signal delivery and process lifecycle core
//!
//! This crate implements the signal-delivery engine and the process
//! termination/wait state machine of a monolithic kernel: per-signal
//! priority queues, the generate/mask-check/queue/deliver pipeline,
//! per-process signal masks and dispositions, the exit/kill/force-kill
//! state machine, and the zombie/wait protocol behind `wait`/`waitpid`.
//!
//! The scheduler, memory management, filesystem and driver layers are
//! external collaborators reached through narrow contracts; this crate
//! only consumes `alloc` and the `log` facade.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;
pub mod process;
pub mod signal;
pub mod syscall;
pub mod time;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::KernelError;

//! POSIX-style signal support
//!
//! Signal numbering, per-process masks and dispositions, bounded
//! per-signal pending queues, and the priority-ordered delivery engine.

pub mod constants;
pub mod delivery;
pub mod mask;
pub mod queue;
pub mod types;

pub use delivery::{
    deliver_pending, signal_generate, signal_handler_return, DeliverFlags, DeliveryStats,
    SignalDeliveryState,
};
pub use mask::SignalMaskState;
pub use types::{SigAction, SigHandler, SigInfo, SigSet, SigVal, SignalSource};

//! Shared helpers for unit tests

use crate::process::{ProcessId, ProcessManager};
use alloc::string::ToString;

/// A fresh manager holding only the init process (pid 1)
pub fn manager_with_init() -> (ProcessManager, ProcessId) {
    let mut mgr = ProcessManager::new();
    let init = mgr.create_process("init".to_string(), None, 0).unwrap();
    (mgr, init)
}

/// Spawn a child of `parent` in the Ready state
pub fn spawn(mgr: &mut ProcessManager, parent: ProcessId, name: &str) -> ProcessId {
    mgr.create_process(name.to_string(), Some(parent), 0)
        .unwrap()
}

//! POSIX errno values
//!
//! Standard error codes returned by system calls.

/// Operation not permitted
pub const EPERM: i32 = 1;

/// No such process
pub const ESRCH: i32 = 3;

/// Interrupted system call
pub const EINTR: i32 = 4;

/// No child processes
pub const ECHILD: i32 = 10;

/// Resource temporarily unavailable (would block)
pub const EAGAIN: i32 = 11;

/// Cannot allocate memory
pub const ENOMEM: i32 = 12;

/// Bad address
pub const EFAULT: i32 = 14;

/// Invalid argument
pub const EINVAL: i32 = 22;

/// Function not implemented
pub const ENOSYS: i32 = 38;

//! Kernel-wide error codes.
//!
//! Every fallible kernel function returns `Result<T, KError>`. At the
//! syscall boundary (`syscall::dispatch`) the error is negated into the
//! POSIX `-errno` convention a user-space caller expects (§7).

use core::fmt;

/// Error taxonomy used internally by every kernel subsystem (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KError {
    /// Argument shape wrong, null where required, unknown enum value.
    Invalid,
    /// `kmalloc`/`krealloc` returned null, falloc empty.
    NoMemory,
    /// Path resolution missed, fd not found, driver-registry miss.
    NotFound,
    /// Registering a driver or device under a duplicate id.
    Exists,
    /// Hardware probe failed (PCI root missing, ATA identify returned 0).
    NoDevice,
    /// Unregistering a driver that still has attached devices.
    Busy,
    /// Block-device read/write failed at hardware level.
    Io,
    /// A hardware wait exceeded its bound.
    TimedOut,
    /// Partition naming would exceed a single char suffix, path > PATH_MAX.
    NameTooLong,
    /// ELF validation failed (wrong type, wrong class, bad magic).
    NoExec,
    /// Open-mode flags violate the intended operation.
    Perm,
    /// User-pointer dereference faulted; only raised by the `useraccess`
    /// helper (§7), never constructed directly by subsystem code.
    Fault,
}

impl KError {
    /// POSIX errno magnitude (positive) for this condition.
    pub const fn errno(self) -> i32 {
        match self {
            KError::Invalid => 22,     // EINVAL
            KError::NoMemory => 12,    // ENOMEM
            KError::NotFound => 2,     // ENOENT
            KError::Exists => 17,      // EEXIST
            KError::NoDevice => 19,    // ENODEV
            KError::Busy => 16,        // EBUSY
            KError::Io => 5,           // EIO
            KError::TimedOut => 110,   // ETIMEDOUT
            KError::NameTooLong => 36, // ENAMETOOLONG
            KError::NoExec => 8,       // ENOEXEC
            KError::Perm => 1,         // EPERM
            KError::Fault => 14,       // EFAULT
        }
    }

    /// The value a syscall stub places in the return register: `-errno`.
    pub const fn as_retval(self) -> isize {
        -(self.errno() as isize)
    }
}

impl fmt::Display for KError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KError::Invalid => "EINVAL",
            KError::NoMemory => "ENOMEM",
            KError::NotFound => "ENOENT",
            KError::Exists => "EEXIST",
            KError::NoDevice => "ENODEV",
            KError::Busy => "EBUSY",
            KError::Io => "EIO",
            KError::TimedOut => "ETIMEDOUT",
            KError::NameTooLong => "ENAMETOOLONG",
            KError::NoExec => "ENOEXEC",
            KError::Perm => "EPERM",
            KError::Fault => "EFAULT",
        };
        f.write_str(name)
    }
}

pub type KResult<T> = Result<T, KError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retval_is_negative_errno() {
        assert_eq!(KError::NotFound.as_retval(), -2);
        assert_eq!(KError::Invalid.as_retval(), -22);
    }

    #[test]
    fn errno_values_match_posix() {
        assert_eq!(KError::Busy.errno(), 16);
        assert_eq!(KError::Fault.errno(), 14);
    }
}

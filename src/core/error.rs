//! Error types
//!
//! Uses Rust's Result pattern instead of C-style status out-parameters.
//! The raw single-word encoding used at the trap boundary lives in
//! [`crate::port::abi`].

/// Kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OsError {
    /// Generic, unspecified error
    Error = 1,
    /// Operation did not complete within the requested window
    Timeout = 2,
    /// Object full/empty and no blocking was requested
    NoResource = 3,
    /// Invalid argument, detected before any state change
    Param = 4,
    /// No free block, slot, or arena entry
    NoMemory = 5,
    /// Operation not allowed from interrupt context
    Isr = 6,

    // ============ Kernel lifecycle ============
    /// Kernel has not been initialized
    NotInit = 10,
    /// Kernel is not running
    NotRunning = 11,
    /// Kernel is already running
    AlreadyRunning = 12,
    /// Scheduler is locked and the operation would need to block
    KernelLocked = 13,
    /// Scheduler-lock, suspend or mutex nesting overflow
    NestingOverflow = 14,
    /// Scheduler is not locked
    NotLocked = 15,

    // ============ Handles ============
    /// Handle refers to a deleted or recycled object slot
    StaleHandle = 20,

    // ============ Object-specific ============
    /// Semaphore count would exceed its maximum
    SemOverflow = 30,
    /// Caller does not hold the mutex
    MutexNotOwner = 31,
    /// Nested acquire of a non-recursive mutex
    MutexNested = 32,
    /// Mutex holder terminated while the mutex was held
    OwnerDied = 33,
    /// Task is not suspended
    NotSuspended = 34,
}

/// Result type alias for kernel operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    /// Stable numeric code, as carried by the trap ABI.
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Reverse of [`Self::code`]. Unknown codes collapse to `Error`.
    pub const fn from_code(code: u16) -> Self {
        match code {
            2 => OsError::Timeout,
            3 => OsError::NoResource,
            4 => OsError::Param,
            5 => OsError::NoMemory,
            6 => OsError::Isr,
            10 => OsError::NotInit,
            11 => OsError::NotRunning,
            12 => OsError::AlreadyRunning,
            13 => OsError::KernelLocked,
            14 => OsError::NestingOverflow,
            15 => OsError::NotLocked,
            20 => OsError::StaleHandle,
            30 => OsError::SemOverflow,
            31 => OsError::MutexNotOwner,
            32 => OsError::MutexNested,
            33 => OsError::OwnerDied,
            34 => OsError::NotSuspended,
            _ => OsError::Error,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for OsError {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "OsError({=u16})", self.code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trip() {
        for err in [
            OsError::Error,
            OsError::Timeout,
            OsError::NoResource,
            OsError::Param,
            OsError::NoMemory,
            OsError::Isr,
            OsError::NotInit,
            OsError::NotRunning,
            OsError::AlreadyRunning,
            OsError::KernelLocked,
            OsError::NestingOverflow,
            OsError::NotLocked,
            OsError::StaleHandle,
            OsError::SemOverflow,
            OsError::MutexNotOwner,
            OsError::MutexNested,
            OsError::OwnerDied,
            OsError::NotSuspended,
        ] {
            assert_eq!(OsError::from_code(err.code()), err);
        }
    }

    #[test]
    fn unknown_code_collapses() {
        assert_eq!(OsError::from_code(999), OsError::Error);
    }
}

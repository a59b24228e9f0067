//! Core type definitions
//!
//! Strong typing for kernel scalars, option flags, and the generation-tagged
//! handles that address kernel objects.

/// Task priority (1..=32, numerically higher runs first)
pub type OsPrio = u8;

/// Tick counter type. The counter wraps; comparisons must go through
/// [`crate::time::tick_after_eq`].
pub type OsTick = u32;

/// Semaphore counter type
pub type OsSemCtr = u32;

/// Nesting counter
pub type OsNestingCtr = u8;

/// Option flags for API calls
pub type OsOpt = u16;

/// Event flags type. Only the low 31 bits carry flags; the top bit is the
/// error marker of the raw trap ABI and is rejected in patterns.
pub type OsFlags = u32;

/// Stack element type
pub type OsStkElement = u32;

/// Timeout meaning "never give up"
pub const WAIT_FOREVER: OsTick = OsTick::MAX;

/// Timeout meaning "try once, do not block"
pub const NO_WAIT: OsTick = 0;

/// Task entry point. Tasks never return; they leave via `os_task_exit`.
pub type OsTaskFn = fn(*mut ()) -> !;

/// Software timer callback, invoked in the timer task's context.
pub type OsTimerFn = fn(*mut ());

/// Task state
///
/// There is no `Inactive` variant: an unoccupied arena slot is the inactive
/// state, and a terminated task's slot is immediately reclaimable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsTaskState {
    /// Eligible to run (may be parked by a suspend)
    Ready = 0,
    /// Currently executing
    Running = 1,
    /// Waiting for an event, a timeout, or a delay
    Blocked = 2,
    /// Gone; only ever observed through a stale handle
    Terminated = 3,
}

/// Software timer kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsTimerKind {
    OneShot = 0,
    Periodic = 1,
}

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// Carries a generation tag; a handle to a deleted or recycled slot
        /// fails validation with `OsError::StaleHandle`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub(crate) index: u8,
            pub(crate) gen: u16,
        }

        impl $name {
            /// Pack into one machine word for the trap ABI.
            #[inline]
            pub const fn to_raw(self) -> u32 {
                (self.index as u32) | ((self.gen as u32) << 8)
            }

            /// Reverse of [`Self::to_raw`]. The result still goes through
            /// normal handle validation.
            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                $name {
                    index: (raw & 0xFF) as u8,
                    gen: ((raw >> 8) & 0xFFFF) as u16,
                }
            }
        }
    };
}

define_id!(
    /// Handle to a task
    TaskId
);
define_id!(
    /// Handle to a counting semaphore
    SemId
);
define_id!(
    /// Handle to a mutex
    MutexId
);
define_id!(
    /// Handle to an event flag group
    FlagId
);
define_id!(
    /// Handle to a message queue
    MsgQueueId
);
define_id!(
    /// Handle to a data queue
    DataQueueId
);
define_id!(
    /// Handle to a memory pool
    MemPoolId
);
define_id!(
    /// Handle to a software timer
    TimerId
);

// ============ Option flags ============

/// Event flag wait options
pub mod opt {
    use super::OsOpt;

    pub const NONE: OsOpt = 0x0000;

    /// Satisfied when any requested bit is set
    pub const FLAG_WAIT_ANY: OsOpt = 0x0000;
    /// Satisfied only when all requested bits are simultaneously set
    pub const FLAG_WAIT_ALL: OsOpt = 0x0001;
    /// Leave the matched bits set instead of consuming them
    pub const FLAG_NO_CLEAR: OsOpt = 0x0002;
}

/// Mutex attribute bits
pub mod attr {
    pub const MUTEX_NONE: u8 = 0x00;
    /// Holder inherits the priority of its highest waiter
    pub const MUTEX_INHERIT: u8 = 0x01;
    /// Nested acquire by the holder is allowed and counted
    pub const MUTEX_RECURSIVE: u8 = 0x02;
    /// Survives holder termination: ownership transfers to the best waiter
    pub const MUTEX_ROBUST: u8 = 0x04;
}

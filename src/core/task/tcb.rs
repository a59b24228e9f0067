//! Task control block
//!
//! One `Tcb` per arena slot. List membership is expressed through the
//! node arena (see `core::layout`), so the control block itself carries no
//! link pointers — only scheduling state, the stack, and the wait record.

use crate::error::OsError;
use crate::types::{OsFlags, OsNestingCtr, OsOpt, OsPrio, OsStkElement, OsTaskState, OsTick};

/// What a blocked task is waiting for, and where its outcome lands.
///
/// The wake side fills result fields (`matched`, `len`, `word`, `block`)
/// before making the waiter ready; the waiter reads them once it resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitInfo {
    /// Not waiting
    None,
    /// Plain tick delay
    Delay,
    /// Semaphore acquire
    Sem { sem: u8 },
    /// Mutex acquire
    Mutex { mutex: u8 },
    /// Event flag wait
    Flag {
        flag: u8,
        pattern: OsFlags,
        opt: OsOpt,
        matched: OsFlags,
    },
    /// Message queue put on a full queue. `buf` points at the blocked
    /// sender's payload, stable while it stays blocked.
    MsgSend {
        msgq: u8,
        buf: *const u8,
        len: usize,
        prio: u8,
    },
    /// Message queue get on an empty queue. `buf` points at the blocked
    /// receiver's buffer; the sender copies into it and sets `len`/`prio`.
    MsgRecv {
        msgq: u8,
        buf: *mut u8,
        cap: usize,
        len: usize,
        prio: u8,
    },
    /// Data queue put on a full queue
    DataSend { dataq: u8, word: u32 },
    /// Data queue get on an empty queue
    DataRecv { dataq: u8, word: u32 },
    /// Memory pool alloc on an exhausted pool
    PoolAlloc { pool: u8, block: *mut u8 },
}

/// Task control block
pub struct Tcb {
    /// Task name for debugging
    pub name: &'static str,
    /// Scheduling state
    pub state: OsTaskState,
    /// Current (possibly inherited) priority
    pub prio: OsPrio,
    /// Priority the task was created with / last assigned
    pub base_prio: OsPrio,
    /// Suspension nesting, orthogonal to `state`
    pub suspend_cnt: OsNestingCtr,
    /// Kernel service task (idle, timer, deferred-ISR); protected from
    /// termination and suspension
    pub service: bool,

    /// Saved stack pointer, maintained by the context switcher
    pub sp: *mut OsStkElement,
    /// Base of the caller-supplied stack
    pub stk_base: *mut OsStkElement,
    /// Stack size in words
    pub stk_size: usize,

    /// Absolute tick at which a pending timeout or delay expires
    pub wake_tick: OsTick,
    /// Wait record
    pub winfo: WaitInfo,
    /// Outcome of the last wait, deposited by the wake side
    pub wait_status: Result<(), OsError>,

    /// Remaining round-robin budget
    pub quanta_ctr: OsTick,

    /// Entry point and its argument
    pub entry: usize,
    pub arg: *mut (),
}

impl Tcb {
    pub const fn new() -> Self {
        Tcb {
            name: "",
            state: OsTaskState::Ready,
            prio: 0,
            base_prio: 0,
            suspend_cnt: 0,
            service: false,
            sp: core::ptr::null_mut(),
            stk_base: core::ptr::null_mut(),
            stk_size: 0,
            wake_tick: 0,
            winfo: WaitInfo::None,
            wait_status: Ok(()),
            quanta_ctr: 0,
            entry: 0,
            arg: core::ptr::null_mut(),
        }
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.state == OsTaskState::Blocked
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.suspend_cnt > 0
    }

    /// Eligible for a ready queue: Ready/Running and not suspended.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, OsTaskState::Ready | OsTaskState::Running) && self.suspend_cnt == 0
    }
}

impl Default for Tcb {
    fn default() -> Self {
        Self::new()
    }
}

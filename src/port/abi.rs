//! Trap ABI
//!
//! The synchronous-trap call convention: a function selector plus up to
//! four word arguments in, one word out. The top bit of the result word is
//! the error marker; everything the ABI returns in-band is confined to 31
//! bits (which is why event-flag masks never use the top bit). Calls whose
//! natural results are full words (data-queue reads, pool pointers) take
//! an out-pointer argument instead.
//!
//! This module is portable; the Cortex-M SVC handler in the port backend
//! feeds it the stacked registers.

use crate::error::{OsError, OsResult};
use crate::types::{
    DataQueueId, FlagId, MemPoolId, MsgQueueId, MutexId, SemId, TimerId,
};

/// Error marker bit of a result word
pub const ABI_ERROR_BIT: u32 = 0x8000_0000;

// Function selectors (carried in r12 on Cortex-M)
pub const SEL_TICK_COUNT: u32 = 0x01;
pub const SEL_DELAY: u32 = 0x02;
pub const SEL_YIELD: u32 = 0x03;
pub const SEL_SCHED_LOCK: u32 = 0x04;
pub const SEL_SCHED_UNLOCK: u32 = 0x05;
pub const SEL_SEM_ACQUIRE: u32 = 0x10;
pub const SEL_SEM_RELEASE: u32 = 0x11;
pub const SEL_SEM_COUNT: u32 = 0x12;
pub const SEL_MUTEX_ACQUIRE: u32 = 0x20;
pub const SEL_MUTEX_RELEASE: u32 = 0x21;
pub const SEL_FLAG_SET: u32 = 0x30;
pub const SEL_FLAG_CLEAR: u32 = 0x31;
pub const SEL_FLAG_GET: u32 = 0x32;
pub const SEL_FLAG_WAIT: u32 = 0x33;
pub const SEL_MSGQ_PUT: u32 = 0x40;
pub const SEL_MSGQ_GET: u32 = 0x41;
pub const SEL_MSGQ_COUNT: u32 = 0x42;
pub const SEL_DATAQ_PUT: u32 = 0x50;
pub const SEL_DATAQ_GET: u32 = 0x51;
pub const SEL_MEMPOOL_ALLOC: u32 = 0x60;
pub const SEL_MEMPOOL_FREE: u32 = 0x61;
pub const SEL_TIMER_START: u32 = 0x70;
pub const SEL_TIMER_STOP: u32 = 0x71;

/// Argument block for the message-queue traps, passed by pointer because
/// the operation outgrows four words.
#[repr(C)]
pub struct MsgIoDesc {
    pub buf: *mut u8,
    pub len: usize,
    pub prio: u32,
    pub timeout: u32,
}

/// Encode a result into the single-word trap return.
#[inline]
pub fn encode(result: OsResult<u32>) -> u32 {
    match result {
        Ok(v) => {
            debug_assert!(v & ABI_ERROR_BIT == 0);
            v
        }
        Err(e) => ABI_ERROR_BIT | e.code() as u32,
    }
}

/// Decode a trap return word.
#[inline]
pub fn decode(word: u32) -> OsResult<u32> {
    if word & ABI_ERROR_BIT != 0 {
        Err(OsError::from_code((word & 0xFFFF) as u16))
    } else {
        Ok(word)
    }
}

/// Execute one trapped kernel call.
///
/// # Safety
/// Pointer-carrying calls (`SEL_MSGQ_*`, out-pointers) trust the caller's
/// addresses; the kernel provides no memory isolation (a stated
/// non-goal), the trap exists so unprivileged code cannot touch kernel
/// state directly.
pub unsafe fn dispatch(selector: u32, args: [u32; 4]) -> u32 {
    let result: OsResult<u32> = match selector {
        // In-band result: only the low 31 bits of the tick survive the
        // trap; callers needing the full counter stay in privileged code.
        SEL_TICK_COUNT => Ok(crate::time::os_tick_count() & !ABI_ERROR_BIT),
        SEL_DELAY => crate::time::os_delay(args[0]).map(|()| 0),
        SEL_YIELD => crate::task::os_task_yield().map(|()| 0),
        SEL_SCHED_LOCK => crate::kernel::os_sched_lock().map(|()| 0),
        SEL_SCHED_UNLOCK => crate::kernel::os_sched_unlock().map(|()| 0),

        SEL_SEM_ACQUIRE => {
            crate::sync::sem::os_sem_acquire(SemId::from_raw(args[0]), args[1]).map(|()| 0)
        }
        SEL_SEM_RELEASE => crate::sync::sem::os_sem_release(SemId::from_raw(args[0]))
            .map(|count| count & !ABI_ERROR_BIT),
        SEL_SEM_COUNT => crate::sync::sem::os_sem_count(SemId::from_raw(args[0]))
            .map(|count| count & !ABI_ERROR_BIT),

        SEL_MUTEX_ACQUIRE => {
            crate::sync::mutex::os_mutex_acquire(MutexId::from_raw(args[0]), args[1]).map(|()| 0)
        }
        SEL_MUTEX_RELEASE => {
            crate::sync::mutex::os_mutex_release(MutexId::from_raw(args[0])).map(|()| 0)
        }

        SEL_FLAG_SET => crate::sync::flag::os_flag_set(FlagId::from_raw(args[0]), args[1]),
        SEL_FLAG_CLEAR => crate::sync::flag::os_flag_clear(FlagId::from_raw(args[0]), args[1]),
        SEL_FLAG_GET => crate::sync::flag::os_flag_get(FlagId::from_raw(args[0])),
        SEL_FLAG_WAIT => crate::sync::flag::os_flag_wait(
            FlagId::from_raw(args[0]),
            args[1],
            args[2] as u16,
            args[3],
        ),

        SEL_MSGQ_PUT => {
            let desc = args[1] as *const MsgIoDesc;
            let desc = unsafe { &*desc };
            let payload = unsafe { core::slice::from_raw_parts(desc.buf, desc.len) };
            crate::comm::msgq::os_msgq_put(
                MsgQueueId::from_raw(args[0]),
                payload,
                desc.prio as u8,
                desc.timeout,
            )
            .map(|()| 0)
        }
        SEL_MSGQ_GET => {
            let desc = args[1] as *mut MsgIoDesc;
            let desc = unsafe { &mut *desc };
            let buf = unsafe { core::slice::from_raw_parts_mut(desc.buf, desc.len) };
            crate::comm::msgq::os_msgq_get(MsgQueueId::from_raw(args[0]), buf, desc.timeout).map(
                |(len, prio)| {
                    desc.len = len;
                    desc.prio = prio as u32;
                    0
                },
            )
        }
        SEL_MSGQ_COUNT => crate::comm::msgq::os_msgq_count(MsgQueueId::from_raw(args[0]))
            .map(|count| count as u32),

        SEL_DATAQ_PUT => {
            crate::comm::dataq::os_dataq_put(DataQueueId::from_raw(args[0]), args[1], args[2])
                .map(|()| 0)
        }
        SEL_DATAQ_GET => {
            crate::comm::dataq::os_dataq_get(DataQueueId::from_raw(args[0]), args[1]).map(|word| {
                let out = args[2] as *mut u32;
                unsafe { out.write(word) };
                0
            })
        }

        SEL_MEMPOOL_ALLOC => {
            crate::comm::mempool::os_mempool_alloc(MemPoolId::from_raw(args[0]), args[1]).map(
                |ptr| {
                    let out = args[2] as *mut u32;
                    unsafe { out.write(ptr.as_ptr() as u32) };
                    0
                },
            )
        }
        SEL_MEMPOOL_FREE => match core::ptr::NonNull::new(args[1] as *mut u8) {
            Some(ptr) => {
                crate::comm::mempool::os_mempool_free(MemPoolId::from_raw(args[0]), ptr)
                    .map(|()| 0)
            }
            None => Err(OsError::Param),
        },

        SEL_TIMER_START => crate::timer::os_timer_start(TimerId::from_raw(args[0])).map(|()| 0),
        SEL_TIMER_STOP => crate::timer::os_timer_stop(TimerId::from_raw(args[0])).map(|()| 0),

        _ => Err(OsError::Param),
    };
    encode(result)
}

//! kestrel: a small real-time kernel in Rust
//!
//! A preemptive, priority-based thread kernel for single-core
//! microcontrollers:
//! - 32 priority levels with O(1) dispatch and optional round-robin
//! - Semaphores, mutexes with priority inheritance, event flags
//! - Message queues, data queues, fixed-block memory pools
//! - Software timers driven by a dedicated timer task
//! - No heap: every stack and backing buffer is caller-supplied
//!
//! Kernel entry on hardware goes through a synchronous trap (SVC); the
//! actual register switch is deferred to the lowest-priority exception
//! (PendSV on ARM Cortex-M).

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

mod lang_items;
pub mod log;

pub mod comm;
pub mod core;
pub mod port;
pub mod sync;
pub mod timer;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::{OsConfig, CFG_PRIO_APP_MAX, CFG_PRIO_APP_MIN};
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{OsError, OsResult};
pub use crate::core::kernel;
pub use crate::core::kernel::{
    os_init, os_isr_defer, os_sched_lock, os_sched_unlock, os_start, KernelState,
};
pub use crate::core::queue;
pub use crate::core::sched;
pub use crate::core::task;
pub use crate::core::task::{
    os_task_exit, os_task_resume, os_task_set_prio, os_task_spawn, os_task_state,
    os_task_suspend, os_task_terminate, os_task_yield, Outcome,
};
pub use crate::core::time;
pub use crate::core::time::{os_delay, os_tick_count, os_tick_handler};
pub use crate::core::types;
pub use crate::core::types::*;

pub use sync::flag::{os_flag_clear, os_flag_create, os_flag_get, os_flag_set, os_flag_wait};
pub use sync::mutex::{os_mutex_acquire, os_mutex_create, os_mutex_is_held, os_mutex_release};
pub use sync::sem::{os_sem_acquire, os_sem_count, os_sem_create, os_sem_release};

pub use comm::dataq::{os_dataq_count, os_dataq_create, os_dataq_get, os_dataq_put};
pub use comm::mempool::{
    os_mempool_alloc, os_mempool_create, os_mempool_free, os_mempool_free_count,
};
pub use comm::msgq::{os_msgq_count, os_msgq_create, os_msgq_get, os_msgq_put};

pub use timer::{os_timer_create, os_timer_is_active, os_timer_start, os_timer_stop};

#[cfg(feature = "pac")]
pub use stm32_metapac as pac;

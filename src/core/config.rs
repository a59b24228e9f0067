//! Compile-time configuration for the kernel
//!
//! These constants size the static object arenas and control scheduler
//! behavior. The runtime-tunable part lives in [`OsConfig`].

use crate::types::{OsPrio, OsTick};

/// Number of priority levels (1..=32, numerically higher runs first)
pub const CFG_PRIO_MAX: usize = 32;

/// Priority reserved for the idle task (always lowest)
pub const CFG_PRIO_IDLE: OsPrio = 1;

/// Priority reserved for the deferred-ISR service task (always highest)
pub const CFG_PRIO_ISR_DEFER: OsPrio = CFG_PRIO_MAX as OsPrio;

/// Lowest priority an application task may use
pub const CFG_PRIO_APP_MIN: OsPrio = 2;

/// Highest priority an application task may use
pub const CFG_PRIO_APP_MAX: OsPrio = (CFG_PRIO_MAX - 1) as OsPrio;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Default round-robin time quanta in ticks (0 disables slicing)
pub const CFG_TIME_QUANTA_DEFAULT: OsTick = 10;

/// Minimum task stack size in words
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Maximum number of tasks (including idle, timer and deferred-ISR tasks)
pub const CFG_TASK_MAX: usize = 16;

/// Maximum number of semaphores (two are consumed by kernel services)
pub const CFG_SEM_MAX: usize = 8;

/// Maximum number of mutexes
pub const CFG_MUTEX_MAX: usize = 8;

/// Maximum number of event flag groups
pub const CFG_FLAG_MAX: usize = 8;

/// Maximum number of message queues
pub const CFG_MSGQ_MAX: usize = 4;

/// Maximum capacity (in messages) of a single message queue
pub const CFG_MSGQ_SLOT_MAX: usize = 16;

/// Maximum number of data queues
pub const CFG_DATAQ_MAX: usize = 4;

/// Maximum number of memory pools
pub const CFG_MEMPOOL_MAX: usize = 4;

/// Maximum number of software timers
pub const CFG_TIMER_MAX: usize = 8;

/// Depth of the deferred-ISR work ring
pub const CFG_ISR_WORK_DEPTH: usize = 16;

/// Stack size (in words) of the kernel-internal tasks
pub const CFG_KERNEL_STK_SIZE: usize = 128;

/// Runtime kernel configuration, captured once by `os_init`.
///
/// The record is immutable after init; the kernel keeps no state across
/// boots.
#[derive(Debug, Clone, Copy)]
pub struct OsConfig {
    /// Tick frequency the port's tick source is programmed to
    pub tick_hz: u32,
    /// Round-robin budget in ticks for same-priority tasks (0 disables)
    pub round_robin_quanta: OsTick,
    /// Priority of the timer service task. Must lie in the application
    /// range; it is expected to sit below normal application work.
    pub timer_task_prio: OsPrio,
}

impl OsConfig {
    pub const fn new() -> Self {
        OsConfig {
            tick_hz: CFG_TICK_RATE_HZ,
            round_robin_quanta: CFG_TIME_QUANTA_DEFAULT,
            timer_task_prio: CFG_PRIO_APP_MIN,
        }
    }
}

impl Default for OsConfig {
    fn default() -> Self {
        Self::new()
    }
}

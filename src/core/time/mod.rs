//! Time management
//!
//! Tick accounting, the sorted delay queue, and task delays. The tick
//! counter wraps; every comparison treats the difference of two tick
//! values as signed.

use crate::core::layout;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel::{KernelState, KERNEL, KSTATE};
use crate::task::wait::WaitOrder;
use crate::task::WaitInfo;
use crate::types::{OsTick, WAIT_FOREVER};

/// `a` is at or after `b` on the wrapping tick line.
#[inline]
pub fn tick_after_eq(a: OsTick, b: OsTick) -> bool {
    a.wrapping_sub(b) as i32 >= 0
}

/// `a` is strictly after `b` on the wrapping tick line.
#[inline]
pub fn tick_after(a: OsTick, b: OsTick) -> bool {
    a.wrapping_sub(b) as i32 > 0
}

impl KernelState {
    /// Insert a task into the delay queue, ordered by wake tick.
    pub(crate) fn delay_insert(&mut self, t: u8, wake: OsTick) {
        self.tcb_mut(t).wake_tick = wake;
        let n = layout::task_delay(t);
        debug_assert!(self.nodes.is_detached(n));

        let mut pos = layout::DELAY_HEAD;
        let mut cursor = self.nodes.first(layout::DELAY_HEAD);
        while let Some(node) = cursor {
            let owner = layout::delay_owner(node);
            if tick_after(self.tcb(owner).wake_tick, wake) {
                pos = node;
                break;
            }
            let next = self.nodes.next(node);
            cursor = if next == layout::DELAY_HEAD {
                None
            } else {
                Some(next)
            };
        }
        self.nodes.insert_before(n, pos);
    }

    /// Drop a task from the delay queue. No-op when it is not queued.
    pub(crate) fn delay_remove(&mut self, t: u8) {
        self.nodes.remove(layout::task_delay(t));
    }

    /// One kernel tick: advance the counter, expire due delays and
    /// timeouts, poke the timer service if its head is due, and account
    /// round-robin. O(1) plus one step per expired waiter.
    pub fn tick_advance(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        KERNEL.tick_set(self.tick);

        while let Some(n) = self.nodes.first(layout::DELAY_HEAD) {
            let t = layout::delay_owner(n);
            if !tick_after_eq(self.tick, self.tcb(t).wake_tick) {
                break;
            }
            self.nodes.remove(n);
            self.wait_expire(t);
        }

        if let Some(n) = self.nodes.first(layout::TIMER_HEAD) {
            let ti = layout::timer_of_link(n);
            if tick_after_eq(self.tick, self.timers[ti as usize].cb.time) {
                if let Some(sem) = self.timer_sem {
                    let _ = self.sem_release_at(sem.index);
                }
            }
        }

        self.round_robin();
    }

    /// Put the current task to sleep for `ticks`.
    pub fn delay(&mut self, ticks: OsTick) -> OsResult<()> {
        if self.sched_lock > 0 {
            return Err(OsError::KernelLocked);
        }
        let t = self.cur_task()?;
        self.wait_begin(t, WaitInfo::Delay, None, WaitOrder::Fifo, ticks);
        Ok(())
    }
}

// ============ Public API ============

/// Delay the calling task for `ticks` system ticks.
///
/// A zero delay returns immediately; delaying forever is a parameter
/// error.
pub fn os_delay(ticks: OsTick) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    if !KERNEL.is_running() {
        return Err(OsError::NotRunning);
    }
    if ticks == WAIT_FOREVER {
        return Err(OsError::Param);
    }
    if ticks == 0 {
        return Ok(());
    }

    critical_section(|cs| KSTATE.get(cs).delay(ticks))?;
    crate::task::wait::complete_wait(|_| ())
}

/// Current tick count.
#[inline]
pub fn os_tick_count() -> OsTick {
    KERNEL.tick_get()
}

/// Kernel tick entry point, called from the port's periodic tick
/// interrupt.
pub fn os_tick_handler() {
    if !KERNEL.is_running() {
        return;
    }
    KERNEL.int_enter();
    critical_section(|cs| {
        KSTATE.get(cs).tick_advance();
    });
    KERNEL.int_exit();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_compare_simple() {
        assert!(tick_after_eq(5, 5));
        assert!(tick_after_eq(6, 5));
        assert!(!tick_after_eq(4, 5));
        assert!(tick_after(6, 5));
        assert!(!tick_after(5, 5));
    }

    #[test]
    fn tick_compare_across_wrap() {
        let before = OsTick::MAX - 2;
        let after = before.wrapping_add(10);
        assert!(tick_after(after, before));
        assert!(!tick_after(before, after));
        assert!(tick_after_eq(after, before));
    }
}

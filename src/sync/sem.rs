//! Counting semaphore
//!
//! Task synchronization and resource counting. Waiters are served in
//! arrival order; releases from interrupt context are the standard way to
//! hand an event from an ISR to a task.

use crate::core::layout;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel::{alloc_slot, KernelState, KSTATE};
use crate::task::wait::{complete_wait, WaitOrder};
use crate::task::{Outcome, WaitInfo};
use crate::types::{OsSemCtr, OsTick, SemId};

/// Semaphore control block
pub(crate) struct SemCb {
    pub(crate) count: OsSemCtr,
    pub(crate) max: OsSemCtr,
}

impl SemCb {
    pub(crate) const fn new() -> Self {
        SemCb { count: 0, max: 0 }
    }
}

impl KernelState {
    /// Create a semaphore with an initial count and a ceiling.
    pub fn sem_create(&mut self, initial: OsSemCtr, max: OsSemCtr) -> OsResult<SemId> {
        if max == 0 || initial > max {
            return Err(OsError::Param);
        }
        let s = alloc_slot(&mut self.sems).ok_or(OsError::NoMemory)?;
        self.sems[s as usize].cb = SemCb {
            count: initial,
            max,
        };
        Ok(SemId {
            index: s,
            gen: self.sems[s as usize].gen,
        })
    }

    /// Take one count, or park the current task until one arrives.
    pub fn sem_acquire(&mut self, id: SemId, timeout: OsTick) -> OsResult<Outcome<()>> {
        let s = self.check_sem(id)?;
        self.sem_acquire_at(s, timeout)
    }

    pub(crate) fn sem_acquire_at(&mut self, s: u8, timeout: OsTick) -> OsResult<Outcome<()>> {
        {
            let cb = &mut self.sems[s as usize].cb;
            if cb.count > 0 {
                cb.count -= 1;
                return Ok(Outcome::Done(()));
            }
        }
        if timeout == 0 {
            return Err(OsError::NoResource);
        }
        if self.sched_lock > 0 {
            return Err(OsError::KernelLocked);
        }
        let t = self.cur_task()?;
        self.wait_begin(
            t,
            WaitInfo::Sem { sem: s },
            Some(layout::sem_wait_head(s)),
            WaitOrder::Fifo,
            timeout,
        );
        Ok(Outcome::Blocked)
    }

    /// Give one count. Wakes the longest-waiting task if any; otherwise
    /// increments, capped at the ceiling.
    pub fn sem_release(&mut self, id: SemId) -> OsResult<OsSemCtr> {
        let s = self.check_sem(id)?;
        self.sem_release_at(s)
    }

    pub(crate) fn sem_release_at(&mut self, s: u8) -> OsResult<OsSemCtr> {
        let head = layout::sem_wait_head(s);
        if let Some(n) = self.nodes.first(head) {
            let t = layout::sched_owner(n);
            self.wait_finish(t, Ok(()));
            Ok(self.sems[s as usize].cb.count)
        } else {
            let cb = &mut self.sems[s as usize].cb;
            if cb.count == cb.max {
                return Err(OsError::SemOverflow);
            }
            cb.count += 1;
            Ok(cb.count)
        }
    }

    /// Current count.
    pub fn sem_count(&self, id: SemId) -> OsResult<OsSemCtr> {
        let s = self.check_sem(id)?;
        Ok(self.sems[s as usize].cb.count)
    }
}

// ============ Public API ============

/// Create a semaphore.
///
/// Returns the handle, or an error when the arena is exhausted or the
/// parameters are inconsistent (`initial` above `max`, zero `max`).
pub fn os_sem_create(initial: OsSemCtr, max: OsSemCtr) -> OsResult<SemId> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| KSTATE.get(cs).sem_create(initial, max))
}

/// Acquire the semaphore.
///
/// Decrements and returns immediately when the count is positive. With a
/// zero `timeout` an unavailable semaphore fails with `NoResource`;
/// `WAIT_FOREVER` waits indefinitely.
pub fn os_sem_acquire(id: SemId, timeout: OsTick) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    let outcome = critical_section(|cs| KSTATE.get(cs).sem_acquire(id, timeout))?;
    match outcome {
        Outcome::Done(()) => Ok(()),
        Outcome::Blocked => complete_wait(|_| ()),
    }
}

/// Release the semaphore. ISR-callable.
///
/// Exceeding the ceiling is `SemOverflow` with no state change.
pub fn os_sem_release(id: SemId) -> OsResult<OsSemCtr> {
    critical_section(|cs| KSTATE.get(cs).sem_release(id))
}

/// Current count.
pub fn os_sem_count(id: SemId) -> OsResult<OsSemCtr> {
    critical_section(|cs| KSTATE.get(cs).sem_count(id))
}

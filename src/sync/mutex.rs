//! Mutex with priority inheritance
//!
//! Ownership-tracked mutual exclusion. Waiters queue by priority and
//! ownership transfers to the best waiter on release. A holder of an
//! inherit-attributed mutex runs at the maximum of its own base priority
//! and the priorities of all tasks transitively blocked behind it; the
//! whole invariant is re-established by one recompute function invoked on
//! every acquire-block, release, timeout and termination that changes it.

use crate::core::layout;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel::{alloc_slot, KernelState, KSTATE};
use crate::task::wait::{complete_wait, WaitOrder};
use crate::task::{Outcome, WaitInfo};
use crate::types::attr::{MUTEX_INHERIT, MUTEX_RECURSIVE, MUTEX_ROBUST};
use crate::types::{MutexId, OsPrio, OsTick, TaskId};

/// Mutex control block
pub(crate) struct MutexCb {
    /// Owning task, a back-reference into the task arena
    pub(crate) holder: Option<u8>,
    /// Recursion depth while held
    pub(crate) nest: u16,
    /// MUTEX_INHERIT | MUTEX_RECURSIVE | MUTEX_ROBUST
    pub(crate) attr: u8,
}

impl MutexCb {
    pub(crate) const fn new() -> Self {
        MutexCb {
            holder: None,
            nest: 0,
            attr: 0,
        }
    }
}

impl KernelState {
    /// Create a mutex with the given attribute bits.
    pub fn mutex_create(&mut self, attr: u8) -> OsResult<MutexId> {
        if attr & !(MUTEX_INHERIT | MUTEX_RECURSIVE | MUTEX_ROBUST) != 0 {
            return Err(OsError::Param);
        }
        let m = alloc_slot(&mut self.mutexes).ok_or(OsError::NoMemory)?;
        self.mutexes[m as usize].cb = MutexCb {
            holder: None,
            nest: 0,
            attr,
        };
        Ok(MutexId {
            index: m,
            gen: self.mutexes[m as usize].gen,
        })
    }

    /// Acquire for the current task, inheriting priority into the holder
    /// when blocking.
    pub fn mutex_acquire(&mut self, id: MutexId, timeout: OsTick) -> OsResult<Outcome<()>> {
        let m = self.check_mutex(id)?;
        self.mutex_acquire_at(m, timeout)
    }

    pub(crate) fn mutex_acquire_at(&mut self, m: u8, timeout: OsTick) -> OsResult<Outcome<()>> {
        let t = self.cur_task()?;
        let (holder, attr, nest) = {
            let cb = &self.mutexes[m as usize].cb;
            (cb.holder, cb.attr, cb.nest)
        };

        match holder {
            None => {
                {
                    let cb = &mut self.mutexes[m as usize].cb;
                    cb.holder = Some(t);
                    cb.nest = 1;
                }
                self.nodes
                    .insert_before(layout::mutex_link(m), layout::task_mutex_head(t));
                Ok(Outcome::Done(()))
            }
            Some(h) if h == t => {
                if attr & MUTEX_RECURSIVE == 0 {
                    return Err(OsError::MutexNested);
                }
                if nest == u16::MAX {
                    return Err(OsError::NestingOverflow);
                }
                self.mutexes[m as usize].cb.nest += 1;
                Ok(Outcome::Done(()))
            }
            Some(h) => {
                if timeout == 0 {
                    return Err(OsError::NoResource);
                }
                if self.sched_lock > 0 {
                    return Err(OsError::KernelLocked);
                }
                self.wait_begin(
                    t,
                    WaitInfo::Mutex { mutex: m },
                    Some(layout::mutex_wait_head(m)),
                    WaitOrder::Priority,
                    timeout,
                );
                // The new waiter may raise the holder.
                self.mutex_recompute(h);
                Ok(Outcome::Blocked)
            }
        }
    }

    /// Release by the current task. Only the holder may release; the
    /// final release hands ownership to the best waiter.
    pub fn mutex_release(&mut self, id: MutexId) -> OsResult<()> {
        let m = self.check_mutex(id)?;
        self.mutex_release_at(m)
    }

    pub(crate) fn mutex_release_at(&mut self, m: u8) -> OsResult<()> {
        let t = self.cur_task()?;
        {
            let cb = &self.mutexes[m as usize].cb;
            if cb.holder != Some(t) {
                return Err(OsError::MutexNotOwner);
            }
            if cb.nest > 1 {
                self.mutexes[m as usize].cb.nest -= 1;
                return Ok(());
            }
        }

        self.nodes.remove(layout::mutex_link(m));
        {
            let cb = &mut self.mutexes[m as usize].cb;
            cb.holder = None;
            cb.nest = 0;
        }
        // Any boost this mutex contributed to the releaser ends here.
        self.mutex_recompute(t);
        self.mutex_grant_next(m, Ok(()));
        Ok(())
    }

    /// Transfer ownership to the best waiter, if any, waking it with
    /// `status`.
    fn mutex_grant_next(&mut self, m: u8, status: Result<(), OsError>) {
        let head = layout::mutex_wait_head(m);
        let Some(n) = self.nodes.first(head) else {
            return;
        };
        let w = layout::sched_owner(n);
        self.wait_finish(w, status);
        {
            let cb = &mut self.mutexes[m as usize].cb;
            cb.holder = Some(w);
            cb.nest = 1;
        }
        self.nodes
            .insert_before(layout::mutex_link(m), layout::task_mutex_head(w));
        // Remaining waiters inherit into the new holder.
        self.mutex_recompute(w);
    }

    /// Release on holder termination. The holder's held-list link is
    /// already being torn down by the caller.
    ///
    /// A robust mutex transfers ownership normally; a plain one releases
    /// every waiter with `OwnerDied` and ends up free, flagging that the
    /// protected state may be inconsistent.
    pub(crate) fn mutex_force_release(&mut self, m: u8) {
        self.nodes.remove(layout::mutex_link(m));
        let robust = self.mutexes[m as usize].cb.attr & MUTEX_ROBUST != 0;
        {
            let cb = &mut self.mutexes[m as usize].cb;
            cb.holder = None;
            cb.nest = 0;
        }
        if robust {
            self.mutex_grant_next(m, Ok(()));
        } else {
            let head = layout::mutex_wait_head(m);
            while let Some(n) = self.nodes.first(head) {
                let w = layout::sched_owner(n);
                self.wait_finish(w, Err(OsError::OwnerDied));
            }
        }
    }

    /// Effective priority of a task: its base, raised by every waiter of
    /// every inherit-attributed mutex it holds. Waiter priorities already
    /// carry their own inheritance, which is what makes the computation
    /// transitive.
    pub(crate) fn mutex_effective_prio(&self, t: u8) -> OsPrio {
        let mut prio = self.tcb(t).base_prio;
        for link in self.nodes.iter(layout::task_mutex_head(t)) {
            let m = layout::mutex_of_link(link);
            if self.mutexes[m as usize].cb.attr & MUTEX_INHERIT == 0 {
                continue;
            }
            for waiter in self.nodes.iter(layout::mutex_wait_head(m)) {
                let w = layout::sched_owner(waiter);
                prio = prio.max(self.tcb(w).prio);
            }
        }
        prio
    }

    /// Re-establish `prio == effective priority` for one task, following
    /// the inheritance chain through `reassign_priority`.
    pub(crate) fn mutex_recompute(&mut self, t: u8) {
        let effective = self.mutex_effective_prio(t);
        self.reassign_priority(t, effective);
    }

    /// Recompute the holder of a mutex after its wait queue changed.
    pub(crate) fn mutex_recompute_holder(&mut self, m: u8) {
        if let Some(h) = self.mutexes[m as usize].cb.holder {
            self.mutex_recompute(h);
        }
    }

    /// Owning task of a mutex, if any, as a handle.
    pub fn mutex_holder(&self, id: MutexId) -> OsResult<Option<TaskId>> {
        let m = self.check_mutex(id)?;
        Ok(self.mutexes[m as usize].cb.holder.map(|t| TaskId {
            index: t,
            gen: self.tasks[t as usize].gen,
        }))
    }
}

// ============ Public API ============

/// Create a mutex. `attr` combines the `MUTEX_*` attribute bits.
pub fn os_mutex_create(attr: u8) -> OsResult<MutexId> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| KSTATE.get(cs).mutex_create(attr))
}

/// Acquire the mutex.
///
/// A nested acquire requires the recursive attribute and is counted; a
/// held mutex blocks the caller (priority-ordered) or fails with
/// `NoResource` when `timeout` is zero. Mutexes cannot be taken from
/// interrupt context.
pub fn os_mutex_acquire(id: MutexId, timeout: OsTick) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    let outcome = critical_section(|cs| KSTATE.get(cs).mutex_acquire(id, timeout))?;
    match outcome {
        Outcome::Done(()) => Ok(()),
        Outcome::Blocked => complete_wait(|_| ()),
    }
}

/// Release the mutex. Rejected unless the caller is the holder; each
/// recursive acquire needs its own release.
pub fn os_mutex_release(id: MutexId) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| KSTATE.get(cs).mutex_release(id))
}

/// Whether the mutex is currently held.
pub fn os_mutex_is_held(id: MutexId) -> OsResult<bool> {
    critical_section(|cs| Ok(KSTATE.get(cs).mutex_holder(id)?.is_some()))
}

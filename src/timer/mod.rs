//! Software timers
//!
//! Timers live on one pending list ordered by absolute expiry tick. The
//! tick handler only checks the list head and signals the timer task; the
//! callbacks run in that task's context, so they may use blocking kernel
//! calls. A periodic timer is re-armed at previous target + period, never
//! at now + period: late processing does not accumulate drift.

use crate::core::layout;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel::{alloc_slot, KernelState, KSTATE};
use crate::time::tick_after;
use crate::types::{OsTick, OsTimerFn, OsTimerKind, TimerId, WAIT_FOREVER};

/// Timer control block
pub(crate) struct TimerCb {
    pub(crate) func: Option<OsTimerFn>,
    pub(crate) arg: *mut (),
    /// Period (periodic) or delay (one-shot) in ticks
    pub(crate) load: OsTick,
    /// Absolute tick of the next expiry while armed
    pub(crate) time: OsTick,
    pub(crate) kind: OsTimerKind,
    pub(crate) active: bool,
}

impl TimerCb {
    pub(crate) const fn new() -> Self {
        TimerCb {
            func: None,
            arg: core::ptr::null_mut(),
            load: 0,
            time: 0,
            kind: OsTimerKind::OneShot,
            active: false,
        }
    }
}

impl KernelState {
    /// Create a timer. `load` is the period (periodic) or the delay
    /// (one-shot); the timer starts disarmed.
    pub fn timer_create(
        &mut self,
        kind: OsTimerKind,
        load: OsTick,
        func: OsTimerFn,
        arg: *mut (),
    ) -> OsResult<TimerId> {
        if load == 0 || load == WAIT_FOREVER {
            return Err(OsError::Param);
        }
        let t = alloc_slot(&mut self.timers).ok_or(OsError::NoMemory)?;
        self.timers[t as usize].cb = TimerCb {
            func: Some(func),
            arg,
            load,
            time: 0,
            kind,
            active: false,
        };
        Ok(TimerId {
            index: t,
            gen: self.timers[t as usize].gen,
        })
    }

    /// Link a timer into the pending list, ordered by expiry.
    fn timer_enqueue(&mut self, t: u8) {
        let time = self.timers[t as usize].cb.time;
        let mut pos = layout::TIMER_HEAD;
        let mut cursor = self.nodes.first(layout::TIMER_HEAD);
        while let Some(node) = cursor {
            let other = layout::timer_of_link(node);
            if tick_after(self.timers[other as usize].cb.time, time) {
                pos = node;
                break;
            }
            let next = self.nodes.next(node);
            cursor = if next == layout::TIMER_HEAD {
                None
            } else {
                Some(next)
            };
        }
        self.nodes.insert_before(layout::timer_link(t), pos);
    }

    /// Arm a timer `load` ticks from now. Re-arming an active timer
    /// restarts it from the current tick.
    pub fn timer_start(&mut self, id: TimerId) -> OsResult<()> {
        let t = self.check_timer(id)?;
        self.nodes.remove(layout::timer_link(t));
        {
            let now = self.tick;
            let cb = &mut self.timers[t as usize].cb;
            cb.time = now.wrapping_add(cb.load);
            cb.active = true;
        }
        self.timer_enqueue(t);
        Ok(())
    }

    /// Disarm a timer. Stopping an idle timer is a no-op.
    pub fn timer_stop(&mut self, id: TimerId) -> OsResult<()> {
        let t = self.check_timer(id)?;
        self.nodes.remove(layout::timer_link(t));
        self.timers[t as usize].cb.active = false;
        Ok(())
    }

    /// Whether the timer is armed.
    pub fn timer_is_active(&self, id: TimerId) -> OsResult<bool> {
        let t = self.check_timer(id)?;
        Ok(self.timers[t as usize].cb.active)
    }

    /// Detach the head timer if it is due, re-arming periodic timers at
    /// previous target + period. Returns the callback to run, if any.
    ///
    /// Called by the timer task outside the callback so the callback
    /// itself executes with no kernel lock held.
    pub fn timer_collect_due(&mut self) -> Option<(OsTimerFn, *mut ())> {
        let n = self.nodes.first(layout::TIMER_HEAD)?;
        let t = layout::timer_of_link(n);
        if tick_after(self.timers[t as usize].cb.time, self.tick) {
            return None;
        }
        self.nodes.remove(n);

        let rearm = {
            let cb = &mut self.timers[t as usize].cb;
            match cb.kind {
                OsTimerKind::Periodic => {
                    cb.time = cb.time.wrapping_add(cb.load);
                    true
                }
                OsTimerKind::OneShot => {
                    cb.active = false;
                    false
                }
            }
        };
        if rearm {
            self.timer_enqueue(t);
        }

        let cb = &self.timers[t as usize].cb;
        cb.func.map(|f| (f, cb.arg))
    }
}

/// Timer service task: woken by the tick handler whenever the pending
/// head is due, runs every due callback in task context.
pub(crate) fn timer_task(_: *mut ()) -> ! {
    let sem = crate::kernel::timer_sem_id();
    loop {
        let _ = crate::sync::sem::os_sem_acquire(sem, WAIT_FOREVER);
        loop {
            let due = critical_section(|cs| KSTATE.get(cs).timer_collect_due());
            match due {
                Some((func, arg)) => func(arg),
                None => break,
            }
        }
    }
}

// ============ Public API ============

/// Create a software timer. The callback runs in the timer task's
/// context and may block.
pub fn os_timer_create(
    kind: OsTimerKind,
    load: OsTick,
    func: OsTimerFn,
    arg: *mut (),
) -> OsResult<TimerId> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| KSTATE.get(cs).timer_create(kind, load, func, arg))
}

/// Arm the timer `load` ticks from now. ISR-callable.
pub fn os_timer_start(id: TimerId) -> OsResult<()> {
    critical_section(|cs| KSTATE.get(cs).timer_start(id))
}

/// Disarm the timer. ISR-callable.
pub fn os_timer_stop(id: TimerId) -> OsResult<()> {
    critical_section(|cs| KSTATE.get(cs).timer_stop(id))
}

/// Whether the timer is armed.
pub fn os_timer_is_active(id: TimerId) -> OsResult<bool> {
    critical_section(|cs| KSTATE.get(cs).timer_is_active(id))
}

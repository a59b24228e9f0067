//! Task management
//!
//! Creation, termination, suspension, priority control and yield.

mod tcb;
pub(crate) mod wait;

pub use tcb::{Tcb, WaitInfo};
pub use wait::Outcome;

use crate::config::{CFG_PRIO_APP_MAX, CFG_PRIO_APP_MIN, CFG_PRIO_MAX, CFG_STK_SIZE_MIN};
use crate::core::layout;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel::{alloc_slot, KernelState, KERNEL, KSTATE};
use crate::types::{OsPrio, OsStkElement, OsTaskFn, OsTaskState, TaskId};

impl KernelState {
    /// Core of task creation. Validates everything before touching any
    /// state: a failed spawn constructs nothing.
    ///
    /// # Safety
    /// `stk_base..stk_base+stk_size` must be a writable region exclusively
    /// owned by this task for its whole lifetime.
    pub(crate) unsafe fn task_spawn_raw(
        &mut self,
        name: &'static str,
        entry: OsTaskFn,
        arg: *mut (),
        prio: OsPrio,
        stk_base: *mut OsStkElement,
        stk_size: usize,
        service: bool,
    ) -> OsResult<TaskId> {
        if prio < 1 || prio as usize > CFG_PRIO_MAX {
            return Err(OsError::Param);
        }
        if stk_base.is_null() || stk_size < CFG_STK_SIZE_MIN {
            return Err(OsError::Param);
        }
        let t = alloc_slot(&mut self.tasks).ok_or(OsError::NoMemory)?;

        let sp = unsafe { crate::port::stack_frame_init(entry, arg, stk_base, stk_size) };
        let quanta = self.cfg.round_robin_quanta;
        {
            let tcb = self.tcb_mut(t);
            *tcb = Tcb::new();
            tcb.name = name;
            tcb.prio = prio;
            tcb.base_prio = prio;
            tcb.service = service;
            tcb.sp = sp;
            tcb.stk_base = stk_base;
            tcb.stk_size = stk_size;
            tcb.quanta_ctr = quanta;
            tcb.state = OsTaskState::Ready;
            tcb.entry = entry as usize;
            tcb.arg = arg;
        }
        self.make_ready(t);
        self.sched_request();

        Ok(TaskId {
            index: t,
            gen: self.tasks[t as usize].gen,
        })
    }

    /// Create an application task.
    ///
    /// The caller supplies the stack; the control block comes out of the
    /// kernel arena. Failure constructs nothing.
    pub fn spawn(
        &mut self,
        name: &'static str,
        entry: OsTaskFn,
        arg: *mut (),
        prio: OsPrio,
        stack: &'static mut [OsStkElement],
    ) -> OsResult<TaskId> {
        if !(CFG_PRIO_APP_MIN..=CFG_PRIO_APP_MAX).contains(&prio) {
            return Err(OsError::Param);
        }
        // The slice is leaked into the task: the stack region belongs to
        // the task until it terminates.
        let (base, len) = (stack.as_mut_ptr(), stack.len());
        unsafe { self.task_spawn_raw(name, entry, arg, prio, base, len, false) }
    }

    /// Remove a task from the system.
    ///
    /// Unlinks it from whatever list holds it, force-releases every held
    /// mutex with normal release-wake semantics, then reclaims the slot.
    pub fn task_terminate(&mut self, id: TaskId) -> OsResult<()> {
        let t = self.check_task(id)?;
        self.task_terminate_at(t)
    }

    pub(crate) fn task_terminate_at(&mut self, t: u8) -> OsResult<()> {
        if self.tcb(t).service {
            return Err(OsError::Param);
        }
        if self.cur == Some(t) && self.sched_lock > 0 {
            return Err(OsError::KernelLocked);
        }

        let winfo = self.tcb(t).winfo;
        match self.tcb(t).state {
            OsTaskState::Ready | OsTaskState::Running => self.make_unready(t),
            OsTaskState::Blocked => {
                self.nodes.remove(layout::task_sched(t));
            }
            OsTaskState::Terminated => return Err(OsError::StaleHandle),
        }
        self.delay_remove(t);

        // Departing from a mutex wait queue may deflate the holder.
        if let WaitInfo::Mutex { mutex } = winfo {
            self.mutex_recompute_holder(mutex);
        }

        // Release held mutexes, best waiter first, as a normal release
        // would.
        while let Some(n) = self.nodes.first(layout::task_mutex_head(t)) {
            let m = layout::mutex_of_link(n);
            self.mutex_force_release(m);
        }

        let slot = &mut self.tasks[t as usize];
        slot.cb.state = OsTaskState::Terminated;
        slot.live = false;
        slot.gen = slot.gen.wrapping_add(1);

        if self.cur == Some(t) {
            self.cur = None;
        }
        self.sched_request();
        Ok(())
    }

    /// Park a task outside its normal wait reason. Nests. The wait
    /// context, if any, is preserved: resuming never satisfies the wait.
    pub fn task_suspend(&mut self, id: TaskId) -> OsResult<()> {
        let t = self.check_task(id)?;
        self.task_suspend_at(t)
    }

    pub(crate) fn task_suspend_at(&mut self, t: u8) -> OsResult<()> {
        if self.tcb(t).service {
            return Err(OsError::Param);
        }
        if self.cur == Some(t) && self.sched_lock > 0 {
            return Err(OsError::KernelLocked);
        }
        {
            let tcb = self.tcb_mut(t);
            tcb.suspend_cnt = tcb
                .suspend_cnt
                .checked_add(1)
                .ok_or(OsError::NestingOverflow)?;
        }
        if matches!(
            self.tcb(t).state,
            OsTaskState::Ready | OsTaskState::Running
        ) && !self.nodes.is_detached(layout::task_sched(t))
        {
            self.make_unready(t);
            self.sched_request();
        }
        Ok(())
    }

    /// Undo one suspension level; at zero the task re-enters scheduling.
    pub fn task_resume(&mut self, id: TaskId) -> OsResult<()> {
        let t = self.check_task(id)?;
        self.task_resume_at(t)
    }

    pub(crate) fn task_resume_at(&mut self, t: u8) -> OsResult<()> {
        if self.tcb(t).suspend_cnt == 0 {
            return Err(OsError::NotSuspended);
        }
        self.tcb_mut(t).suspend_cnt -= 1;
        if self.tcb(t).suspend_cnt == 0
            && matches!(
                self.tcb(t).state,
                OsTaskState::Ready | OsTaskState::Running
            )
            && self.nodes.is_detached(layout::task_sched(t))
        {
            self.make_ready(t);
            self.sched_request();
        }
        Ok(())
    }

    /// Change a task's base priority. The effective priority follows
    /// unless inheritance holds it higher.
    pub fn task_set_prio(&mut self, id: TaskId, prio: OsPrio) -> OsResult<()> {
        let t = self.check_task(id)?;
        self.task_set_prio_at(t, prio)
    }

    pub(crate) fn task_set_prio_at(&mut self, t: u8, prio: OsPrio) -> OsResult<()> {
        if !(CFG_PRIO_APP_MIN..=CFG_PRIO_APP_MAX).contains(&prio) || self.tcb(t).service {
            return Err(OsError::Param);
        }
        self.tcb_mut(t).base_prio = prio;
        self.mutex_recompute(t);
        Ok(())
    }

    /// Hand the CPU to the next equal-priority peer, if one is ready.
    pub fn task_yield(&mut self) -> OsResult<()> {
        let t = self.cur_task()?;
        self.task_yield_at(t);
        Ok(())
    }

    pub(crate) fn task_yield_at(&mut self, t: u8) {
        let prio = self.tcb(t).prio;
        let head = layout::ready_head(prio);
        let n = layout::task_sched(t);
        if !self.nodes.is_detached(n) && self.nodes.first(head) != self.nodes.last(head) {
            self.nodes.remove(n);
            self.nodes.insert_before(n, head);
        }
        self.sched_request();
    }

    /// Scheduling state of a task.
    pub fn task_state(&self, id: TaskId) -> OsResult<OsTaskState> {
        let t = self.check_task(id)?;
        Ok(self.tcb(t).state)
    }

    /// Current (possibly inherited) priority of a task.
    pub fn task_prio(&self, id: TaskId) -> OsResult<OsPrio> {
        let t = self.check_task(id)?;
        Ok(self.tcb(t).prio)
    }

    /// Base priority of a task.
    pub fn task_base_prio(&self, id: TaskId) -> OsResult<OsPrio> {
        let t = self.check_task(id)?;
        Ok(self.tcb(t).base_prio)
    }

    /// Wait record of a task, for introspection.
    pub fn task_wait_info(&self, id: TaskId) -> OsResult<WaitInfo> {
        let t = self.check_task(id)?;
        Ok(self.tcb(t).winfo)
    }

    /// Outcome of a task's last completed wait.
    pub fn task_wait_status(&self, id: TaskId) -> OsResult<Result<(), OsError>> {
        let t = self.check_task(id)?;
        Ok(self.tcb(t).wait_status)
    }
}

// ============ Public API ============

/// Create a task.
///
/// # Arguments
/// * `name` - Task name for debugging
/// * `entry` - Task entry point; tasks leave via [`os_task_exit`]
/// * `arg` - Argument passed to the entry point
/// * `prio` - Priority (2..=31; higher runs first)
/// * `stack` - Caller-supplied stack, owned by the task from here on
///
/// # Example
/// ```ignore
/// static mut WORK_STK: [OsStkElement; 256] = [0; 256];
///
/// fn work(_: *mut ()) -> ! {
///     loop { /* ... */ }
/// }
///
/// let id = os_task_spawn("work", work, core::ptr::null_mut(), 10, unsafe {
///     &mut *core::ptr::addr_of_mut!(WORK_STK)
/// })?;
/// ```
pub fn os_task_spawn(
    name: &'static str,
    entry: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stack: &'static mut [OsStkElement],
) -> OsResult<TaskId> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    if !KERNEL.is_initialized() {
        return Err(OsError::NotInit);
    }
    critical_section(|cs| KSTATE.get(cs).spawn(name, entry, arg, prio, stack))
}

/// Kernel-internal spawn for the service tasks, which live at reserved
/// priorities and use kernel-owned stacks.
///
/// # Safety
/// Same stack ownership contract as [`KernelState::task_spawn_raw`].
pub(crate) unsafe fn spawn_service(
    k: &mut KernelState,
    name: &'static str,
    entry: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_base: *mut OsStkElement,
    stk_size: usize,
) -> OsResult<TaskId> {
    unsafe { k.task_spawn_raw(name, entry, arg, prio, stk_base, stk_size, true) }
}

/// Terminate a task. Held mutexes are released with normal wake
/// semantics before the handle goes stale.
pub fn os_task_terminate(id: TaskId) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| KSTATE.get(cs).task_terminate(id))
}

/// Terminate the calling task. Never returns.
pub fn os_task_exit() -> ! {
    let _ = critical_section(|cs| {
        let k = KSTATE.get(cs);
        let t = k.cur_task()?;
        k.task_terminate_at(t)
    });
    // The requested switch takes over once interrupts are enabled again.
    loop {
        crate::port::cpu_idle();
    }
}

/// Suspend a task (`None` = the caller).
pub fn os_task_suspend(id: Option<TaskId>) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| {
        let k = KSTATE.get(cs);
        let t = match id {
            Some(id) => k.check_task(id)?,
            None => k.cur_task()?,
        };
        k.task_suspend_at(t)
    })
}

/// Resume a suspended task.
pub fn os_task_resume(id: TaskId) -> OsResult<()> {
    critical_section(|cs| KSTATE.get(cs).task_resume(id))
}

/// Change a task's base priority (2..=31). May reschedule immediately.
pub fn os_task_set_prio(id: TaskId, prio: OsPrio) -> OsResult<()> {
    critical_section(|cs| KSTATE.get(cs).task_set_prio(id, prio))
}

/// Yield the CPU to an equal-priority peer.
pub fn os_task_yield() -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| KSTATE.get(cs).task_yield())
}

/// Scheduling state of a task.
pub fn os_task_state(id: TaskId) -> OsResult<OsTaskState> {
    critical_section(|cs| KSTATE.get(cs).task_state(id))
}

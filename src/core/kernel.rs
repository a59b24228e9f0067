//! Kernel context and control
//!
//! All mutable kernel state lives in one [`KernelState`] value with a
//! documented init/start lifecycle, mutated only under the critical
//! section. The global instance behind the `os_*` API is [`KSTATE`];
//! host tests construct their own instances and drive them directly.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::comm::dataq::DataQueueCb;
use crate::comm::mempool::MemPoolCb;
use crate::comm::msgq::MsgQueueCb;
use crate::config::{
    CFG_DATAQ_MAX, CFG_FLAG_MAX, CFG_ISR_WORK_DEPTH, CFG_KERNEL_STK_SIZE, CFG_MEMPOOL_MAX,
    CFG_MSGQ_MAX, CFG_MUTEX_MAX, CFG_PRIO_APP_MAX, CFG_PRIO_APP_MIN, CFG_PRIO_IDLE,
    CFG_PRIO_ISR_DEFER, CFG_SEM_MAX, CFG_TASK_MAX, CFG_TIMER_MAX, OsConfig,
};
use crate::core::cs_cell::CsCell;
use crate::core::layout;
use crate::core::queue::NodeArena;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::sched::PrioTable;
use crate::sync::flag::FlagCb;
use crate::sync::mutex::MutexCb;
use crate::sync::sem::SemCb;
use crate::task::Tcb;
use crate::timer::TimerCb;
use crate::types::{
    DataQueueId, FlagId, MemPoolId, MsgQueueId, MutexId, OsNestingCtr, OsStkElement, OsTick,
    SemId, TaskId, TimerId, WAIT_FOREVER,
};

// ============ Atomic kernel flags ============

/// Lock-free kernel flags, readable without the critical section.
///
/// The authoritative scheduler state (running, scheduler lock) lives in
/// [`KernelState`]; these mirrors serve interrupt entry/exit accounting,
/// the log timestamp, and the fast pre-checks in the `os_*` wrappers.
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
    int_nesting: AtomicU8,
    tick: AtomicU32,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            int_nesting: AtomicU8::new(0),
            tick: AtomicU32::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.int_nesting.store(0, Ordering::SeqCst);
        self.tick.store(0, Ordering::SeqCst);
    }

    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Current tick count (mirror; the critical-section copy is
    /// authoritative)
    #[inline(always)]
    pub fn tick_get(&self) -> OsTick {
        self.tick.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn int_nesting(&self) -> OsNestingCtr {
        self.int_nesting.load(Ordering::Relaxed)
    }

    /// Mark interrupt entry. Called by ISR-side kernel entry points.
    #[inline(always)]
    pub fn int_enter(&self) {
        let _ = self
            .int_nesting
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                n.checked_add(1)
            });
    }

    /// Mark interrupt exit.
    #[inline(always)]
    pub fn int_exit(&self) {
        let _ = self
            .int_nesting
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                n.checked_sub(1)
            });
    }

    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn tick_set(&self, tick: OsTick) {
        self.tick.store(tick, Ordering::Relaxed);
    }
}

/// Global kernel flags instance
pub static KERNEL: KernelFlags = KernelFlags::new();

// ============ Object slots ============

/// One generation-tagged arena slot.
pub(crate) struct Slot<T> {
    pub(crate) live: bool,
    pub(crate) gen: u16,
    pub(crate) cb: T,
}

impl<T> Slot<T> {
    pub(crate) const fn new(cb: T) -> Self {
        Slot {
            live: false,
            gen: 1,
            cb,
        }
    }
}

/// Claim the first free slot; returns its index.
pub(crate) fn alloc_slot<T>(slots: &mut [Slot<T>]) -> Option<u8> {
    for (i, slot) in slots.iter_mut().enumerate() {
        if !slot.live {
            slot.live = true;
            return Some(i as u8);
        }
    }
    None
}

/// Deferred-ISR work item
#[derive(Clone, Copy)]
pub(crate) struct DeferEntry {
    pub(crate) func: Option<fn(*mut ())>,
    pub(crate) arg: *mut (),
}

impl DeferEntry {
    const EMPTY: Self = DeferEntry {
        func: None,
        arg: core::ptr::null_mut(),
    };
}

// ============ Kernel state ============

/// The kernel context: every list, arena, and counter the kernel mutates.
///
/// Lifecycle: `new` (const) → `init` (arenas reset, service tasks created)
/// → `start` (dispatch begins). The global instance is only touched inside
/// the critical section; tests may own private instances.
pub struct KernelState {
    pub(crate) cfg: OsConfig,
    pub(crate) nodes: NodeArena<{ layout::NODE_COUNT }>,
    pub(crate) prio_tbl: PrioTable,

    pub(crate) tasks: [Slot<Tcb>; CFG_TASK_MAX],
    pub(crate) sems: [Slot<SemCb>; CFG_SEM_MAX],
    pub(crate) mutexes: [Slot<MutexCb>; CFG_MUTEX_MAX],
    pub(crate) flags: [Slot<FlagCb>; CFG_FLAG_MAX],
    pub(crate) msgqs: [Slot<MsgQueueCb>; CFG_MSGQ_MAX],
    pub(crate) dataqs: [Slot<DataQueueCb>; CFG_DATAQ_MAX],
    pub(crate) pools: [Slot<MemPoolCb>; CFG_MEMPOOL_MAX],
    pub(crate) timers: [Slot<TimerCb>; CFG_TIMER_MAX],

    /// Currently executing task, if dispatch has committed one
    pub(crate) cur: Option<u8>,
    /// Authoritative tick counter
    pub(crate) tick: OsTick,
    /// Dispatch enabled
    pub(crate) running: bool,
    /// Scheduler lock nesting
    pub(crate) sched_lock: OsNestingCtr,

    /// Semaphore the tick handler signals when the pending timer head is due
    pub(crate) timer_sem: Option<SemId>,
    /// Semaphore counting queued deferred-ISR work items
    pub(crate) defer_sem: Option<SemId>,
    pub(crate) defer_ring: [DeferEntry; CFG_ISR_WORK_DEPTH],
    pub(crate) defer_head: usize,
    pub(crate) defer_len: usize,
}

macro_rules! check_handle {
    ($(#[$doc:meta])* $name:ident, $field:ident, $id:ty) => {
        $(#[$doc])*
        pub(crate) fn $name(&self, id: $id) -> OsResult<u8> {
            let slot = self
                .$field
                .get(id.index as usize)
                .ok_or(OsError::Param)?;
            if !slot.live || slot.gen != id.gen {
                return Err(OsError::StaleHandle);
            }
            Ok(id.index)
        }
    };
}

impl KernelState {
    pub const fn new() -> Self {
        const TASK: Slot<Tcb> = Slot::new(Tcb::new());
        const SEM: Slot<SemCb> = Slot::new(SemCb::new());
        const MUTEX: Slot<MutexCb> = Slot::new(MutexCb::new());
        const FLAG: Slot<FlagCb> = Slot::new(FlagCb::new());
        const MSGQ: Slot<MsgQueueCb> = Slot::new(MsgQueueCb::new());
        const DATAQ: Slot<DataQueueCb> = Slot::new(DataQueueCb::new());
        const POOL: Slot<MemPoolCb> = Slot::new(MemPoolCb::new());
        const TIMER: Slot<TimerCb> = Slot::new(TimerCb::new());

        KernelState {
            cfg: OsConfig::new(),
            nodes: NodeArena::new(),
            prio_tbl: PrioTable::new(),
            tasks: [TASK; CFG_TASK_MAX],
            sems: [SEM; CFG_SEM_MAX],
            mutexes: [MUTEX; CFG_MUTEX_MAX],
            flags: [FLAG; CFG_FLAG_MAX],
            msgqs: [MSGQ; CFG_MSGQ_MAX],
            dataqs: [DATAQ; CFG_DATAQ_MAX],
            pools: [POOL; CFG_MEMPOOL_MAX],
            timers: [TIMER; CFG_TIMER_MAX],
            cur: None,
            tick: 0,
            running: false,
            sched_lock: 0,
            timer_sem: None,
            defer_sem: None,
            defer_ring: [DeferEntry::EMPTY; CFG_ISR_WORK_DEPTH],
            defer_head: 0,
            defer_len: 0,
        }
    }

    /// Reset arenas and counters and capture the configuration.
    ///
    /// Slot generations survive the reset so handles from a previous
    /// lifecycle stay detectably stale.
    pub fn init(&mut self, cfg: OsConfig) -> OsResult<()> {
        if !(CFG_PRIO_APP_MIN..=CFG_PRIO_APP_MAX).contains(&cfg.timer_task_prio) {
            return Err(OsError::Param);
        }
        if cfg.tick_hz == 0 {
            return Err(OsError::Param);
        }

        self.cfg = cfg;
        self.nodes.init();
        self.prio_tbl.init();
        for slot in self.tasks.iter_mut() {
            slot.live = false;
            slot.cb = Tcb::new();
        }
        for slot in self.sems.iter_mut() {
            slot.live = false;
            slot.cb = SemCb::new();
        }
        for slot in self.mutexes.iter_mut() {
            slot.live = false;
            slot.cb = MutexCb::new();
        }
        for slot in self.flags.iter_mut() {
            slot.live = false;
            slot.cb = FlagCb::new();
        }
        for slot in self.msgqs.iter_mut() {
            slot.live = false;
            slot.cb = MsgQueueCb::new();
        }
        for slot in self.dataqs.iter_mut() {
            slot.live = false;
            slot.cb = DataQueueCb::new();
        }
        for slot in self.pools.iter_mut() {
            slot.live = false;
            slot.cb = MemPoolCb::new();
        }
        for slot in self.timers.iter_mut() {
            slot.live = false;
            slot.cb = TimerCb::new();
        }
        self.cur = None;
        self.tick = 0;
        self.running = false;
        self.sched_lock = 0;
        self.timer_sem = Some(self.sem_create(0, CFG_TIMER_MAX as u32)?);
        self.defer_sem = Some(self.sem_create(0, CFG_ISR_WORK_DEPTH as u32)?);
        self.defer_ring = [DeferEntry::EMPTY; CFG_ISR_WORK_DEPTH];
        self.defer_head = 0;
        self.defer_len = 0;
        Ok(())
    }

    /// Enable dispatch. At least the idle task must be ready. The first
    /// task is committed by the first context switch, not here, so the
    /// port's switch handler finds no outgoing context to save.
    pub fn start(&mut self) -> OsResult<()> {
        if self.running {
            return Err(OsError::AlreadyRunning);
        }
        if self.pick_highest().is_none() {
            return Err(OsError::Error);
        }
        self.running = true;
        Ok(())
    }

    // ============ Accessors ============

    #[inline]
    pub(crate) fn tcb(&self, t: u8) -> &Tcb {
        &self.tasks[t as usize].cb
    }

    #[inline]
    pub(crate) fn tcb_mut(&mut self, t: u8) -> &mut Tcb {
        &mut self.tasks[t as usize].cb
    }

    /// Index of the currently executing task.
    pub(crate) fn cur_task(&self) -> OsResult<u8> {
        self.cur.ok_or(OsError::NotRunning)
    }

    /// Current task as a public handle, for introspection.
    pub fn current(&self) -> Option<TaskId> {
        self.cur.map(|t| TaskId {
            index: t,
            gen: self.tasks[t as usize].gen,
        })
    }

    /// Authoritative tick count.
    pub fn tick_now(&self) -> OsTick {
        self.tick
    }

    check_handle!(
        /// Validate a task handle.
        check_task, tasks, TaskId
    );
    check_handle!(
        /// Validate a semaphore handle.
        check_sem, sems, SemId
    );
    check_handle!(
        /// Validate a mutex handle.
        check_mutex, mutexes, MutexId
    );
    check_handle!(
        /// Validate an event flag group handle.
        check_flag, flags, FlagId
    );
    check_handle!(
        /// Validate a message queue handle.
        check_msgq, msgqs, MsgQueueId
    );
    check_handle!(
        /// Validate a data queue handle.
        check_dataq, dataqs, DataQueueId
    );
    check_handle!(
        /// Validate a memory pool handle.
        check_pool, pools, MemPoolId
    );
    check_handle!(
        /// Validate a timer handle.
        check_timer, timers, TimerId
    );

    // ============ Scheduler lock ============

    pub fn sched_lock(&mut self) -> OsResult<()> {
        if !self.running {
            return Err(OsError::NotRunning);
        }
        self.sched_lock = self
            .sched_lock
            .checked_add(1)
            .ok_or(OsError::NestingOverflow)?;
        Ok(())
    }

    pub fn sched_unlock(&mut self) -> OsResult<()> {
        if !self.running {
            return Err(OsError::NotRunning);
        }
        if self.sched_lock == 0 {
            return Err(OsError::NotLocked);
        }
        self.sched_lock -= 1;
        if self.sched_lock == 0 {
            self.sched_request();
        }
        Ok(())
    }

    // ============ Deferred-ISR work ============

    /// Queue a work item for the deferred-ISR service task. O(1), callable
    /// from interrupt context.
    pub fn defer_post(&mut self, func: fn(*mut ()), arg: *mut ()) -> OsResult<()> {
        if self.defer_len == CFG_ISR_WORK_DEPTH {
            return Err(OsError::NoResource);
        }
        let idx = (self.defer_head + self.defer_len) % CFG_ISR_WORK_DEPTH;
        self.defer_ring[idx] = DeferEntry {
            func: Some(func),
            arg,
        };
        self.defer_len += 1;
        if let Some(sem) = self.defer_sem {
            self.sem_release_at(sem.index)?;
        }
        Ok(())
    }

    pub(crate) fn defer_pop(&mut self) -> Option<(fn(*mut ()), *mut ())> {
        if self.defer_len == 0 {
            return None;
        }
        let entry = self.defer_ring[self.defer_head];
        self.defer_ring[self.defer_head] = DeferEntry::EMPTY;
        self.defer_head = (self.defer_head + 1) % CFG_ISR_WORK_DEPTH;
        self.defer_len -= 1;
        entry.func.map(|f| (f, entry.arg))
    }
}

impl Default for KernelState {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Global instance ============

/// The kernel context behind the `os_*` API
pub static KSTATE: CsCell<KernelState> = CsCell::new(KernelState::new());

/// Stacks of the kernel service tasks
static mut IDLE_STK: [OsStkElement; CFG_KERNEL_STK_SIZE] = [0; CFG_KERNEL_STK_SIZE];
static mut TIMER_STK: [OsStkElement; CFG_KERNEL_STK_SIZE] = [0; CFG_KERNEL_STK_SIZE];
static mut DEFER_STK: [OsStkElement; CFG_KERNEL_STK_SIZE] = [0; CFG_KERNEL_STK_SIZE];

/// Idle task: the only task that is always ready. Never blocks, never
/// exits.
fn idle_task(_: *mut ()) -> ! {
    loop {
        crate::port::cpu_idle();
    }
}

/// Deferred-ISR service task: drains the work ring in task context.
fn defer_task(_: *mut ()) -> ! {
    let sem = defer_sem_id();
    loop {
        let _ = crate::sync::sem::os_sem_acquire(sem, WAIT_FOREVER);
        let work = critical_section(|cs| KSTATE.get(cs).defer_pop());
        if let Some((func, arg)) = work {
            func(arg);
        }
    }
}

fn defer_sem_id() -> SemId {
    critical_section(|cs| KSTATE.get(cs).defer_sem).unwrap_or(SemId { index: 0, gen: 0 })
}

pub(crate) fn timer_sem_id() -> SemId {
    critical_section(|cs| KSTATE.get(cs).timer_sem).unwrap_or(SemId { index: 0, gen: 0 })
}

// ============ Public API ============

/// Initialize the kernel.
///
/// Resets the kernel context, captures the configuration record, and
/// creates the idle, timer-service and deferred-ISR tasks. Must be called
/// before any other `os_*` function.
pub fn os_init(cfg: OsConfig) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    if KERNEL.is_running() {
        return Err(OsError::AlreadyRunning);
    }
    KERNEL.reset();

    critical_section(|cs| {
        let k = KSTATE.get(cs);
        k.init(cfg)?;

        unsafe {
            crate::task::spawn_service(
                k,
                "idle",
                idle_task,
                core::ptr::null_mut(),
                CFG_PRIO_IDLE,
                &raw mut IDLE_STK as *mut OsStkElement,
                CFG_KERNEL_STK_SIZE,
            )?;
            crate::task::spawn_service(
                k,
                "timer",
                crate::timer::timer_task,
                core::ptr::null_mut(),
                cfg.timer_task_prio,
                &raw mut TIMER_STK as *mut OsStkElement,
                CFG_KERNEL_STK_SIZE,
            )?;
            crate::task::spawn_service(
                k,
                "isr-defer",
                defer_task,
                core::ptr::null_mut(),
                CFG_PRIO_ISR_DEFER,
                &raw mut DEFER_STK as *mut OsStkElement,
                CFG_KERNEL_STK_SIZE,
            )?;
        }
        Ok(())
    })?;

    KERNEL.set_initialized(true);
    Ok(())
}

/// Start multitasking.
///
/// Programs the port tick source and hands the CPU to the highest-priority
/// ready task. On hardware this function does not return.
pub fn os_start() -> OsResult<()> {
    if !KERNEL.is_initialized() {
        return Err(OsError::NotInit);
    }
    if KERNEL.is_running() {
        return Err(OsError::AlreadyRunning);
    }

    let tick_hz = critical_section(|cs| {
        let k = KSTATE.get(cs);
        k.start()?;
        Ok::<u32, OsError>(k.cfg.tick_hz)
    })?;

    KERNEL.set_running(true);
    crate::port::systick_init(tick_hz);
    crate::port::start_first_task();
    Ok(())
}

/// Lock the scheduler: the current task keeps the CPU until the matching
/// unlock. Interrupts stay enabled; blocking calls are rejected while
/// locked.
pub fn os_sched_lock() -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| KSTATE.get(cs).sched_lock())
}

/// Undo one level of scheduler lock; dispatch resumes at zero.
pub fn os_sched_unlock() -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| KSTATE.get(cs).sched_unlock())
}

/// Queue work for the deferred-ISR service task (priority 32).
///
/// Intended for interrupt handlers that need more than the O(1) wake-side
/// kernel calls; `func` runs in task context.
pub fn os_isr_defer(func: fn(*mut ()), arg: *mut ()) -> OsResult<()> {
    if !KERNEL.is_initialized() {
        return Err(OsError::NotInit);
    }
    critical_section(|cs| KSTATE.get(cs).defer_post(func, arg))
}

/// Saved-context switch hook for the port layer: records the outgoing
/// task's stack pointer, commits dispatch, and returns the incoming
/// task's stack pointer.
///
/// # Safety
/// Must only be called by the port's context-switch handler with
/// interrupts masked.
pub unsafe fn switch_context(sp: *mut OsStkElement) -> *mut OsStkElement {
    let k = unsafe { KSTATE.get_unchecked() };
    if let Some(old) = k.cur {
        if k.tasks[old as usize].live {
            k.tasks[old as usize].cb.sp = sp;
        }
    }
    match k.dispatch() {
        Some(new) => k.tasks[new as usize].cb.sp,
        None => core::ptr::null_mut(),
    }
}

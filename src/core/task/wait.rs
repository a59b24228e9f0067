//! Block/wake protocol
//!
//! The one protocol every blocking primitive shares: a waiter leaves the
//! ready queue, parks its scheduling link in the object's wait queue,
//! registers a timeout in the delay queue, and is later finished with an
//! outcome by the wake side or the tick handler. Satisfaction removes the
//! waiter from the delay queue in the same critical section that records
//! the outcome, so a same-tick timeout can never override a completed
//! wait.

use crate::core::layout;
use crate::core::queue::NodeRef;
use crate::error::{OsError, OsResult};
use crate::kernel::{KernelState, KSTATE};
use crate::critical::critical_section;
use crate::task::WaitInfo;
use crate::types::{OsTaskState, OsTick, WAIT_FOREVER};

/// Wait queue discipline
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOrder {
    /// By arrival
    Fifo,
    /// By current priority, FIFO within a level
    Priority,
}

/// Immediate result of a potentially blocking operation.
///
/// `Blocked` means the caller has been parked; its final outcome arrives
/// through its wait record once it is dispatched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    Done(T),
    Blocked,
}

impl KernelState {
    /// Park the current task on a wait queue (`head`), or on nothing for a
    /// plain delay. The caller has already decided that blocking is
    /// allowed and recorded what is awaited in `winfo`.
    pub(crate) fn wait_begin(
        &mut self,
        t: u8,
        winfo: WaitInfo,
        head: Option<NodeRef>,
        order: WaitOrder,
        timeout: OsTick,
    ) {
        debug_assert!(self.cur == Some(t));
        debug_assert!(timeout != 0);

        self.make_unready(t);
        {
            let tcb = self.tcb_mut(t);
            tcb.state = OsTaskState::Blocked;
            tcb.winfo = winfo;
            tcb.wait_status = Ok(());
        }
        if let Some(head) = head {
            self.wait_queue_insert(t, head, order);
        }
        if timeout != WAIT_FOREVER {
            let wake = self.tick.wrapping_add(timeout);
            self.delay_insert(t, wake);
        }
        self.sched_request();
    }

    /// Deliver an outcome to a blocked task and make it ready (or park it
    /// if it was suspended meanwhile). Leaves `winfo` in place: result
    /// fields inside it belong to the waiter.
    pub(crate) fn wait_finish(&mut self, t: u8, status: Result<(), OsError>) {
        debug_assert!(self.tcb(t).state == OsTaskState::Blocked);

        self.nodes.remove(layout::task_sched(t));
        self.delay_remove(t);
        let suspended = {
            let tcb = self.tcb_mut(t);
            tcb.wait_status = status;
            tcb.state = OsTaskState::Ready;
            tcb.suspend_cnt > 0
        };
        if !suspended {
            self.make_ready(t);
            self.sched_request();
        }
    }

    /// Insert a task's scheduling link into a wait queue.
    pub(crate) fn wait_queue_insert(&mut self, t: u8, head: NodeRef, order: WaitOrder) {
        let n = layout::task_sched(t);
        match order {
            WaitOrder::Fifo => self.nodes.insert_before(n, head),
            WaitOrder::Priority => {
                let prio = self.tcb(t).prio;
                let mut pos = head;
                let mut cursor = self.nodes.first(head);
                while let Some(node) = cursor {
                    let owner = layout::sched_owner(node);
                    if self.tcb(owner).prio < prio {
                        pos = node;
                        break;
                    }
                    let next = self.nodes.next(node);
                    cursor = if next == head { None } else { Some(next) };
                }
                self.nodes.insert_before(n, pos);
            }
        }
    }

    /// Re-sort a blocked task inside its wait queue after a priority
    /// change. FIFO queues keep arrival order by design.
    pub(crate) fn requeue_waiter(&mut self, t: u8) {
        if let Some(head) = self.wait_queue_of(t) {
            self.nodes.remove(layout::task_sched(t));
            self.wait_queue_insert(t, head, WaitOrder::Priority);
        }
    }

    /// The priority-ordered wait queue a blocked task sits in, if any.
    fn wait_queue_of(&self, t: u8) -> Option<NodeRef> {
        match self.tcb(t).winfo {
            WaitInfo::Mutex { mutex } => Some(layout::mutex_wait_head(mutex)),
            WaitInfo::MsgSend { msgq, .. } => Some(layout::msgq_send_head(msgq)),
            WaitInfo::MsgRecv { msgq, .. } => Some(layout::msgq_recv_head(msgq)),
            WaitInfo::DataSend { dataq, .. } => Some(layout::dataq_send_head(dataq)),
            WaitInfo::DataRecv { dataq, .. } => Some(layout::dataq_recv_head(dataq)),
            // Semaphore, flag and pool waiters queue by arrival.
            _ => None,
        }
    }

    /// Timeout/delay expiry path, invoked by the tick handler after the
    /// task has been removed from the delay queue.
    pub(crate) fn wait_expire(&mut self, t: u8) {
        let winfo = self.tcb(t).winfo;
        match winfo {
            WaitInfo::Delay => self.wait_finish(t, Ok(())),
            WaitInfo::Mutex { mutex } => {
                self.wait_finish(t, Err(OsError::Timeout));
                // A departed waiter may lower the holder's inherited
                // priority.
                self.mutex_recompute_holder(mutex);
            }
            _ => self.wait_finish(t, Err(OsError::Timeout)),
        }
    }
}

/// Read back the outcome of a wait the current task just completed.
///
/// Runs in the woken task's own context: `extract` pulls the result value
/// out of the wait record the wake side filled in.
pub(crate) fn complete_wait<T>(extract: impl FnOnce(&WaitInfo) -> T) -> OsResult<T> {
    critical_section(|cs| {
        let k = KSTATE.get(cs);
        let t = k.cur_task()?;
        let tcb = k.tcb_mut(t);
        let status = tcb.wait_status;
        let value = extract(&tcb.winfo);
        tcb.winfo = WaitInfo::None;
        tcb.wait_status = Ok(());
        status.map(|()| value)
    })
}

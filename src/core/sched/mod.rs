//! Scheduler
//!
//! Priority-based preemptive dispatch with optional round-robin slicing
//! inside a level. The running task stays at the head of its ready queue;
//! `dispatch` commits the decision the ready bitmap implies.

mod prio;

pub use prio::PrioTable;

use crate::core::layout;
use crate::kernel::KernelState;
use crate::types::{OsPrio, OsTaskState};

impl KernelState {
    /// Append a task to the tail of its level's ready queue.
    pub(crate) fn make_ready(&mut self, t: u8) {
        let prio = self.tcb(t).prio;
        self.nodes
            .insert_before(layout::task_sched(t), layout::ready_head(prio));
        self.prio_tbl.insert(prio);
    }

    /// Put a task at the front of its level's ready queue. Used when the
    /// running task changes level: a preempted or re-leveled runner must
    /// not lose its turn to an equal-priority peer.
    pub(crate) fn make_ready_front(&mut self, t: u8) {
        let prio = self.tcb(t).prio;
        self.nodes
            .insert_after(layout::task_sched(t), layout::ready_head(prio));
        self.prio_tbl.insert(prio);
    }

    /// Unlink a task from its ready queue and update the bitmap.
    pub(crate) fn make_unready(&mut self, t: u8) {
        let prio = self.tcb(t).prio;
        self.nodes.remove(layout::task_sched(t));
        if self.nodes.is_empty(layout::ready_head(prio)) {
            self.prio_tbl.remove(prio);
        }
    }

    /// The task dispatch would select: head of the highest non-empty level.
    pub(crate) fn pick_highest(&self) -> Option<u8> {
        let prio = self.prio_tbl.highest()?;
        self.nodes
            .first(layout::ready_head(prio))
            .map(layout::sched_owner)
    }

    /// Ask the port for a context switch if the ready bitmap disagrees
    /// with the committed current task. No-op while the scheduler is
    /// locked; the unlock path re-checks.
    pub(crate) fn sched_request(&mut self) {
        if !self.running || self.sched_lock > 0 {
            return;
        }
        if self.pick_highest() != self.cur {
            crate::port::request_ctx_sw();
        }
    }

    /// Commit a dispatch decision: demote the outgoing task to Ready,
    /// promote the selected one to Running, and move `cur`. Returns the
    /// new current task.
    ///
    /// On hardware this runs inside the port's switch handler; host tests
    /// call it directly to simulate the switch.
    pub fn dispatch(&mut self) -> Option<u8> {
        // A switch pended before the scheduler was locked must not land
        // while it is held.
        if self.sched_lock > 0 {
            return self.cur;
        }
        let next = self.pick_highest();
        if next == self.cur {
            return next;
        }
        if let Some(old) = self.cur {
            let tcb = self.tcb_mut(old);
            if tcb.state == OsTaskState::Running {
                tcb.state = OsTaskState::Ready;
            }
        }
        self.cur = next;
        if let Some(new) = next {
            self.tcb_mut(new).state = OsTaskState::Running;
        }
        next
    }

    /// One round-robin accounting step, called from the tick handler.
    /// A zero configured quanta disables slicing.
    pub(crate) fn round_robin(&mut self) {
        if self.cfg.round_robin_quanta == 0 {
            return;
        }
        let Some(cur) = self.cur else {
            return;
        };
        let quanta = self.cfg.round_robin_quanta;
        let tcb = self.tcb_mut(cur);
        if tcb.quanta_ctr > 0 {
            tcb.quanta_ctr -= 1;
        }
        if tcb.quanta_ctr != 0 {
            return;
        }
        tcb.quanta_ctr = quanta;
        let prio = tcb.prio;
        let head = layout::ready_head(prio);
        let n = layout::task_sched(cur);

        // Rotate only when the runner is still queued and has a peer.
        if !self.nodes.is_detached(n) && self.nodes.first(head) != self.nodes.last(head) {
            self.nodes.remove(n);
            self.nodes.insert_before(n, head);
            self.sched_request();
        }
    }

    /// Move a task to a new effective priority, preserving its scheduling
    /// position class: a queued Ready/Running task is re-queued at the new
    /// level, a blocked task is re-sorted in a priority-ordered wait queue
    /// and its inheritance chain is followed.
    pub(crate) fn reassign_priority(&mut self, t: u8, new_prio: OsPrio) {
        if self.tcb(t).prio == new_prio {
            return;
        }
        match self.tcb(t).state {
            OsTaskState::Ready | OsTaskState::Running => {
                let queued = !self.nodes.is_detached(layout::task_sched(t));
                if queued {
                    self.make_unready(t);
                }
                self.tcb_mut(t).prio = new_prio;
                if queued {
                    if self.cur == Some(t) {
                        self.make_ready_front(t);
                    } else {
                        self.make_ready(t);
                    }
                    // A level change can change who is highest-ready.
                    self.sched_request();
                }
            }
            OsTaskState::Blocked => {
                self.tcb_mut(t).prio = new_prio;
                self.requeue_waiter(t);
                // Transitive inheritance: a boosted waiter boosts the
                // holder of the mutex it is blocked on. Terminates because
                // the recursion stops at the first unchanged priority.
                if let crate::task::WaitInfo::Mutex { mutex } = self.tcb(t).winfo {
                    self.mutex_recompute_holder(mutex);
                }
            }
            OsTaskState::Terminated => {}
        }
    }
}

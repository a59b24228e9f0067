//! Node arena layout
//!
//! Fixed compile-time assignment of queue-node slots to kernel objects.
//! Heads come first, then one block of link nodes per object class, so the
//! owner of any node can be recovered with O(1) arithmetic.

use crate::config::{
    CFG_DATAQ_MAX, CFG_FLAG_MAX, CFG_MEMPOOL_MAX, CFG_MSGQ_MAX, CFG_MSGQ_SLOT_MAX, CFG_MUTEX_MAX,
    CFG_PRIO_MAX, CFG_SEM_MAX, CFG_TASK_MAX, CFG_TIMER_MAX,
};
use crate::core::queue::NodeRef;
use crate::types::OsPrio;

// Heads
const READY_HEAD_BASE: usize = 0;
/// Delay queue head (threads sleeping or waiting with a timeout)
pub const DELAY_HEAD: NodeRef = (READY_HEAD_BASE + CFG_PRIO_MAX) as NodeRef;
/// Timer pending list head
pub const TIMER_HEAD: NodeRef = DELAY_HEAD + 1;
const HEADS_END: usize = TIMER_HEAD as usize + 1;

// Per-task links
const TASK_SCHED_BASE: usize = HEADS_END;
const TASK_DELAY_BASE: usize = TASK_SCHED_BASE + CFG_TASK_MAX;
const TASK_MUTEX_HEAD_BASE: usize = TASK_DELAY_BASE + CFG_TASK_MAX;

// Per-object heads and links
const SEM_WAIT_BASE: usize = TASK_MUTEX_HEAD_BASE + CFG_TASK_MAX;
const MUTEX_WAIT_BASE: usize = SEM_WAIT_BASE + CFG_SEM_MAX;
const MUTEX_LINK_BASE: usize = MUTEX_WAIT_BASE + CFG_MUTEX_MAX;
const FLAG_WAIT_BASE: usize = MUTEX_LINK_BASE + CFG_MUTEX_MAX;
const MSGQ_LIST_BASE: usize = FLAG_WAIT_BASE + CFG_FLAG_MAX;
const MSGQ_SEND_BASE: usize = MSGQ_LIST_BASE + CFG_MSGQ_MAX;
const MSGQ_RECV_BASE: usize = MSGQ_SEND_BASE + CFG_MSGQ_MAX;
const MSGQ_SLOT_BASE: usize = MSGQ_RECV_BASE + CFG_MSGQ_MAX;
const DATAQ_SEND_BASE: usize = MSGQ_SLOT_BASE + CFG_MSGQ_MAX * CFG_MSGQ_SLOT_MAX;
const DATAQ_RECV_BASE: usize = DATAQ_SEND_BASE + CFG_DATAQ_MAX;
const POOL_WAIT_BASE: usize = DATAQ_RECV_BASE + CFG_DATAQ_MAX;
const TIMER_LINK_BASE: usize = POOL_WAIT_BASE + CFG_MEMPOOL_MAX;

/// Total node count of the kernel arena
pub const NODE_COUNT: usize = TIMER_LINK_BASE + CFG_TIMER_MAX;

/// Ready queue head for a priority level (1..=32)
#[inline]
pub const fn ready_head(prio: OsPrio) -> NodeRef {
    (READY_HEAD_BASE + prio as usize - 1) as NodeRef
}

/// A task's scheduling link: member of a ready queue xor a wait queue
#[inline]
pub const fn task_sched(t: u8) -> NodeRef {
    (TASK_SCHED_BASE + t as usize) as NodeRef
}

/// A task's delay-queue link, independent of the scheduling link
#[inline]
pub const fn task_delay(t: u8) -> NodeRef {
    (TASK_DELAY_BASE + t as usize) as NodeRef
}

/// Head of a task's held-mutex list
#[inline]
pub const fn task_mutex_head(t: u8) -> NodeRef {
    (TASK_MUTEX_HEAD_BASE + t as usize) as NodeRef
}

/// Task index owning a scheduling-link node
#[inline]
pub const fn sched_owner(n: NodeRef) -> u8 {
    (n as usize - TASK_SCHED_BASE) as u8
}

/// Task index owning a delay-link node
#[inline]
pub const fn delay_owner(n: NodeRef) -> u8 {
    (n as usize - TASK_DELAY_BASE) as u8
}

#[inline]
pub const fn sem_wait_head(s: u8) -> NodeRef {
    (SEM_WAIT_BASE + s as usize) as NodeRef
}

#[inline]
pub const fn mutex_wait_head(m: u8) -> NodeRef {
    (MUTEX_WAIT_BASE + m as usize) as NodeRef
}

/// A mutex's membership link in its holder's held-mutex list
#[inline]
pub const fn mutex_link(m: u8) -> NodeRef {
    (MUTEX_LINK_BASE + m as usize) as NodeRef
}

/// Mutex index owning a held-list link node
#[inline]
pub const fn mutex_of_link(n: NodeRef) -> u8 {
    (n as usize - MUTEX_LINK_BASE) as u8
}

#[inline]
pub const fn flag_wait_head(f: u8) -> NodeRef {
    (FLAG_WAIT_BASE + f as usize) as NodeRef
}

/// Head of a message queue's in-flight message list
#[inline]
pub const fn msgq_list_head(q: u8) -> NodeRef {
    (MSGQ_LIST_BASE + q as usize) as NodeRef
}

#[inline]
pub const fn msgq_send_head(q: u8) -> NodeRef {
    (MSGQ_SEND_BASE + q as usize) as NodeRef
}

#[inline]
pub const fn msgq_recv_head(q: u8) -> NodeRef {
    (MSGQ_RECV_BASE + q as usize) as NodeRef
}

/// Link node of message slot `slot` of queue `q`
#[inline]
pub const fn msgq_slot(q: u8, slot: u8) -> NodeRef {
    (MSGQ_SLOT_BASE + q as usize * CFG_MSGQ_SLOT_MAX + slot as usize) as NodeRef
}

/// Message slot index owning a message-list node
#[inline]
pub const fn msg_slot_of(n: NodeRef) -> u8 {
    ((n as usize - MSGQ_SLOT_BASE) % CFG_MSGQ_SLOT_MAX) as u8
}

#[inline]
pub const fn dataq_send_head(q: u8) -> NodeRef {
    (DATAQ_SEND_BASE + q as usize) as NodeRef
}

#[inline]
pub const fn dataq_recv_head(q: u8) -> NodeRef {
    (DATAQ_RECV_BASE + q as usize) as NodeRef
}

#[inline]
pub const fn pool_wait_head(p: u8) -> NodeRef {
    (POOL_WAIT_BASE + p as usize) as NodeRef
}

/// A timer's membership link in the pending list
#[inline]
pub const fn timer_link(t: u8) -> NodeRef {
    (TIMER_LINK_BASE + t as usize) as NodeRef
}

/// Timer index owning a pending-list node
#[inline]
pub const fn timer_of_link(n: NodeRef) -> u8 {
    (n as usize - TIMER_LINK_BASE) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_do_not_overlap() {
        assert!(NODE_COUNT < NodeRef::MAX as usize);
        assert_eq!(ready_head(1), 0);
        assert_eq!(ready_head(CFG_PRIO_MAX as OsPrio) + 1, DELAY_HEAD);
        assert!(task_sched(0) > TIMER_HEAD);
        assert!(task_delay(0) > task_sched((CFG_TASK_MAX - 1) as u8));
        assert!(timer_link((CFG_TIMER_MAX - 1) as u8) as usize == NODE_COUNT - 1);
    }

    #[test]
    fn owner_recovery_round_trips() {
        for t in 0..CFG_TASK_MAX as u8 {
            assert_eq!(sched_owner(task_sched(t)), t);
            assert_eq!(delay_owner(task_delay(t)), t);
        }
        for m in 0..CFG_MUTEX_MAX as u8 {
            assert_eq!(mutex_of_link(mutex_link(m)), m);
        }
        for q in 0..CFG_MSGQ_MAX as u8 {
            for s in 0..CFG_MSGQ_SLOT_MAX as u8 {
                assert_eq!(msg_slot_of(msgq_slot(q, s)), s);
            }
        }
        for t in 0..CFG_TIMER_MAX as u8 {
            assert_eq!(timer_of_link(timer_link(t)), t);
        }
    }
}

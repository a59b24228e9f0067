//! Message queue
//!
//! A priority-ordered mailbox with copy-in/copy-out semantics. Payloads
//! live in a private fixed-block pool carved from caller-supplied backing
//! memory at creation, so the in-flight count can never exceed the
//! configured capacity.
//!
//! Handoff is direct: when a peer is already blocked, the releasing side
//! copies straight between the slot pool and the peer's buffer. A blocked
//! task's buffer pointer stays valid for exactly as long as it is blocked
//! (its stack cannot unwind), which is what makes the raw-pointer copies
//! below sound.

use crate::config::CFG_MSGQ_SLOT_MAX;
use crate::core::layout;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel::{alloc_slot, KernelState, KSTATE};
use crate::task::wait::{complete_wait, WaitOrder};
use crate::task::{Outcome, WaitInfo};
use crate::types::{MsgQueueId, OsTick};

/// Message queue control block
pub(crate) struct MsgQueueCb {
    /// Private slot pool: `capacity` blocks of `msg_size` bytes
    pub(crate) buf: *mut u8,
    pub(crate) msg_size: usize,
    pub(crate) capacity: u8,
    /// Bit j set = slot j free
    pub(crate) free_mask: u32,
    /// Messages in flight
    pub(crate) count: u8,
    pub(crate) slot_len: [u16; CFG_MSGQ_SLOT_MAX],
    pub(crate) slot_prio: [u8; CFG_MSGQ_SLOT_MAX],
}

impl MsgQueueCb {
    pub(crate) const fn new() -> Self {
        MsgQueueCb {
            buf: core::ptr::null_mut(),
            msg_size: 0,
            capacity: 0,
            free_mask: 0,
            count: 0,
            slot_len: [0; CFG_MSGQ_SLOT_MAX],
            slot_prio: [0; CFG_MSGQ_SLOT_MAX],
        }
    }

    #[inline]
    fn slot_ptr(&self, slot: u8) -> *mut u8 {
        // Slots are carved at fixed strides from the backing buffer.
        unsafe { self.buf.add(slot as usize * self.msg_size) }
    }
}

impl KernelState {
    /// Create a message queue over caller-supplied backing memory.
    ///
    /// The buffer becomes the queue's private slot pool; it must hold
    /// `capacity * msg_size` bytes.
    pub fn msgq_create(
        &mut self,
        capacity: usize,
        msg_size: usize,
        storage: &'static mut [u8],
    ) -> OsResult<MsgQueueId> {
        if capacity == 0 || capacity > CFG_MSGQ_SLOT_MAX || msg_size == 0 {
            return Err(OsError::Param);
        }
        if storage.len() < capacity * msg_size {
            return Err(OsError::Param);
        }
        let q = alloc_slot(&mut self.msgqs).ok_or(OsError::NoMemory)?;
        self.msgqs[q as usize].cb = MsgQueueCb {
            buf: storage.as_mut_ptr(),
            msg_size,
            capacity: capacity as u8,
            free_mask: (1u32 << capacity) - 1,
            count: 0,
            slot_len: [0; CFG_MSGQ_SLOT_MAX],
            slot_prio: [0; CFG_MSGQ_SLOT_MAX],
        };
        Ok(MsgQueueId {
            index: q,
            gen: self.msgqs[q as usize].gen,
        })
    }

    /// Link an occupied slot into the message list: priority descending,
    /// FIFO within a level.
    fn msgq_link_slot(&mut self, q: u8, slot: u8, prio: u8) {
        let head = layout::msgq_list_head(q);
        let mut pos = head;
        let mut cursor = self.nodes.first(head);
        while let Some(node) = cursor {
            let other = layout::msg_slot_of(node);
            if self.msgqs[q as usize].cb.slot_prio[other as usize] < prio {
                pos = node;
                break;
            }
            let next = self.nodes.next(node);
            cursor = if next == head { None } else { Some(next) };
        }
        self.nodes.insert_before(layout::msgq_slot(q, slot), pos);
    }

    /// Copy a payload into the queue, or hand it straight to a blocked
    /// receiver.
    pub fn msgq_put(
        &mut self,
        id: MsgQueueId,
        payload: &[u8],
        prio: u8,
        timeout: OsTick,
    ) -> OsResult<Outcome<()>> {
        let q = self.check_msgq(id)?;
        if payload.len() > self.msgqs[q as usize].cb.msg_size {
            return Err(OsError::Param);
        }

        // A blocked receiver implies an empty message list; deliver
        // directly.
        if let Some(n) = self.nodes.first(layout::msgq_recv_head(q)) {
            debug_assert!(self.msgqs[q as usize].cb.count == 0);
            let w = layout::sched_owner(n);
            if let WaitInfo::MsgRecv { buf, cap, .. } = self.tcb(w).winfo {
                debug_assert!(cap >= payload.len());
                // The receiver is blocked, so its buffer is stable and
                // exclusively ours to fill.
                unsafe {
                    core::ptr::copy_nonoverlapping(payload.as_ptr(), buf, payload.len());
                }
                if let WaitInfo::MsgRecv {
                    len: wlen,
                    prio: wprio,
                    ..
                } = &mut self.tcb_mut(w).winfo
                {
                    *wlen = payload.len();
                    *wprio = prio;
                }
                self.wait_finish(w, Ok(()));
                return Ok(Outcome::Done(()));
            }
        }

        let free = self.msgqs[q as usize].cb.free_mask;
        if free != 0 {
            let slot = free.trailing_zeros() as u8;
            {
                let cb = &mut self.msgqs[q as usize].cb;
                cb.free_mask &= !(1 << slot);
                cb.slot_len[slot as usize] = payload.len() as u16;
                cb.slot_prio[slot as usize] = prio;
                cb.count += 1;
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        payload.as_ptr(),
                        cb.slot_ptr(slot),
                        payload.len(),
                    );
                }
            }
            self.msgq_link_slot(q, slot, prio);
            return Ok(Outcome::Done(()));
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
            WaitInfo::MsgSend {
                msgq: q,
                buf: payload.as_ptr(),
                len: payload.len(),
                prio,
            },
            Some(layout::msgq_send_head(q)),
            WaitOrder::Priority,
            timeout,
        );
        Ok(Outcome::Blocked)
    }

    /// Take the best message, refilling the freed slot from a blocked
    /// sender if one is queued. Returns (length, priority).
    pub fn msgq_get(
        &mut self,
        id: MsgQueueId,
        buf: &mut [u8],
        timeout: OsTick,
    ) -> OsResult<Outcome<(usize, u8)>> {
        let q = self.check_msgq(id)?;
        if buf.len() < self.msgqs[q as usize].cb.msg_size {
            return Err(OsError::Param);
        }

        if let Some(n) = self.nodes.first(layout::msgq_list_head(q)) {
            let slot = layout::msg_slot_of(n);
            self.nodes.remove(n);
            let (len, prio) = {
                let cb = &mut self.msgqs[q as usize].cb;
                let len = cb.slot_len[slot as usize] as usize;
                let prio = cb.slot_prio[slot as usize];
                unsafe {
                    core::ptr::copy_nonoverlapping(cb.slot_ptr(slot), buf.as_mut_ptr(), len);
                }
                cb.free_mask |= 1 << slot;
                cb.count -= 1;
                (len, prio)
            };

            // The freed slot can admit the best blocked sender.
            if let Some(sn) = self.nodes.first(layout::msgq_send_head(q)) {
                let w = layout::sched_owner(sn);
                if let WaitInfo::MsgSend {
                    buf: sbuf,
                    len: slen,
                    prio: sprio,
                    ..
                } = self.tcb(w).winfo
                {
                    let cb = &mut self.msgqs[q as usize].cb;
                    let free_slot = cb.free_mask.trailing_zeros() as u8;
                    cb.free_mask &= !(1 << free_slot);
                    cb.slot_len[free_slot as usize] = slen as u16;
                    cb.slot_prio[free_slot as usize] = sprio;
                    cb.count += 1;
                    // The sender is blocked; its payload is stable until
                    // we finish it.
                    unsafe {
                        core::ptr::copy_nonoverlapping(sbuf, cb.slot_ptr(free_slot), slen);
                    }
                    self.msgq_link_slot(q, free_slot, sprio);
                    self.wait_finish(w, Ok(()));
                }
            }
            return Ok(Outcome::Done((len, prio)));
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
            WaitInfo::MsgRecv {
                msgq: q,
                buf: buf.as_mut_ptr(),
                cap: buf.len(),
                len: 0,
                prio: 0,
            },
            Some(layout::msgq_recv_head(q)),
            WaitOrder::Priority,
            timeout,
        );
        Ok(Outcome::Blocked)
    }

    /// Messages currently in flight.
    pub fn msgq_count(&self, id: MsgQueueId) -> OsResult<usize> {
        let q = self.check_msgq(id)?;
        Ok(self.msgqs[q as usize].cb.count as usize)
    }
}

// ============ Public API ============

/// Create a message queue.
///
/// `storage` becomes the queue's private payload pool and must hold
/// `capacity * msg_size` bytes.
pub fn os_msgq_create(
    capacity: usize,
    msg_size: usize,
    storage: &'static mut [u8],
) -> OsResult<MsgQueueId> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| KSTATE.get(cs).msgq_create(capacity, msg_size, storage))
}

/// Put a message.
///
/// Higher `prio` messages are delivered first; equal priorities keep
/// arrival order. A full queue blocks the caller (or fails with
/// `NoResource` when `timeout` is zero). ISR-callable with zero timeout.
pub fn os_msgq_put(id: MsgQueueId, payload: &[u8], prio: u8, timeout: OsTick) -> OsResult<()> {
    if is_isr_context() && timeout != 0 {
        return Err(OsError::Isr);
    }
    let outcome = critical_section(|cs| KSTATE.get(cs).msgq_put(id, payload, prio, timeout))?;
    match outcome {
        Outcome::Done(()) => Ok(()),
        Outcome::Blocked => complete_wait(|_| ()),
    }
}

/// Get the best pending message into `buf` (which must hold `msg_size`
/// bytes). Returns (length, priority).
pub fn os_msgq_get(id: MsgQueueId, buf: &mut [u8], timeout: OsTick) -> OsResult<(usize, u8)> {
    if is_isr_context() && timeout != 0 {
        return Err(OsError::Isr);
    }
    let outcome = critical_section(|cs| KSTATE.get(cs).msgq_get(id, buf, timeout))?;
    match outcome {
        Outcome::Done(v) => Ok(v),
        Outcome::Blocked => complete_wait(|winfo| match winfo {
            WaitInfo::MsgRecv { len, prio, .. } => (*len, *prio),
            _ => (0, 0),
        }),
    }
}

/// Messages currently queued.
pub fn os_msgq_count(id: MsgQueueId) -> OsResult<usize> {
    critical_section(|cs| KSTATE.get(cs).msgq_count(id))
}

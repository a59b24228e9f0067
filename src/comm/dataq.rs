//! Data queue
//!
//! A strict-FIFO ring of machine words over caller-supplied memory, with
//! the same two-wait-queue blocking shape as the message queue but no
//! per-element priority. A zero-length ring degenerates to a rendezvous:
//! every transfer is a direct handoff.

use crate::core::layout;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel::{alloc_slot, KernelState, KSTATE};
use crate::task::wait::{complete_wait, WaitOrder};
use crate::task::{Outcome, WaitInfo};
use crate::types::{DataQueueId, OsTick};

/// Data queue control block: head/count ring over caller memory
pub(crate) struct DataQueueCb {
    pub(crate) buf: *mut u32,
    pub(crate) capacity: usize,
    pub(crate) head: usize,
    pub(crate) count: usize,
}

impl DataQueueCb {
    pub(crate) const fn new() -> Self {
        DataQueueCb {
            buf: core::ptr::null_mut(),
            capacity: 0,
            head: 0,
            count: 0,
        }
    }

    /// Append at the tail. Caller has checked `count < capacity`.
    #[inline]
    fn push(&mut self, word: u32) {
        let idx = (self.head + self.count) % self.capacity;
        // The ring buffer is exclusively owned since creation.
        unsafe { self.buf.add(idx).write(word) };
        self.count += 1;
    }

    /// Take from the head. Caller has checked `count > 0`.
    #[inline]
    fn pop(&mut self) -> u32 {
        let word = unsafe { self.buf.add(self.head).read() };
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        word
    }
}

impl KernelState {
    /// Create a data queue over caller-supplied ring memory. An empty
    /// slice is allowed and makes every transfer synchronous.
    pub fn dataq_create(&mut self, storage: &'static mut [u32]) -> OsResult<DataQueueId> {
        let q = alloc_slot(&mut self.dataqs).ok_or(OsError::NoMemory)?;
        self.dataqs[q as usize].cb = DataQueueCb {
            buf: storage.as_mut_ptr(),
            capacity: storage.len(),
            head: 0,
            count: 0,
        };
        Ok(DataQueueId {
            index: q,
            gen: self.dataqs[q as usize].gen,
        })
    }

    /// Send one word: hand it to a blocked receiver, append it to the
    /// ring, or park the caller on the full queue.
    pub fn dataq_put(&mut self, id: DataQueueId, word: u32, timeout: OsTick) -> OsResult<Outcome<()>> {
        let q = self.check_dataq(id)?;
        self.dataq_put_at(q, word, timeout)
    }

    pub(crate) fn dataq_put_at(&mut self, q: u8, word: u32, timeout: OsTick) -> OsResult<Outcome<()>> {
        if let Some(n) = self.nodes.first(layout::dataq_recv_head(q)) {
            debug_assert!(self.dataqs[q as usize].cb.count == 0);
            let w = layout::sched_owner(n);
            if let WaitInfo::DataRecv { word: wword, .. } = &mut self.tcb_mut(w).winfo {
                *wword = word;
            }
            self.wait_finish(w, Ok(()));
            return Ok(Outcome::Done(()));
        }

        {
            let cb = &mut self.dataqs[q as usize].cb;
            if cb.count < cb.capacity {
                cb.push(word);
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
            WaitInfo::DataSend { dataq: q, word },
            Some(layout::dataq_send_head(q)),
            WaitOrder::Priority,
            timeout,
        );
        Ok(Outcome::Blocked)
    }

    /// Receive one word in FIFO order, refilling the ring from a blocked
    /// sender when one is queued.
    pub fn dataq_get(&mut self, id: DataQueueId, timeout: OsTick) -> OsResult<Outcome<u32>> {
        let q = self.check_dataq(id)?;
        self.dataq_get_at(q, timeout)
    }

    pub(crate) fn dataq_get_at(&mut self, q: u8, timeout: OsTick) -> OsResult<Outcome<u32>> {
        if self.dataqs[q as usize].cb.count > 0 {
            let word = self.dataqs[q as usize].cb.pop();
            if let Some(n) = self.nodes.first(layout::dataq_send_head(q)) {
                let w = layout::sched_owner(n);
                if let WaitInfo::DataSend { word: sword, .. } = self.tcb(w).winfo {
                    self.dataqs[q as usize].cb.push(sword);
                    self.wait_finish(w, Ok(()));
                }
            }
            return Ok(Outcome::Done(word));
        }

        // Rendezvous path of a zero-capacity queue.
        if let Some(n) = self.nodes.first(layout::dataq_send_head(q)) {
            let w = layout::sched_owner(n);
            if let WaitInfo::DataSend { word: sword, .. } = self.tcb(w).winfo {
                self.wait_finish(w, Ok(()));
                return Ok(Outcome::Done(sword));
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
            WaitInfo::DataRecv { dataq: q, word: 0 },
            Some(layout::dataq_recv_head(q)),
            WaitOrder::Priority,
            timeout,
        );
        Ok(Outcome::Blocked)
    }

    /// Words currently buffered.
    pub fn dataq_count(&self, id: DataQueueId) -> OsResult<usize> {
        let q = self.check_dataq(id)?;
        Ok(self.dataqs[q as usize].cb.count)
    }
}

// ============ Public API ============

/// Create a data queue over `storage`.
pub fn os_dataq_create(storage: &'static mut [u32]) -> OsResult<DataQueueId> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| KSTATE.get(cs).dataq_create(storage))
}

/// Send one word. ISR-callable with zero timeout.
pub fn os_dataq_put(id: DataQueueId, word: u32, timeout: OsTick) -> OsResult<()> {
    if is_isr_context() && timeout != 0 {
        return Err(OsError::Isr);
    }
    let outcome = critical_section(|cs| KSTATE.get(cs).dataq_put(id, word, timeout))?;
    match outcome {
        Outcome::Done(()) => Ok(()),
        Outcome::Blocked => complete_wait(|_| ()),
    }
}

/// Receive one word in FIFO order.
pub fn os_dataq_get(id: DataQueueId, timeout: OsTick) -> OsResult<u32> {
    if is_isr_context() && timeout != 0 {
        return Err(OsError::Isr);
    }
    let outcome = critical_section(|cs| KSTATE.get(cs).dataq_get(id, timeout))?;
    match outcome {
        Outcome::Done(word) => Ok(word),
        Outcome::Blocked => complete_wait(|winfo| match winfo {
            WaitInfo::DataRecv { word, .. } => *word,
            _ => 0,
        }),
    }
}

/// Words currently buffered.
pub fn os_dataq_count(id: DataQueueId) -> OsResult<usize> {
    critical_section(|cs| KSTATE.get(cs).dataq_count(id))
}

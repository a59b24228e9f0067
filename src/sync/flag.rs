//! Event flags
//!
//! A 31-bit mask per group. Setting bits wakes every waiter whose
//! condition just became satisfied, consuming the matched bits unless the
//! waiter asked otherwise. The top bit of the mask is the error marker of
//! the raw trap ABI and never carries a flag.

use crate::core::layout;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel::{alloc_slot, KernelState, KSTATE};
use crate::task::wait::{complete_wait, WaitOrder};
use crate::task::{Outcome, WaitInfo};
use crate::types::opt::{FLAG_NO_CLEAR, FLAG_WAIT_ALL};
use crate::types::{FlagId, OsFlags, OsOpt, OsTick};

/// Bits a pattern may use
pub const FLAG_VALID_MASK: OsFlags = 0x7FFF_FFFF;

/// Event flag group control block
pub(crate) struct FlagCb {
    pub(crate) flags: OsFlags,
}

impl FlagCb {
    pub(crate) const fn new() -> Self {
        FlagCb { flags: 0 }
    }
}

/// A wait is satisfied by a full match (wait-all) or any overlap
/// (wait-any).
#[inline]
fn satisfied(flags: OsFlags, pattern: OsFlags, opt: OsOpt) -> bool {
    if opt & FLAG_WAIT_ALL != 0 {
        flags & pattern == pattern
    } else {
        flags & pattern != 0
    }
}

impl KernelState {
    /// Create an event flag group with an initial mask.
    pub fn flag_create(&mut self, initial: OsFlags) -> OsResult<FlagId> {
        if initial & !FLAG_VALID_MASK != 0 {
            return Err(OsError::Param);
        }
        let f = alloc_slot(&mut self.flags).ok_or(OsError::NoMemory)?;
        self.flags[f as usize].cb = FlagCb { flags: initial };
        Ok(FlagId {
            index: f,
            gen: self.flags[f as usize].gen,
        })
    }

    /// OR bits into the mask and wake every waiter whose condition now
    /// holds. Waiters are scanned in arrival order; a consuming waiter
    /// clears its matched bits before the next one is evaluated.
    pub fn flag_set(&mut self, id: FlagId, pattern: OsFlags) -> OsResult<OsFlags> {
        let f = self.check_flag(id)?;
        self.flag_set_at(f, pattern)
    }

    pub(crate) fn flag_set_at(&mut self, f: u8, pattern: OsFlags) -> OsResult<OsFlags> {
        if pattern & !FLAG_VALID_MASK != 0 {
            return Err(OsError::Param);
        }
        self.flags[f as usize].cb.flags |= pattern;

        let head = layout::flag_wait_head(f);
        let mut cursor = self.nodes.first(head);
        while let Some(node) = cursor {
            let next = self.nodes.next(node);
            let t = layout::sched_owner(node);

            let flags = self.flags[f as usize].cb.flags;
            if let WaitInfo::Flag {
                flag,
                pattern: wanted,
                opt,
                ..
            } = self.tcb(t).winfo
            {
                debug_assert!(flag == f);
                if satisfied(flags, wanted, opt) {
                    if let WaitInfo::Flag { matched, .. } = &mut self.tcb_mut(t).winfo {
                        *matched = flags;
                    }
                    if opt & FLAG_NO_CLEAR == 0 {
                        self.flags[f as usize].cb.flags &= !(flags & wanted);
                    }
                    self.wait_finish(t, Ok(()));
                }
            }

            cursor = if next == head { None } else { Some(next) };
        }
        Ok(self.flags[f as usize].cb.flags)
    }

    /// Clear bits unconditionally, returning the prior mask.
    pub fn flag_clear(&mut self, id: FlagId, pattern: OsFlags) -> OsResult<OsFlags> {
        if pattern & !FLAG_VALID_MASK != 0 {
            return Err(OsError::Param);
        }
        let f = self.check_flag(id)?;
        let cb = &mut self.flags[f as usize].cb;
        let prior = cb.flags;
        cb.flags &= !pattern;
        Ok(prior)
    }

    /// Current mask.
    pub fn flag_get(&self, id: FlagId) -> OsResult<OsFlags> {
        let f = self.check_flag(id)?;
        Ok(self.flags[f as usize].cb.flags)
    }

    /// Wait until the pattern is satisfied. Returns the mask observed at
    /// satisfaction time, before any consumption.
    pub fn flag_wait(
        &mut self,
        id: FlagId,
        pattern: OsFlags,
        opt: OsOpt,
        timeout: OsTick,
    ) -> OsResult<Outcome<OsFlags>> {
        if pattern == 0 || pattern & !FLAG_VALID_MASK != 0 {
            return Err(OsError::Param);
        }
        let f = self.check_flag(id)?;

        let flags = self.flags[f as usize].cb.flags;
        if satisfied(flags, pattern, opt) {
            if opt & FLAG_NO_CLEAR == 0 {
                self.flags[f as usize].cb.flags &= !(flags & pattern);
            }
            return Ok(Outcome::Done(flags));
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
            WaitInfo::Flag {
                flag: f,
                pattern,
                opt,
                matched: 0,
            },
            Some(layout::flag_wait_head(f)),
            WaitOrder::Fifo,
            timeout,
        );
        Ok(Outcome::Blocked)
    }
}

// ============ Public API ============

/// Create an event flag group.
pub fn os_flag_create(initial: OsFlags) -> OsResult<FlagId> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| KSTATE.get(cs).flag_create(initial))
}

/// Set bits in the group and wake satisfied waiters. ISR-callable.
/// Returns the mask left after consumption.
pub fn os_flag_set(id: FlagId, pattern: OsFlags) -> OsResult<OsFlags> {
    critical_section(|cs| KSTATE.get(cs).flag_set(id, pattern))
}

/// Clear bits, returning the mask as it was before.
pub fn os_flag_clear(id: FlagId, pattern: OsFlags) -> OsResult<OsFlags> {
    critical_section(|cs| KSTATE.get(cs).flag_clear(id, pattern))
}

/// Read the current mask.
pub fn os_flag_get(id: FlagId) -> OsResult<OsFlags> {
    critical_section(|cs| KSTATE.get(cs).flag_get(id))
}

/// Wait for a flag pattern.
///
/// `opt` selects wait-any/wait-all and whether the matched bits are left
/// in place. Returns the mask observed when the wait was satisfied. A
/// wait-all condition only completes when all bits are set at the same
/// instant; bits set and cleared sequentially do not accumulate.
pub fn os_flag_wait(
    id: FlagId,
    pattern: OsFlags,
    opt: OsOpt,
    timeout: OsTick,
) -> OsResult<OsFlags> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    let outcome = critical_section(|cs| KSTATE.get(cs).flag_wait(id, pattern, opt, timeout))?;
    match outcome {
        Outcome::Done(flags) => Ok(flags),
        Outcome::Blocked => complete_wait(|winfo| match winfo {
            WaitInfo::Flag { matched, .. } => *matched,
            _ => 0,
        }),
    }
}

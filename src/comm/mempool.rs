//! Fixed-block memory pool
//!
//! A caller-supplied arena sliced into equal blocks. Free blocks thread a
//! singly-linked free list through their own first word (stored as a
//! block index, written unaligned so the arena needs no particular
//! alignment). Every block is either on the free list exactly once or
//! held by exactly one caller; a double free is a programming error the
//! pool does not try to recover from.

use core::ptr::NonNull;

use crate::core::layout;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel::{alloc_slot, KernelState, KSTATE};
use crate::task::wait::{complete_wait, WaitOrder};
use crate::task::{Outcome, WaitInfo};
use crate::types::{MemPoolId, OsTick};

/// End-of-free-list marker
const POOL_NONE: u16 = u16::MAX;

/// Memory pool control block
pub(crate) struct MemPoolCb {
    pub(crate) base: *mut u8,
    pub(crate) blk_size: usize,
    pub(crate) blk_count: u16,
    pub(crate) free_head: u16,
    pub(crate) free_count: u16,
}

impl MemPoolCb {
    pub(crate) const fn new() -> Self {
        MemPoolCb {
            base: core::ptr::null_mut(),
            blk_size: 0,
            blk_count: 0,
            free_head: POOL_NONE,
            free_count: 0,
        }
    }

    #[inline]
    fn block_ptr(&self, blk: u16) -> *mut u8 {
        unsafe { self.base.add(blk as usize * self.blk_size) }
    }

    /// Read the free-list link stored in a free block's first word.
    #[inline]
    fn link_of(&self, blk: u16) -> u16 {
        unsafe { (self.block_ptr(blk) as *mut u32).read_unaligned() as u16 }
    }

    /// Store a free-list link into a block's first word.
    #[inline]
    fn set_link(&mut self, blk: u16, next: u16) {
        unsafe { (self.block_ptr(blk) as *mut u32).write_unaligned(next as u32) };
    }
}

impl KernelState {
    /// Create a pool of `blk_count` blocks of `blk_size` bytes over the
    /// caller's arena. Blocks must be able to hold the free-list word.
    pub fn mempool_create(
        &mut self,
        blk_size: usize,
        blk_count: usize,
        arena: &'static mut [u8],
    ) -> OsResult<MemPoolId> {
        if blk_size < core::mem::size_of::<u32>() || blk_count == 0 {
            return Err(OsError::Param);
        }
        if blk_count >= POOL_NONE as usize || arena.len() < blk_size * blk_count {
            return Err(OsError::Param);
        }
        let p = alloc_slot(&mut self.pools).ok_or(OsError::NoMemory)?;
        let mut cb = MemPoolCb {
            base: arena.as_mut_ptr(),
            blk_size,
            blk_count: blk_count as u16,
            free_head: 0,
            free_count: blk_count as u16,
        };
        for blk in 0..blk_count as u16 {
            let next = if blk + 1 == blk_count as u16 {
                POOL_NONE
            } else {
                blk + 1
            };
            cb.set_link(blk, next);
        }
        self.pools[p as usize].cb = cb;
        Ok(MemPoolId {
            index: p,
            gen: self.pools[p as usize].gen,
        })
    }

    /// Pop the free-list head, or park the caller until a block comes
    /// back.
    pub fn mempool_alloc(&mut self, id: MemPoolId, timeout: OsTick) -> OsResult<Outcome<NonNull<u8>>> {
        let p = self.check_pool(id)?;
        self.mempool_alloc_at(p, timeout)
    }

    pub(crate) fn mempool_alloc_at(&mut self, p: u8, timeout: OsTick) -> OsResult<Outcome<NonNull<u8>>> {
        {
            let cb = &mut self.pools[p as usize].cb;
            if cb.free_head != POOL_NONE {
                let blk = cb.free_head;
                cb.free_head = cb.link_of(blk);
                cb.free_count -= 1;
                let ptr = cb.block_ptr(blk);
                return Ok(Outcome::Done(
                    NonNull::new(ptr).ok_or(OsError::Error)?,
                ));
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
            WaitInfo::PoolAlloc {
                pool: p,
                block: core::ptr::null_mut(),
            },
            Some(layout::pool_wait_head(p)),
            WaitOrder::Fifo,
            timeout,
        );
        Ok(Outcome::Blocked)
    }

    /// Return a block. A waiter, if any, receives the block directly;
    /// otherwise it rejoins the free list.
    pub fn mempool_free(&mut self, id: MemPoolId, ptr: NonNull<u8>) -> OsResult<()> {
        let p = self.check_pool(id)?;
        self.mempool_free_at(p, ptr)
    }

    pub(crate) fn mempool_free_at(&mut self, p: u8, ptr: NonNull<u8>) -> OsResult<()> {
        let blk = {
            let cb = &self.pools[p as usize].cb;
            let offset = (ptr.as_ptr() as usize).wrapping_sub(cb.base as usize);
            if offset % cb.blk_size != 0 {
                return Err(OsError::Param);
            }
            let blk = offset / cb.blk_size;
            if blk >= cb.blk_count as usize {
                return Err(OsError::Param);
            }
            blk as u16
        };

        if let Some(n) = self.nodes.first(layout::pool_wait_head(p)) {
            let w = layout::sched_owner(n);
            if let WaitInfo::PoolAlloc { block, .. } = &mut self.tcb_mut(w).winfo {
                *block = ptr.as_ptr();
            }
            self.wait_finish(w, Ok(()));
            return Ok(());
        }

        let cb = &mut self.pools[p as usize].cb;
        let head = cb.free_head;
        cb.set_link(blk, head);
        cb.free_head = blk;
        cb.free_count += 1;
        Ok(())
    }

    /// Free blocks remaining.
    pub fn mempool_free_count(&self, id: MemPoolId) -> OsResult<usize> {
        let p = self.check_pool(id)?;
        Ok(self.pools[p as usize].cb.free_count as usize)
    }
}

// ============ Public API ============

/// Create a memory pool over `arena`.
pub fn os_mempool_create(
    blk_size: usize,
    blk_count: usize,
    arena: &'static mut [u8],
) -> OsResult<MemPoolId> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }
    critical_section(|cs| KSTATE.get(cs).mempool_create(blk_size, blk_count, arena))
}

/// Allocate one block, blocking per `timeout` when the pool is empty.
pub fn os_mempool_alloc(id: MemPoolId, timeout: OsTick) -> OsResult<NonNull<u8>> {
    if is_isr_context() && timeout != 0 {
        return Err(OsError::Isr);
    }
    let outcome = critical_section(|cs| KSTATE.get(cs).mempool_alloc(id, timeout))?;
    match outcome {
        Outcome::Done(ptr) => Ok(ptr),
        Outcome::Blocked => {
            let ptr = complete_wait(|winfo| match winfo {
                WaitInfo::PoolAlloc { block, .. } => *block,
                _ => core::ptr::null_mut(),
            })?;
            NonNull::new(ptr).ok_or(OsError::Error)
        }
    }
}

/// Return a block to its pool. ISR-callable. Freeing an address that is
/// not a block of this pool is a parameter error.
pub fn os_mempool_free(id: MemPoolId, ptr: NonNull<u8>) -> OsResult<()> {
    critical_section(|cs| KSTATE.get(cs).mempool_free(id, ptr))
}

/// Free blocks remaining in the pool.
pub fn os_mempool_free_count(id: MemPoolId) -> OsResult<usize> {
    critical_section(|cs| KSTATE.get(cs).mempool_free_count(id))
}

//! Critical section handling
//!
//! The single global critical section that makes kernel operations atomic.
//! On hardware it is realized as interrupt masking; nesting is tracked so
//! interrupts are only re-enabled when the outermost guard drops. No kernel
//! operation blocks while inside it.

use core::sync::atomic::{AtomicU8, Ordering};

/// Critical section nesting depth
static NESTING: AtomicU8 = AtomicU8::new(0);

/// RAII guard for the kernel critical section
///
/// Interrupts are disabled while at least one guard is alive and restored
/// when the last one drops.
pub struct CriticalSection {
    _private: (),
}

impl CriticalSection {
    /// Enter the critical section.
    #[inline(always)]
    pub fn enter() -> Self {
        #[cfg(target_arch = "arm")]
        cortex_m::interrupt::disable();

        NESTING.fetch_add(1, Ordering::Acquire);
        CriticalSection { _private: () }
    }

    /// Check whether any guard is currently alive.
    #[inline(always)]
    pub fn is_active() -> bool {
        NESTING.load(Ordering::Acquire) > 0
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        let prev = NESTING.fetch_sub(1, Ordering::Release);

        #[cfg(target_arch = "arm")]
        if prev == 1 {
            unsafe { cortex_m::interrupt::enable() };
        }
        #[cfg(not(target_arch = "arm"))]
        let _ = prev;
    }
}

/// Execute a closure with the critical section held.
///
/// The guard reference gates access to [`crate::core::cs_cell::CsCell`]
/// protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Check if currently executing in an interrupt handler.
///
/// On ARM this reads IPSR; on the host it falls back to the kernel's
/// interrupt nesting counter so tests can simulate ISR context.
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }

    #[cfg(not(target_arch = "arm"))]
    {
        crate::kernel::KERNEL.int_nesting() > 0
    }
}

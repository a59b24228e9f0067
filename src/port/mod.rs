//! Port layer - CPU-specific implementations
//!
//! The narrow interface the portable kernel needs from the hardware:
//! critical-section masking (see `core::critical`), the initial stack
//! frame, the deferred context-switch request, the synchronous trap, and
//! the periodic tick source.

pub mod abi;

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(target_arch = "arm")]
pub use cortex_m4::*;

// Stub implementation for non-ARM targets (host tests). Context switches
// are requested but never performed; tests drive `KernelState::dispatch`
// directly.
#[cfg(not(target_arch = "arm"))]
mod stub {
    use crate::types::{OsStkElement, OsTaskFn};

    /// Build the initial frame of a task.
    ///
    /// # Safety
    /// The stack region must be writable and exclusively owned.
    pub unsafe fn stack_frame_init(
        _entry: OsTaskFn,
        _arg: *mut (),
        stk_base: *mut OsStkElement,
        stk_size: usize,
    ) -> *mut OsStkElement {
        unsafe { stk_base.add(stk_size) }
    }

    /// Request a deferred context switch.
    pub fn request_ctx_sw() {}

    /// Hand the CPU to the first task.
    pub fn start_first_task() {}

    /// Program the periodic tick source.
    pub fn systick_init(_tick_hz: u32) {}

    /// Wait for the next event.
    pub fn cpu_idle() {
        core::hint::spin_loop();
    }
}

#[cfg(not(target_arch = "arm"))]
pub use stub::*;

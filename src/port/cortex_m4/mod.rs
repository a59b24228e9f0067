//! Cortex-M4 port
//!
//! Context switching via the PendSV exception, kernel entry via SVC, and
//! the SysTick tick source. This is the only inline-assembly code in the
//! tree; the portable kernel never sees a register.

#![allow(named_asm_labels)]

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;

use crate::types::{OsStkElement, OsTaskFn};

/// Dedicated MSP stack for exception handling
#[no_mangle]
static mut INTERRUPT_STACK: [u64; 256] = [0; 256];

/// Core clock the SysTick reload is derived from
const CORE_CLOCK_HZ: u32 = 16_000_000;

/// Program SysTick for the configured tick rate.
pub fn systick_init(tick_hz: u32) {
    let mut p = unsafe { cortex_m::Peripherals::steal() };
    let reload = CORE_CLOCK_HZ / tick_hz;

    p.SYST.set_reload(reload - 1);
    p.SYST.clear_current();
    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
}

/// Hand the CPU to the first ready task.
///
/// PendSV and SysTick drop to the lowest exception priority so the switch
/// only ever runs when no other handler's state is in flux; the first
/// PendSV finds no outgoing context and simply restores the incoming one.
pub fn start_first_task() {
    unsafe {
        let mut scb = cortex_m::Peripherals::steal().SCB;
        scb.set_priority(SystemHandler::PendSV, 0xF0);
        scb.set_priority(SystemHandler::SysTick, 0xF0);
        scb.set_priority(SystemHandler::SVCall, 0x00);

        // Exceptions run on a dedicated MSP stack from here on.
        let msp_top =
            &raw const INTERRUPT_STACK as u32 + core::mem::size_of::<[u64; 256]>() as u32;
        asm!("msr msp, {0}", in(reg) msp_top);
        asm!("msr psp, {0}", in(reg) 0);

        cortex_m::interrupt::enable();
        cortex_m::peripheral::SCB::set_pendsv();
    }
}

/// Request a deferred context switch. Safe from task and interrupt
/// context; the switch happens when no higher-priority handler is active.
#[inline(always)]
pub fn request_ctx_sw() {
    cortex_m::peripheral::SCB::set_pendsv();
}

/// Let the core sleep until the next interrupt.
#[inline(always)]
pub fn cpu_idle() {
    cortex_m::asm::wfi();
}

/// Initial frame layout, matching what PendSV saves and restores
#[repr(C, align(4))]
struct InitialFrame {
    r4: u32,
    r5: u32,
    r6: u32,
    r7: u32,
    r8: u32,
    r9: u32,
    r10: u32,
    r11: u32,
    exc_return: u32,
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}

const FRAME_WORDS: usize = 17;

/// Build the initial register frame of a task on its own stack.
///
/// # Safety
/// The stack region must be writable and exclusively owned by the task.
pub unsafe fn stack_frame_init(
    entry: OsTaskFn,
    arg: *mut (),
    stk_base: *mut OsStkElement,
    stk_size: usize,
) -> *mut OsStkElement {
    unsafe {
        let stk_top = stk_base.add(stk_size);
        let stk_aligned = ((stk_top as usize) & !7) as *mut u32;

        let frame = stk_aligned.sub(FRAME_WORDS) as *mut InitialFrame;
        (*frame) = InitialFrame {
            r4: 0,
            r5: 0,
            r6: 0,
            r7: 0,
            r8: 0,
            r9: 0,
            r10: 0,
            r11: 0,
            exc_return: 0xFFFF_FFFD,
            r0: arg as u32,
            r1: 0,
            r2: 0,
            r3: 0,
            r12: 0,
            lr: task_return as *const () as u32,
            pc: (entry as usize as u32) | 1,
            xpsr: 0x0100_0000,
        };

        // One word below the frame to pair with PendSV's "add r0, r0, #4".
        (frame as *mut u32).sub(1) as *mut OsStkElement
    }
}

/// Called by PendSV with the outgoing PSP; returns the incoming one.
#[inline(never)]
#[no_mangle]
unsafe extern "C" fn pendsv_switch_context(cur_sp: *mut u32) -> *mut u32 {
    unsafe { crate::kernel::switch_context(cur_sp) }
}

/// PendSV exception: the deferred context switch.
///
/// 1. Save R4-R11, LR onto the outgoing task's PSP (skipped on the first
///    switch, when PSP is still zero)
/// 2. Commit the dispatch decision
/// 3. Restore R4-R11, LR from the incoming task's stack
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "dsb",
        "isb",
        "mrs r0, psp",
        "cbz r0, 1f",
        "stmdb r0!, {{r4-r11, lr}}",
        "sub r0, r0, #4",
        "1:",
        "bl pendsv_switch_context",
        "cbz r0, 2f",
        "add r0, r0, #4",
        "ldmia r0!, {{r4-r11, lr}}",
        "msr psp, r0",
        "2:",
        "cpsie i",
        "dsb",
        "isb",
        "bx lr",
    );
}

/// Rust side of the SVC trap: decode the stacked frame and run the call.
///
/// Convention: selector in R12, arguments in R0-R3, result back in the
/// stacked R0.
#[no_mangle]
unsafe extern "C" fn svcall_rust(frame: *mut u32) {
    unsafe {
        let args = [
            frame.read(),
            frame.add(1).read(),
            frame.add(2).read(),
            frame.add(3).read(),
        ];
        let selector = frame.add(4).read();
        frame.write(crate::port::abi::dispatch(selector, args));
    }
}

/// SVCall exception: synchronous kernel entry.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn SVCall() {
    naked_asm!(
        "tst lr, #4",
        "ite eq",
        "mrseq r0, msp",
        "mrsne r0, psp",
        "b svcall_rust",
    );
}

/// Issue a kernel trap from unprivileged code.
#[inline(always)]
pub fn svc_call(selector: u32, args: [u32; 4]) -> u32 {
    let mut a0 = args[0];
    unsafe {
        asm!(
            "svc #0",
            inout("r0") a0,
            in("r1") args[1],
            in("r2") args[2],
            in("r3") args[3],
            in("r12") selector,
            options(nostack),
        );
    }
    a0
}

/// Landing pad for a task entry that returns despite the signature.
#[no_mangle]
fn task_return() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

//! Priority inversion demo - mutex priority inheritance
//!
//! Three tasks: High(20), Med(15), Low(10).
//! Low holds the mutex, High waits on it, and inheritance boosts Low past
//! Med so the wait stays short.

#![no_std]
#![no_main]
#![allow(static_mut_refs)]

use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use kestrel::types::attr::MUTEX_INHERIT;
use kestrel::types::{MutexId, OsStkElement, WAIT_FOREVER};
use kestrel::{os_delay, os_mutex_acquire, os_mutex_create, os_mutex_release, os_task_spawn, OsConfig};

static HIGH_RUNS: AtomicU32 = AtomicU32::new(0);
static LOW_RUNS: AtomicU32 = AtomicU32::new(0);

static MUTEX: AtomicU32 = AtomicU32::new(0);

static mut HIGH_STK: [OsStkElement; 256] = [0; 256];
static mut MED_STK: [OsStkElement; 256] = [0; 256];
static mut LOW_STK: [OsStkElement; 256] = [0; 256];

fn mutex() -> MutexId {
    MutexId::from_raw(MUTEX.load(Ordering::Relaxed))
}

/// High priority task (20)
fn high_task(_: *mut ()) -> ! {
    let _ = os_delay(50);

    loop {
        let n = HIGH_RUNS.fetch_add(1, Ordering::Relaxed) + 1;

        let _ = os_mutex_acquire(mutex(), WAIT_FOREVER);
        kestrel::info!("[HIGH] acquired #{}", n);
        for _ in 0..1_000 {
            cortex_m::asm::nop();
        }
        let _ = os_mutex_release(mutex());

        let _ = os_delay(100);
    }
}

/// Medium priority task (15), CPU bound
fn med_task(_: *mut ()) -> ! {
    loop {
        for _ in 0..50_000 {
            cortex_m::asm::nop();
        }
        let _ = os_delay(10);
    }
}

/// Low priority task (10), holds the mutex for a long stretch
fn low_task(_: *mut ()) -> ! {
    loop {
        let n = LOW_RUNS.fetch_add(1, Ordering::Relaxed) + 1;

        let _ = os_mutex_acquire(mutex(), WAIT_FOREVER);
        kestrel::info!("[LOW] holding #{}", n);
        for _ in 0..100_000 {
            cortex_m::asm::nop();
        }
        let _ = os_mutex_release(mutex());

        let _ = os_delay(200);
    }
}

#[entry]
fn main() -> ! {
    kestrel::info!("priority inversion demo: H(20) M(15) L(10)");

    kestrel::os_init(OsConfig::new()).expect("OS init failed");

    let m = os_mutex_create(MUTEX_INHERIT).expect("mutex failed");
    MUTEX.store(m.to_raw(), Ordering::Relaxed);

    os_task_spawn("low", low_task, core::ptr::null_mut(), 10, unsafe {
        &mut *addr_of_mut!(LOW_STK)
    })
    .unwrap();
    os_task_spawn("med", med_task, core::ptr::null_mut(), 15, unsafe {
        &mut *addr_of_mut!(MED_STK)
    })
    .unwrap();
    os_task_spawn("high", high_task, core::ptr::null_mut(), 20, unsafe {
        &mut *addr_of_mut!(HIGH_STK)
    })
    .unwrap();

    kestrel::info!("starting kernel");
    kestrel::os_start().expect("OS start failed");

    loop {
        cortex_m::asm::wfi();
    }
}

//! Producer-consumer demo over a data queue

#![no_std]
#![no_main]
#![allow(static_mut_refs)]

use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use kestrel::types::{DataQueueId, OsStkElement, WAIT_FOREVER};
use kestrel::{os_dataq_create, os_dataq_get, os_dataq_put, os_delay, os_task_spawn, OsConfig};

static PRODUCED: AtomicU32 = AtomicU32::new(0);
static CONSUMED: AtomicU32 = AtomicU32::new(0);

/// Queue handle, packed so both tasks can pick it up
static QUEUE: AtomicU32 = AtomicU32::new(0);

static mut QUEUE_RING: [u32; 8] = [0; 8];
static mut PRODUCER_STK: [OsStkElement; 256] = [0; 256];
static mut CONSUMER_STK: [OsStkElement; 256] = [0; 256];

fn queue() -> DataQueueId {
    DataQueueId::from_raw(QUEUE.load(Ordering::Relaxed))
}

fn producer_task(_: *mut ()) -> ! {
    loop {
        let n = PRODUCED.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = os_dataq_put(queue(), n, WAIT_FOREVER);
        kestrel::info!("[P] produced #{}", n);
        let _ = os_delay(200);
    }
}

fn consumer_task(_: *mut ()) -> ! {
    loop {
        let n = os_dataq_get(queue(), WAIT_FOREVER).unwrap_or(0);
        let total = CONSUMED.fetch_add(1, Ordering::Relaxed) + 1;
        kestrel::info!("[C] consumed #{} (total {})", n, total);
    }
}

#[entry]
fn main() -> ! {
    kestrel::info!("producer-consumer demo");

    kestrel::os_init(OsConfig::new()).expect("OS init failed");

    let q = os_dataq_create(unsafe { &mut *addr_of_mut!(QUEUE_RING) }).expect("queue failed");
    QUEUE.store(q.to_raw(), Ordering::Relaxed);

    os_task_spawn(
        "producer",
        producer_task,
        core::ptr::null_mut(),
        15,
        unsafe { &mut *addr_of_mut!(PRODUCER_STK) },
    )
    .expect("producer failed");

    os_task_spawn(
        "consumer",
        consumer_task,
        core::ptr::null_mut(),
        10,
        unsafe { &mut *addr_of_mut!(CONSUMER_STK) },
    )
    .expect("consumer failed");

    kestrel::info!("starting kernel");
    kestrel::os_start().expect("OS start failed");

    loop {
        cortex_m::asm::wfi();
    }
}

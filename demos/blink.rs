//! Blink demo - LED blinking on STM32F401

#![no_std]
#![no_main]
#![allow(static_mut_refs)]

use core::ptr::addr_of_mut;

use cortex_m_rt::entry;
use kestrel::types::OsStkElement;
use kestrel::{os_delay, os_task_spawn, OsConfig};

use stm32_metapac as pac;

// ============ Task Storage ============

static mut BLINK_STK: [OsStkElement; 512] = [0; 512];
static mut STATUS_STK: [OsStkElement; 512] = [0; 512];

// ============ LED Control ============

fn led_init() {
    pac::RCC.ahb1enr().modify(|w| w.set_gpioaen(true));
    pac::GPIOA
        .moder()
        .modify(|w| w.set_moder(5, pac::gpio::vals::Moder::OUTPUT));
    pac::GPIOA
        .otyper()
        .modify(|w| w.set_ot(5, pac::gpio::vals::Ot::PUSHPULL));
}

fn led_on() {
    pac::GPIOA.bsrr().write(|w| w.set_bs(5, true));
}

fn led_off() {
    pac::GPIOA.bsrr().write(|w| w.set_br(5, true));
}

// ============ Tasks ============

fn blink_task(_: *mut ()) -> ! {
    kestrel::info!("blink task started");
    loop {
        led_on();
        let _ = os_delay(500);
        led_off();
        let _ = os_delay(500);
    }
}

fn status_task(_: *mut ()) -> ! {
    loop {
        kestrel::info!("tick {}", kestrel::os_tick_count());
        let _ = os_delay(1000);
    }
}

// ============ Main ============

#[entry]
fn main() -> ! {
    led_init();

    kestrel::os_init(OsConfig::new()).expect("OS init failed");

    os_task_spawn("blink", blink_task, core::ptr::null_mut(), 10, unsafe {
        &mut *addr_of_mut!(BLINK_STK)
    })
    .expect("blink task failed");

    os_task_spawn("status", status_task, core::ptr::null_mut(), 10, unsafe {
        &mut *addr_of_mut!(STATUS_STK)
    })
    .expect("status task failed");

    kestrel::info!("starting kernel");
    kestrel::os_start().expect("OS start failed");

    loop {
        cortex_m::asm::nop();
    }
}

//! Software timer and timeout tests

use kestrel::types::{OsStkElement, OsTaskState, OsTimerKind, TaskId};
use kestrel::{KernelState, OsConfig, OsError, Outcome};

fn stack() -> &'static mut [OsStkElement] {
    Box::leak(vec![0u32; 256].into_boxed_slice())
}

fn noop(_: *mut ()) -> ! {
    loop {
        std::hint::spin_loop();
    }
}

fn kernel() -> KernelState {
    let mut k = KernelState::new();
    k.init(OsConfig::new()).unwrap();
    k
}

fn spawn(k: &mut KernelState, name: &'static str, prio: u8) -> TaskId {
    k.spawn(name, noop, core::ptr::null_mut(), prio, stack()).unwrap()
}

fn bump(arg: *mut ()) {
    // The argument is a leaked counter owned by the test.
    unsafe { *(arg as *mut u32) += 1 };
}

fn counter() -> *mut u32 {
    Box::leak(Box::new(0u32)) as *mut u32
}

/// Run the timer task's collection loop once, as the timer task would
/// after being signalled.
fn drain(k: &mut KernelState) -> u32 {
    let mut fired = 0;
    while let Some((func, arg)) = k.timer_collect_due() {
        func(arg);
        fired += 1;
    }
    fired
}

#[test]
fn one_shot_fires_once() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let hits = counter();
    let timer = k
        .timer_create(OsTimerKind::OneShot, 5, bump, hits as *mut ())
        .unwrap();
    k.start().unwrap();
    k.dispatch();

    k.timer_start(timer).unwrap();
    assert!(k.timer_is_active(timer).unwrap());

    for _ in 0..4 {
        k.tick_advance();
        assert_eq!(drain(&mut k), 0);
    }
    k.tick_advance();
    assert_eq!(drain(&mut k), 1);
    assert_eq!(unsafe { *hits }, 1);
    assert!(!k.timer_is_active(timer).unwrap());

    for _ in 0..20 {
        k.tick_advance();
    }
    assert_eq!(drain(&mut k), 0);
}

#[test]
fn periodic_timer_has_zero_drift_under_late_processing() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let hits = counter();
    let timer = k
        .timer_create(OsTimerKind::Periodic, 10, bump, hits as *mut ())
        .unwrap();
    k.start().unwrap();
    k.dispatch();
    k.timer_start(timer).unwrap();

    // The timer task falls behind: 25 ticks pass before it runs.
    for _ in 0..25 {
        k.tick_advance();
    }
    // Catch-up: targets 10 and 20 fire, target 30 stays pending.
    assert_eq!(drain(&mut k), 2);
    assert_eq!(unsafe { *hits }, 2);

    for _ in 0..5 {
        k.tick_advance();
    }
    // Tick 30: re-armed from the previous target, not from "now".
    assert_eq!(drain(&mut k), 1);
    assert_eq!(unsafe { *hits }, 3);

    // Over N periods the fire count tracks elapsed/period exactly.
    for _ in 0..100 {
        k.tick_advance();
    }
    assert_eq!(drain(&mut k), 10);
    assert_eq!(unsafe { *hits }, 13);
}

#[test]
fn stopped_timer_does_not_fire() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let hits = counter();
    let timer = k
        .timer_create(OsTimerKind::Periodic, 3, bump, hits as *mut ())
        .unwrap();
    k.start().unwrap();
    k.dispatch();

    k.timer_start(timer).unwrap();
    k.timer_stop(timer).unwrap();
    assert!(!k.timer_is_active(timer).unwrap());

    for _ in 0..10 {
        k.tick_advance();
    }
    assert_eq!(drain(&mut k), 0);
    assert_eq!(unsafe { *hits }, 0);
}

#[test]
fn restarting_rearms_from_now() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let hits = counter();
    let timer = k
        .timer_create(OsTimerKind::OneShot, 5, bump, hits as *mut ())
        .unwrap();
    k.start().unwrap();
    k.dispatch();

    k.timer_start(timer).unwrap();
    for _ in 0..3 {
        k.tick_advance();
    }
    // Restart at tick 3: new target is 8.
    k.timer_start(timer).unwrap();
    for _ in 0..4 {
        k.tick_advance();
        assert_eq!(drain(&mut k), 0);
    }
    k.tick_advance();
    assert_eq!(drain(&mut k), 1);
}

#[test]
fn timers_fire_in_expiry_order() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let early_hits = counter();
    let late_hits = counter();
    let late = k
        .timer_create(OsTimerKind::OneShot, 9, bump, late_hits as *mut ())
        .unwrap();
    let early = k
        .timer_create(OsTimerKind::OneShot, 4, bump, early_hits as *mut ())
        .unwrap();
    k.start().unwrap();
    k.dispatch();

    k.timer_start(late).unwrap();
    k.timer_start(early).unwrap();

    for _ in 0..4 {
        k.tick_advance();
    }
    drain(&mut k);
    assert_eq!(unsafe { *early_hits }, 1);
    assert_eq!(unsafe { *late_hits }, 0);

    for _ in 0..5 {
        k.tick_advance();
    }
    drain(&mut k);
    assert_eq!(unsafe { *late_hits }, 1);
}

#[test]
fn create_rejects_bad_load() {
    let mut k = kernel();
    assert_eq!(
        k.timer_create(OsTimerKind::OneShot, 0, bump, core::ptr::null_mut())
            .err(),
        Some(OsError::Param)
    );
}

// ============ Wait timeouts ============

#[test]
fn blocked_wait_times_out_with_timeout_status() {
    let mut k = kernel();
    let waiter = spawn(&mut k, "waiter", 10);
    let _main = spawn(&mut k, "main", 5);
    let sem = k.sem_create(0, 1).unwrap();
    k.start().unwrap();

    k.dispatch();
    assert_eq!(k.current(), Some(waiter));
    assert!(matches!(k.sem_acquire(sem, 3).unwrap(), Outcome::Blocked));
    k.dispatch();

    k.tick_advance();
    k.tick_advance();
    assert_eq!(k.task_state(waiter).unwrap(), OsTaskState::Blocked);

    k.tick_advance();
    assert_eq!(k.task_state(waiter).unwrap(), OsTaskState::Ready);
    assert_eq!(k.task_wait_status(waiter).unwrap(), Err(OsError::Timeout));

    // The waiter left the queue: a release lands in the count.
    k.sem_release(sem).unwrap();
    assert_eq!(k.sem_count(sem).unwrap(), 1);
}

#[test]
fn satisfaction_beats_timeout_on_the_same_tick() {
    let mut k = kernel();
    let waiter = spawn(&mut k, "waiter", 10);
    let _main = spawn(&mut k, "main", 5);
    let sem = k.sem_create(0, 1).unwrap();
    k.start().unwrap();

    k.dispatch();
    assert!(matches!(k.sem_acquire(sem, 3).unwrap(), Outcome::Blocked));
    k.dispatch();

    k.tick_advance();
    k.tick_advance();

    // Released just before the timeout tick is processed: the release
    // unlinks the waiter from the delay queue, so the timeout cannot
    // overwrite the completed wait.
    k.sem_release(sem).unwrap();
    k.tick_advance();

    assert_eq!(k.task_state(waiter).unwrap(), OsTaskState::Ready);
    assert!(k.task_wait_status(waiter).unwrap().is_ok());
}

#[test]
fn mutex_wait_timeout_deflates_inherited_priority() {
    use kestrel::types::attr::MUTEX_INHERIT;
    use kestrel::types::WAIT_FOREVER;

    let mut k = kernel();
    let low = spawn(&mut k, "low", 10);
    let high = spawn(&mut k, "high", 20);
    let m = k.mutex_create(MUTEX_INHERIT).unwrap();

    k.task_suspend(high).unwrap();
    k.start().unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(low));
    assert!(matches!(
        k.mutex_acquire(m, WAIT_FOREVER).unwrap(),
        Outcome::Done(())
    ));

    k.task_resume(high).unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(high));
    assert!(matches!(k.mutex_acquire(m, 4).unwrap(), Outcome::Blocked));
    assert_eq!(k.task_prio(low).unwrap(), 20);

    for _ in 0..4 {
        k.tick_advance();
    }
    // Timeout: the waiter departs and the boost ends with it.
    assert_eq!(k.task_wait_status(high).unwrap(), Err(OsError::Timeout));
    assert_eq!(k.task_prio(low).unwrap(), 10);
    assert_eq!(k.mutex_holder(m).unwrap(), Some(low));
}

#[test]
fn delay_queue_orders_multiple_sleepers() {
    let mut k = kernel();
    let slow = spawn(&mut k, "slow", 12);
    let fast = spawn(&mut k, "fast", 11);
    let _main = spawn(&mut k, "main", 5);
    k.start().unwrap();

    k.dispatch();
    assert_eq!(k.current(), Some(slow));
    k.delay(10).unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(fast));
    k.delay(2).unwrap();
    k.dispatch();

    k.tick_advance();
    k.tick_advance();
    assert_eq!(k.task_state(fast).unwrap(), OsTaskState::Ready);
    assert_eq!(k.task_state(slow).unwrap(), OsTaskState::Blocked);

    for _ in 0..8 {
        k.tick_advance();
    }
    assert_eq!(k.task_state(slow).unwrap(), OsTaskState::Ready);
}

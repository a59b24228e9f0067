//! Synchronization and communication primitive tests

use kestrel::types::attr::{MUTEX_INHERIT, MUTEX_RECURSIVE, MUTEX_ROBUST};
use kestrel::types::opt::{FLAG_NO_CLEAR, FLAG_WAIT_ALL, FLAG_WAIT_ANY};
use kestrel::types::{OsStkElement, OsTaskState, TaskId, WAIT_FOREVER};
use kestrel::task::WaitInfo;
use kestrel::{KernelState, OsConfig, OsError, Outcome};

fn stack() -> &'static mut [OsStkElement] {
    Box::leak(vec![0u32; 256].into_boxed_slice())
}

fn bytes(n: usize) -> &'static mut [u8] {
    Box::leak(vec![0u8; n].into_boxed_slice())
}

fn words(n: usize) -> &'static mut [u32] {
    Box::leak(vec![0u32; n].into_boxed_slice())
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

// ============ Semaphore ============

#[test]
fn sem_counts_stay_in_bounds() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    k.start().unwrap();
    k.dispatch();

    let sem = k.sem_create(2, 3).unwrap();
    assert_eq!(k.sem_count(sem).unwrap(), 2);

    assert!(matches!(k.sem_acquire(sem, 0).unwrap(), Outcome::Done(())));
    assert!(matches!(k.sem_acquire(sem, 0).unwrap(), Outcome::Done(())));
    assert_eq!(k.sem_count(sem).unwrap(), 0);

    // Empty + no blocking requested.
    assert_eq!(k.sem_acquire(sem, 0), Err(OsError::NoResource));

    for expected in 1..=3 {
        assert_eq!(k.sem_release(sem).unwrap(), expected);
    }
    assert_eq!(k.sem_release(sem), Err(OsError::SemOverflow));
    assert_eq!(k.sem_count(sem).unwrap(), 3);
}

#[test]
fn sem_create_rejects_bad_parameters() {
    let mut k = kernel();
    assert_eq!(k.sem_create(0, 0), Err(OsError::Param));
    assert_eq!(k.sem_create(4, 3), Err(OsError::Param));
}

#[test]
fn sem_wakes_waiters_in_arrival_order() {
    let mut k = kernel();
    let w1 = spawn(&mut k, "w1", 10);
    let w2 = spawn(&mut k, "w2", 11);
    let _main = spawn(&mut k, "main", 5);
    let sem = k.sem_create(0, 1).unwrap();

    // Hold the higher-priority waiter back so the lower one queues first.
    k.task_suspend(w2).unwrap();
    k.start().unwrap();

    k.dispatch();
    assert_eq!(k.current(), Some(w1));
    assert!(matches!(
        k.sem_acquire(sem, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));

    k.task_resume(w2).unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(w2));
    assert!(matches!(
        k.sem_acquire(sem, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));
    k.dispatch();

    // FIFO: w1 queued first and wins despite w2's higher priority.
    k.sem_release(sem).unwrap();
    assert_eq!(k.task_state(w1).unwrap(), OsTaskState::Ready);
    assert_eq!(k.task_state(w2).unwrap(), OsTaskState::Blocked);
}

#[test]
fn sem_acquire_blocks_iff_count_is_zero() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let sem = k.sem_create(1, 1).unwrap();
    k.start().unwrap();
    k.dispatch();

    assert!(matches!(
        k.sem_acquire(sem, WAIT_FOREVER).unwrap(),
        Outcome::Done(())
    ));
    assert!(matches!(
        k.sem_acquire(sem, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));
}

// ============ Mutex ============

#[test]
fn mutex_release_by_non_holder_is_rejected() {
    let mut k = kernel();
    let a = spawn(&mut k, "a", 10);
    let b = spawn(&mut k, "b", 12);
    let m = k.mutex_create(0).unwrap();
    k.start().unwrap();

    k.dispatch();
    assert_eq!(k.current(), Some(b));
    assert!(matches!(k.mutex_acquire(m, 0).unwrap(), Outcome::Done(())));

    // Switch to a non-holder.
    k.task_suspend(b).unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(a));
    assert_eq!(k.mutex_release(m), Err(OsError::MutexNotOwner));
}

#[test]
fn non_recursive_mutex_rejects_nesting() {
    let mut k = kernel();
    let _a = spawn(&mut k, "a", 10);
    let m = k.mutex_create(0).unwrap();
    k.start().unwrap();
    k.dispatch();

    assert!(matches!(k.mutex_acquire(m, 0).unwrap(), Outcome::Done(())));
    assert_eq!(k.mutex_acquire(m, 0), Err(OsError::MutexNested));
}

#[test]
fn recursive_mutex_needs_matching_releases() {
    let mut k = kernel();
    let holder = spawn(&mut k, "holder", 10);
    let other = spawn(&mut k, "other", 8);
    let m = k.mutex_create(MUTEX_RECURSIVE).unwrap();
    k.start().unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(holder));

    for _ in 0..3 {
        assert!(matches!(k.mutex_acquire(m, 0).unwrap(), Outcome::Done(())));
    }
    k.mutex_release(m).unwrap();
    k.mutex_release(m).unwrap();
    assert_eq!(k.mutex_holder(m).unwrap(), Some(holder));

    // Third release frees it for the other task.
    k.mutex_release(m).unwrap();
    assert_eq!(k.mutex_holder(m).unwrap(), None);

    k.task_suspend(holder).unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(other));
    assert!(matches!(k.mutex_acquire(m, 0).unwrap(), Outcome::Done(())));
}

#[test]
fn mutex_ownership_transfers_to_best_waiter() {
    let mut k = kernel();
    let holder = spawn(&mut k, "holder", 20);
    let mid = spawn(&mut k, "mid", 10);
    let high = spawn(&mut k, "high", 12);
    let m = k.mutex_create(0).unwrap();

    // Queue the lower-priority waiter first.
    k.task_suspend(high).unwrap();
    k.start().unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(holder));
    assert!(matches!(k.mutex_acquire(m, 0).unwrap(), Outcome::Done(())));

    k.task_suspend(holder).unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(mid));
    assert!(matches!(
        k.mutex_acquire(m, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));

    k.task_resume(high).unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(high));
    assert!(matches!(
        k.mutex_acquire(m, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));

    // Holder releases: the higher-priority waiter wins, not the first.
    k.task_resume(holder).unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(holder));
    k.mutex_release(m).unwrap();
    assert_eq!(k.mutex_holder(m).unwrap(), Some(high));
    assert_eq!(k.task_state(high).unwrap(), OsTaskState::Ready);
    assert_eq!(k.task_state(mid).unwrap(), OsTaskState::Blocked);
}

#[test]
fn priority_inheritance_boosts_and_reverts() {
    let mut k = kernel();
    let low = spawn(&mut k, "low", 10);
    let high = spawn(&mut k, "high", 20);
    let m = k.mutex_create(MUTEX_INHERIT).unwrap();

    k.task_suspend(high).unwrap();
    k.start().unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(low));
    assert!(matches!(k.mutex_acquire(m, 0).unwrap(), Outcome::Done(())));

    k.task_resume(high).unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(high));
    assert!(matches!(
        k.mutex_acquire(m, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));

    // Holder runs at its waiter's priority.
    assert_eq!(k.task_prio(low).unwrap(), 20);
    assert_eq!(k.task_base_prio(low).unwrap(), 10);
    k.dispatch();
    assert_eq!(k.current(), Some(low));

    // Release: boost ends, ownership moves, waiter proceeds.
    k.mutex_release(m).unwrap();
    assert_eq!(k.task_prio(low).unwrap(), 10);
    assert_eq!(k.mutex_holder(m).unwrap(), Some(high));
    k.dispatch();
    assert_eq!(k.current(), Some(high));
}

#[test]
fn priority_inheritance_is_transitive() {
    let mut k = kernel();
    let a = spawn(&mut k, "a", 10);
    let b = spawn(&mut k, "b", 12);
    let c = spawn(&mut k, "c", 20);
    let m1 = k.mutex_create(MUTEX_INHERIT).unwrap();
    let m2 = k.mutex_create(MUTEX_INHERIT).unwrap();

    k.task_suspend(c).unwrap();
    k.start().unwrap();

    // b takes m2, then sleeps.
    k.dispatch();
    assert_eq!(k.current(), Some(b));
    assert!(matches!(k.mutex_acquire(m2, 0).unwrap(), Outcome::Done(())));
    k.delay(100).unwrap();

    // a takes m1, then blocks on m2 behind b.
    k.dispatch();
    assert_eq!(k.current(), Some(a));
    assert!(matches!(k.mutex_acquire(m1, 0).unwrap(), Outcome::Done(())));
    assert!(matches!(
        k.mutex_acquire(m2, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));

    // c blocks on m1 behind a: the boost must travel a -> b.
    k.task_resume(c).unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(c));
    assert!(matches!(
        k.mutex_acquire(m1, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));

    assert_eq!(k.task_prio(a).unwrap(), 20);
    assert_eq!(k.task_prio(b).unwrap(), 20);
    assert_eq!(k.task_base_prio(b).unwrap(), 12);
}

#[test]
fn robust_mutex_survives_holder_termination() {
    let mut k = kernel();
    let holder = spawn(&mut k, "holder", 12);
    let waiter = spawn(&mut k, "waiter", 10);
    let m = k.mutex_create(MUTEX_ROBUST).unwrap();
    k.start().unwrap();

    k.dispatch();
    assert_eq!(k.current(), Some(holder));
    assert!(matches!(k.mutex_acquire(m, 0).unwrap(), Outcome::Done(())));

    k.task_suspend(holder).unwrap();
    k.dispatch();
    assert_eq!(k.current(), Some(waiter));
    assert!(matches!(
        k.mutex_acquire(m, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));

    k.task_terminate(holder).unwrap();
    assert_eq!(k.mutex_holder(m).unwrap(), Some(waiter));
    assert!(k.task_wait_status(waiter).unwrap().is_ok());
}

#[test]
fn plain_mutex_reports_owner_death() {
    let mut k = kernel();
    let holder = spawn(&mut k, "holder", 12);
    let waiter = spawn(&mut k, "waiter", 10);
    let m = k.mutex_create(0).unwrap();
    k.start().unwrap();

    k.dispatch();
    assert!(matches!(k.mutex_acquire(m, 0).unwrap(), Outcome::Done(())));
    k.task_suspend(holder).unwrap();
    k.dispatch();
    assert!(matches!(
        k.mutex_acquire(m, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));

    k.task_terminate(holder).unwrap();
    assert_eq!(k.mutex_holder(m).unwrap(), None);
    assert_eq!(k.task_wait_status(waiter).unwrap(), Err(OsError::OwnerDied));
}

// ============ Event flags ============

#[test]
fn flag_wait_any_consumes_matched_bits_only() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let f = k.flag_create(0).unwrap();
    k.start().unwrap();
    k.dispatch();

    k.flag_set(f, 0x0C).unwrap();
    let observed = match k.flag_wait(f, 0x04, FLAG_WAIT_ANY, 0).unwrap() {
        Outcome::Done(v) => v,
        Outcome::Blocked => unreachable!(),
    };
    assert_eq!(observed, 0x0C);
    // Exactly the matched bit is gone.
    assert_eq!(k.flag_get(f).unwrap(), 0x08);
}

#[test]
fn flag_wait_all_requires_simultaneous_bits() {
    let mut k = kernel();
    let waiter = spawn(&mut k, "waiter", 10);
    let _main = spawn(&mut k, "main", 5);
    let f = k.flag_create(0).unwrap();
    k.start().unwrap();

    k.dispatch();
    assert_eq!(k.current(), Some(waiter));
    assert!(matches!(
        k.flag_wait(f, 0x3, FLAG_WAIT_ALL, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));
    k.dispatch();

    // Bits set and cleared sequentially never satisfy wait-all.
    k.flag_set(f, 0x1).unwrap();
    assert_eq!(k.task_state(waiter).unwrap(), OsTaskState::Blocked);
    k.flag_clear(f, 0x1).unwrap();
    k.flag_set(f, 0x2).unwrap();
    assert_eq!(k.task_state(waiter).unwrap(), OsTaskState::Blocked);

    k.flag_set(f, 0x1).unwrap();
    assert_eq!(k.task_state(waiter).unwrap(), OsTaskState::Ready);
    match k.task_wait_info(waiter).unwrap() {
        WaitInfo::Flag { matched, .. } => assert_eq!(matched, 0x3),
        other => panic!("unexpected wait info {other:?}"),
    }
    // Consumed on wake.
    assert_eq!(k.flag_get(f).unwrap(), 0);
}

#[test]
fn flag_no_clear_leaves_mask_intact() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let f = k.flag_create(0x5).unwrap();
    k.start().unwrap();
    k.dispatch();

    let observed = match k
        .flag_wait(f, 0x5, FLAG_WAIT_ALL | FLAG_NO_CLEAR, 0)
        .unwrap()
    {
        Outcome::Done(v) => v,
        Outcome::Blocked => unreachable!(),
    };
    assert_eq!(observed, 0x5);
    assert_eq!(k.flag_get(f).unwrap(), 0x5);
}

#[test]
fn flag_clear_returns_prior_mask_and_top_bit_is_reserved() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let f = k.flag_create(0x7).unwrap();
    k.start().unwrap();
    k.dispatch();

    assert_eq!(k.flag_clear(f, 0x2).unwrap(), 0x7);
    assert_eq!(k.flag_get(f).unwrap(), 0x5);

    assert_eq!(k.flag_set(f, 0x8000_0000), Err(OsError::Param));
    assert_eq!(
        k.flag_wait(f, 0x8000_0001, FLAG_WAIT_ANY, 0),
        Err(OsError::Param)
    );
}

// ============ Message queue ============

#[test]
fn msgq_orders_by_priority_then_fifo() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let q = k.msgq_create(4, 4, bytes(16)).unwrap();
    k.start().unwrap();
    k.dispatch();

    assert!(matches!(
        k.msgq_put(q, b"lo_1", 1, 0).unwrap(),
        Outcome::Done(())
    ));
    assert!(matches!(
        k.msgq_put(q, b"hi_1", 5, 0).unwrap(),
        Outcome::Done(())
    ));
    assert!(matches!(
        k.msgq_put(q, b"hi_2", 5, 0).unwrap(),
        Outcome::Done(())
    ));
    assert_eq!(k.msgq_count(q).unwrap(), 3);

    let mut buf = [0u8; 4];
    for expected in [&b"hi_1"[..], b"hi_2", b"lo_1"] {
        let (len, _prio) = match k.msgq_get(q, &mut buf, 0).unwrap() {
            Outcome::Done(v) => v,
            Outcome::Blocked => unreachable!(),
        };
        assert_eq!(&buf[..len], expected);
    }
    assert_eq!(k.msgq_count(q).unwrap(), 0);
}

#[test]
fn msgq_capacity_is_a_hard_bound() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let q = k.msgq_create(2, 4, bytes(8)).unwrap();
    k.start().unwrap();
    k.dispatch();

    assert!(matches!(k.msgq_put(q, b"m1", 0, 0).unwrap(), Outcome::Done(())));
    assert!(matches!(k.msgq_put(q, b"m2", 0, 0).unwrap(), Outcome::Done(())));
    assert_eq!(k.msgq_put(q, b"m3", 0, 0), Err(OsError::NoResource));
    assert_eq!(k.msgq_count(q).unwrap(), 2);
}

#[test]
fn msgq_delivers_directly_to_blocked_receiver() {
    let mut k = kernel();
    let getter = spawn(&mut k, "getter", 10);
    let _main = spawn(&mut k, "main", 5);
    let q = k.msgq_create(2, 8, bytes(16)).unwrap();
    k.start().unwrap();

    k.dispatch();
    assert_eq!(k.current(), Some(getter));
    let rxbuf = bytes(8);
    assert!(matches!(
        k.msgq_get(q, rxbuf, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));
    k.dispatch();

    assert!(matches!(
        k.msgq_put(q, b"payload", 3, 0).unwrap(),
        Outcome::Done(())
    ));
    assert_eq!(k.task_state(getter).unwrap(), OsTaskState::Ready);
    match k.task_wait_info(getter).unwrap() {
        WaitInfo::MsgRecv { len, prio, .. } => {
            assert_eq!(len, 7);
            assert_eq!(prio, 3);
        }
        other => panic!("unexpected wait info {other:?}"),
    }
    assert_eq!(&rxbuf[..7], b"payload");
    // Direct handoff: nothing stays queued.
    assert_eq!(k.msgq_count(q).unwrap(), 0);
}

#[test]
fn msgq_admits_blocked_sender_when_a_slot_frees() {
    let mut k = kernel();
    let sender = spawn(&mut k, "sender", 10);
    let _main = spawn(&mut k, "main", 5);
    let q = k.msgq_create(1, 4, bytes(4)).unwrap();
    k.start().unwrap();

    k.dispatch();
    assert_eq!(k.current(), Some(sender));
    assert!(matches!(k.msgq_put(q, b"one", 0, 0).unwrap(), Outcome::Done(())));
    let pending = b"two";
    assert!(matches!(
        k.msgq_put(q, pending, 0, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));
    k.dispatch();

    let mut buf = [0u8; 4];
    let (len, _) = match k.msgq_get(q, &mut buf, 0).unwrap() {
        Outcome::Done(v) => v,
        Outcome::Blocked => unreachable!(),
    };
    assert_eq!(&buf[..len], b"one");

    // The blocked sender's message moved in behind it.
    assert_eq!(k.task_state(sender).unwrap(), OsTaskState::Ready);
    assert_eq!(k.msgq_count(q).unwrap(), 1);
    let (len, _) = match k.msgq_get(q, &mut buf, 0).unwrap() {
        Outcome::Done(v) => v,
        Outcome::Blocked => unreachable!(),
    };
    assert_eq!(&buf[..len], b"two");
}

// ============ Data queue ============

#[test]
fn dataq_is_strict_fifo() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let q = k.dataq_create(words(4)).unwrap();
    k.start().unwrap();
    k.dispatch();

    for w in [3u32, 1, 2] {
        assert!(matches!(k.dataq_put(q, w, 0).unwrap(), Outcome::Done(())));
    }
    for expected in [3u32, 1, 2] {
        match k.dataq_get(q, 0).unwrap() {
            Outcome::Done(w) => assert_eq!(w, expected),
            Outcome::Blocked => unreachable!(),
        }
    }
    assert_eq!(k.dataq_get(q, 0), Err(OsError::NoResource));
}

#[test]
fn dataq_full_put_fails_or_blocks() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let q = k.dataq_create(words(2)).unwrap();
    k.start().unwrap();
    k.dispatch();

    k.dataq_put(q, 1, 0).unwrap();
    k.dataq_put(q, 2, 0).unwrap();
    assert_eq!(k.dataq_put(q, 3, 0), Err(OsError::NoResource));
    assert!(matches!(
        k.dataq_put(q, 3, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));
}

#[test]
fn zero_capacity_dataq_is_a_rendezvous() {
    let mut k = kernel();
    let sender = spawn(&mut k, "sender", 10);
    let _main = spawn(&mut k, "main", 5);
    let q = k.dataq_create(words(0)).unwrap();
    k.start().unwrap();

    k.dispatch();
    assert_eq!(k.current(), Some(sender));
    assert!(matches!(
        k.dataq_put(q, 0xABCD, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));
    k.dispatch();

    match k.dataq_get(q, 0).unwrap() {
        Outcome::Done(w) => assert_eq!(w, 0xABCD),
        Outcome::Blocked => unreachable!(),
    }
    assert_eq!(k.task_state(sender).unwrap(), OsTaskState::Ready);
}

// ============ Memory pool ============

#[test]
fn mempool_alloc_free_pairs_preserve_free_count() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let pool = k.mempool_create(16, 4, bytes(64)).unwrap();
    k.start().unwrap();
    k.dispatch();

    assert_eq!(k.mempool_free_count(pool).unwrap(), 4);
    for _ in 0..8 {
        let a = match k.mempool_alloc(pool, 0).unwrap() {
            Outcome::Done(p) => p,
            Outcome::Blocked => unreachable!(),
        };
        let b = match k.mempool_alloc(pool, 0).unwrap() {
            Outcome::Done(p) => p,
            Outcome::Blocked => unreachable!(),
        };
        assert_ne!(a, b);
        k.mempool_free(pool, a).unwrap();
        k.mempool_free(pool, b).unwrap();
        assert_eq!(k.mempool_free_count(pool).unwrap(), 4);
    }
}

#[test]
fn mempool_exhaustion_and_handoff() {
    let mut k = kernel();
    let waiter = spawn(&mut k, "waiter", 10);
    let _main = spawn(&mut k, "main", 5);
    let pool = k.mempool_create(8, 2, bytes(16)).unwrap();
    k.start().unwrap();

    k.dispatch();
    assert_eq!(k.current(), Some(waiter));
    let b1 = match k.mempool_alloc(pool, 0).unwrap() {
        Outcome::Done(p) => p,
        Outcome::Blocked => unreachable!(),
    };
    let _b2 = match k.mempool_alloc(pool, 0).unwrap() {
        Outcome::Done(p) => p,
        Outcome::Blocked => unreachable!(),
    };
    assert_eq!(k.mempool_alloc(pool, 0), Err(OsError::NoResource));
    assert!(matches!(
        k.mempool_alloc(pool, WAIT_FOREVER).unwrap(),
        Outcome::Blocked
    ));
    k.dispatch();

    // Freed block goes straight to the waiter, not the free list.
    k.mempool_free(pool, b1).unwrap();
    assert_eq!(k.task_state(waiter).unwrap(), OsTaskState::Ready);
    assert_eq!(k.mempool_free_count(pool).unwrap(), 0);
    match k.task_wait_info(waiter).unwrap() {
        WaitInfo::PoolAlloc { block, .. } => assert_eq!(block, b1.as_ptr()),
        other => panic!("unexpected wait info {other:?}"),
    }
}

#[test]
fn mempool_rejects_foreign_addresses() {
    let mut k = kernel();
    let _t = spawn(&mut k, "t", 10);
    let arena = bytes(32);
    let base = arena.as_mut_ptr();
    let pool = k.mempool_create(8, 4, arena).unwrap();
    k.start().unwrap();
    k.dispatch();

    // Misaligned inside the arena.
    let misaligned = core::ptr::NonNull::new(base.wrapping_add(1)).unwrap();
    assert_eq!(k.mempool_free(pool, misaligned), Err(OsError::Param));

    // Aligned but one block past the end.
    let past_end = core::ptr::NonNull::new(base.wrapping_add(32)).unwrap();
    assert_eq!(k.mempool_free(pool, past_end), Err(OsError::Param));
}

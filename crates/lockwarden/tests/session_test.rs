use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Barrier,
    },
    thread,
    time::{Duration, Instant},
};

use lockwarden::{
    order::is_ordered, Configure, Lock, LockError, LockId, LockMode, LockRegistry, OrderViolation,
    Session,
};
use pretty_assertions::assert_eq;

#[ctor::ctor]
fn init() {
    dev_utils::setup_test_log();
}

fn warn_only() -> LockRegistry {
    LockRegistry::with_config(Configure::new().fail_fast(false))
}

fn wait_for_count(lock: &Lock, count: usize) {
    let start = Instant::now();
    while lock.count() != count {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "lock {} never reached count {count} (at {})",
            lock.name(),
            lock.count()
        );
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn mutex_reentry_is_refused_without_counting_twice() {
    let registry = warn_only();
    let m = registry.create_mutex("m").unwrap();
    let mut s = Session::new();
    s.lock(&m).unwrap();
    assert_eq!(m.count(), 1);

    let err = s.lock(&m).unwrap_err();
    assert_eq!(
        err,
        LockError::OrderViolation(OrderViolation::SelfReentrant {
            id: m.id(),
            name: "m".into(),
        })
    );
    assert_eq!(m.count(), 1);
    assert_eq!(s.held().len(), 1);

    s.unlock(&m).unwrap();
    assert_eq!(m.count(), 0);
    assert!(!m.is_locked());
    s.close().unwrap();
    assert_eq!(registry.stats().order_violations, 1);
}

#[test]
fn opposite_order_is_flagged() {
    let registry = warn_only();
    let l1 = registry.create_mutex("L1").unwrap();
    let l2 = registry.create_mutex("L2").unwrap();
    assert_eq!(l1.id(), LockId::new(1));
    assert_eq!(l2.id(), LockId::new(2));

    let mut x = Session::new();
    x.lock(&l1).unwrap();
    x.lock(&l2).unwrap();
    assert!(is_ordered(x.held()));
    assert_eq!(registry.stats().order_violations, 0);
    x.unlock(&l2).unwrap();
    x.unlock(&l1).unwrap();
    x.close().unwrap();

    let mut y = Session::new();
    y.lock(&l2).unwrap();
    // warn-only: flagged, then let through
    y.lock(&l1).unwrap();
    assert_eq!(registry.stats().order_violations, 1);
    assert!(!is_ordered(y.held()));
    y.unlock(&l1).unwrap();
    y.unlock(&l2).unwrap();
    y.close().unwrap();
    assert_eq!(l1.count(), 0);
    assert_eq!(l2.count(), 0);
}

#[test]
fn locks_may_be_released_out_of_acquisition_order() {
    let registry = LockRegistry::new();
    let a = registry.create_mutex("a").unwrap();
    let b = registry.create_rw("b").unwrap();
    let mut s = Session::new();
    s.lock(&a).unwrap();
    s.write(&b).unwrap();
    s.unlock(&a).unwrap();
    assert_eq!(s.held().len(), 1);
    assert!(s.holds(&b));
    assert!(!s.holds(&a));
    // a is free again, but taking it now would go below b
    assert!(!a.is_locked());
    s.release_write(&b).unwrap();
    s.close().unwrap();
}

#[test]
fn readers_share_and_writer_waits() {
    let registry = LockRegistry::new();
    let rw = registry.create_rw("i-can-do-things").unwrap();
    let all_reading = Arc::new(Barrier::new(5));
    let may_release = Arc::new(Barrier::new(5));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let rw = rw.clone();
            let all_reading = all_reading.clone();
            let may_release = may_release.clone();
            thread::spawn(move || {
                let mut s = Session::new();
                s.read(&rw).unwrap();
                all_reading.wait();
                may_release.wait();
                s.release_read(&rw).unwrap();
                s.close().unwrap();
            })
        })
        .collect();

    all_reading.wait();
    assert_eq!(rw.count(), 4);

    let wrote = Arc::new(AtomicBool::new(false));
    let writer = {
        let rw = rw.clone();
        let wrote = wrote.clone();
        thread::spawn(move || {
            let mut s = Session::new();
            s.write(&rw).unwrap();
            wrote.store(true, Ordering::SeqCst);
            // every reader has left by now
            assert_eq!(rw.count(), 1);
            s.release_write(&rw).unwrap();
            s.close().unwrap();
        })
    };

    wait_for_count(&rw, 5);
    thread::sleep(Duration::from_millis(50));
    assert!(!wrote.load(Ordering::SeqCst));

    may_release.wait();
    for r in readers {
        r.join().unwrap();
    }
    writer.join().unwrap();
    assert!(wrote.load(Ordering::SeqCst));
    assert_eq!(rw.count(), 0);
    assert!(!rw.is_locked());
}

#[test]
fn writer_excludes_readers() {
    let registry = LockRegistry::new();
    let rw = registry.create_rw("rw").unwrap();
    let mut w = Session::new();
    w.write(&rw).unwrap();

    let (tx, rx) = mpsc::channel();
    let reader = {
        let rw = rw.clone();
        thread::spawn(move || {
            let mut s = Session::new();
            s.read(&rw).unwrap();
            tx.send(()).unwrap();
            s.release_read(&rw).unwrap();
        })
    };

    wait_for_count(&rw, 2);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    w.release_write(&rw).unwrap();
    rx.recv_timeout(Duration::from_secs(10)).unwrap();
    reader.join().unwrap();
    assert_eq!(rw.count(), 0);
}

#[test]
fn recursive_depth_returns_count_to_zero() {
    let registry = LockRegistry::new();
    let r = registry.create_recursive("recursive").unwrap();
    let mut s = Session::new();
    for _ in 0..4 {
        s.lock(&r).unwrap();
    }
    assert_eq!(r.count(), 4);
    assert_eq!(s.held().len(), 4);
    for _ in 0..4 {
        s.unlock(&r).unwrap();
    }
    assert_eq!(r.count(), 0);
    assert!(!r.is_locked());
    s.close().unwrap();
}

#[test]
fn recursive_lock_stays_held_until_last_release() {
    let registry = LockRegistry::new();
    let r = registry.create_recursive("recursive").unwrap();
    let mut s = Session::new();
    for _ in 0..4 {
        s.lock(&r).unwrap();
    }
    for _ in 0..3 {
        s.unlock(&r).unwrap();
    }
    assert_eq!(r.count(), 1);
    assert!(r.is_locked());

    let (tx, rx) = mpsc::channel();
    let other = {
        let r = r.clone();
        thread::spawn(move || {
            let mut o = Session::new();
            o.lock(&r).unwrap();
            tx.send(()).unwrap();
            o.unlock(&r).unwrap();
            o.close().unwrap();
        })
    };
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    s.unlock(&r).unwrap();
    rx.recv_timeout(Duration::from_secs(10)).unwrap();
    other.join().unwrap();
    assert_eq!(r.count(), 0);
    s.close().unwrap();
}

#[test]
fn two_threads_reenter_recursive_lock() {
    let registry = LockRegistry::new();
    let r = registry.create_recursive("recursive").unwrap();
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let r = r.clone();
            thread::spawn(move || {
                let mut s = Session::new();
                for _ in 0..10 {
                    for _ in 0..4 {
                        s.lock(&r).unwrap();
                    }
                    for _ in 0..4 {
                        s.unlock(&r).unwrap();
                    }
                }
                s.close().unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(r.count(), 0);
}

#[test]
fn heuristic_refuses_past_threshold() {
    let registry = LockRegistry::new();
    let rw = registry.create_rw("rw").unwrap();
    rw.set_deadlock_threshold(3);
    let mut readers: Vec<Session> = (0..3).map(|_| Session::new()).collect();
    for s in &mut readers {
        s.read(&rw).unwrap();
    }

    let mut extra = Session::new();
    assert_eq!(
        extra.read(&rw).unwrap_err(),
        LockError::DeadlockSuspected {
            name: "rw".into(),
            count: 3,
            threshold: 3,
        }
    );
    assert_eq!(rw.count(), 3);
    assert!(extra.is_empty());
    assert_eq!(registry.stats().deadlock_suspicions, 1);

    for s in &mut readers {
        s.release_read(&rw).unwrap();
    }
    extra.read(&rw).unwrap();
    extra.release_read(&rw).unwrap();
}

#[test]
fn heuristic_can_be_turned_off_per_lock() {
    let registry = LockRegistry::with_config(Configure::new().deadlock_threshold(1));
    let rw = registry.create_rw("rw").unwrap();
    rw.set_deadlock_heuristic(false);
    let mut a = Session::new();
    let mut b = Session::new();
    a.read(&rw).unwrap();
    b.read(&rw).unwrap();
    assert_eq!(rw.count(), 2);
    a.release_read(&rw).unwrap();
    b.release_read(&rw).unwrap();
}

#[test]
fn heuristic_refusal_does_not_block() {
    let registry = LockRegistry::new();
    let m = registry.create_mutex("simpleton").unwrap();
    m.set_deadlock_threshold(2);
    let mut holder = Session::new();
    holder.lock(&m).unwrap();

    let waiter = {
        let m = m.clone();
        thread::spawn(move || {
            let mut s = Session::new();
            s.lock(&m).unwrap();
            s.unlock(&m).unwrap();
        })
    };
    wait_for_count(&m, 2);

    let refused = {
        let m = m.clone();
        thread::spawn(move || {
            let mut s = Session::new();
            s.lock(&m)
        })
    };
    let err = refused.join().unwrap().unwrap_err();
    assert!(matches!(err, LockError::DeadlockSuspected { count: 2, .. }));
    assert_eq!(m.count(), 2);

    holder.unlock(&m).unwrap();
    waiter.join().unwrap();
    assert_eq!(m.count(), 0);
}

#[test]
fn releasing_unheld_lock_is_reported() {
    let registry = LockRegistry::new();
    let m = registry.create_mutex("m").unwrap();
    let mut s = Session::new();
    let err = s.unlock(&m).unwrap_err();
    assert!(err.is_usage_error());
    assert!(matches!(err, LockError::NotHeld { .. }));
    assert_eq!(m.count(), 0);
}

#[test]
fn release_mode_must_match() {
    let registry = LockRegistry::new();
    let rw = registry.create_rw("rw").unwrap();
    let mut s = Session::new();
    s.read(&rw).unwrap();
    assert_eq!(
        s.release_write(&rw).unwrap_err(),
        LockError::ModeMismatch {
            name: "rw".into(),
            held: LockMode::Read,
            requested: LockMode::Write,
        }
    );
    assert_eq!(rw.count(), 1);
    s.release_read(&rw).unwrap();
    assert!(!rw.is_locked());
}

#[test]
fn modes_are_normalized_per_kind() {
    let registry = LockRegistry::new();
    let m = registry.create_mutex("m").unwrap();
    let rw = registry.create_rw("rw").unwrap();
    let mut s = Session::new();
    s.read(&m).unwrap();
    assert_eq!(s.held()[0].mode, LockMode::Basic);
    s.lock(&rw).unwrap();
    assert_eq!(s.held()[1].mode, LockMode::Write);
    s.release_write(&rw).unwrap();
    s.unlock(&m).unwrap();
}

#[test]
fn closing_a_busy_session_fails() {
    let registry = LockRegistry::new();
    let m = registry.create_mutex("m").unwrap();
    let mut s = Session::new();
    let id = s.id();
    s.lock(&m).unwrap();
    assert_eq!(
        s.close().unwrap_err(),
        LockError::SessionNotEmpty {
            session: id,
            held: 1
        }
    );
    // not an implicit release
    assert!(m.is_locked());
    assert_eq!(m.count(), 1);
}

#[test]
fn sessions_keep_registries_apart() {
    let first = warn_only();
    let second = warn_only();
    let a = first.create_mutex("a").unwrap();
    let b = second.create_mutex("b").unwrap();
    assert_eq!(a.id(), b.id());
    assert_ne!(a.registry(), b.registry());

    let mut s = Session::new();
    s.lock(&a).unwrap();
    assert!(matches!(s.unlock(&b), Err(LockError::NotHeld { .. })));
    assert!(a.is_locked());

    // same id, different lock: neither a re-entry nor out of order
    s.lock(&b).unwrap();
    assert!(s.holds(&a) && s.holds(&b));
    assert_eq!(a.count(), 1);
    assert_eq!(b.count(), 1);
    assert_eq!(first.stats().order_violations, 0);
    assert_eq!(second.stats().order_violations, 0);

    s.unlock(&a).unwrap();
    assert!(b.is_locked());
    s.unlock(&b).unwrap();
    s.close().unwrap();
}

#[test]
fn order_is_only_checked_within_a_registry() {
    let first = warn_only();
    let second = warn_only();
    let a1 = first.create_mutex("a1").unwrap();
    let a2 = first.create_mutex("a2").unwrap();
    let b1 = second.create_mutex("b1").unwrap();

    let mut s = Session::new();
    s.lock(&a2).unwrap();
    s.lock(&b1).unwrap();
    assert!(is_ordered(s.held()));
    assert_eq!(first.stats().order_violations + second.stats().order_violations, 0);

    // a1 is still below a2 of its own registry
    s.lock(&a1).unwrap();
    assert_eq!(first.stats().order_violations, 1);
    assert_eq!(second.stats().order_violations, 0);
    assert!(!is_ordered(s.held()));

    s.unlock(&a1).unwrap();
    s.unlock(&b1).unwrap();
    s.unlock(&a2).unwrap();
    s.close().unwrap();
}

#[test]
fn trace_toggle_does_not_change_behaviour() {
    let registry = LockRegistry::new();
    let m = registry.create_mutex("simpleton").unwrap();
    let mut s = Session::new();
    s.lock(&m).unwrap();
    s.unlock(&m).unwrap();
    registry.set_trace(true);
    s.lock(&m).unwrap();
    assert_eq!(m.count(), 1);
    s.unlock(&m).unwrap();
    s.close().unwrap();
}

#[test]
fn caller_records_point_at_call_site() {
    let registry = LockRegistry::with_config(Configure::new().get_time(|| 1234));
    let m = registry.create_mutex("m").unwrap();
    let mut s = Session::new();
    let line = line!() + 1;
    s.lock(&m).unwrap();
    let report = m.report();
    assert_eq!(report.callers.len(), 1);
    let caller = &report.callers[0];
    assert_eq!(caller.line, line);
    assert!(caller.file.ends_with("session_test.rs"));
    assert_eq!(caller.timestamp, 1234);
    assert_eq!(caller.session, s.id());
    s.unlock(&m).unwrap();
}

#[test]
fn session_ids_are_unique_and_increasing() {
    let a = Session::new();
    let b = Session::new();
    let c = thread::spawn(|| Session::new().id()).join().unwrap();
    assert!(a.id().get() < b.id().get());
    assert!(b.id().get() < c.get());
    assert_eq!(a.id().to_string(), format!("session-{}", a.id().get()));
}

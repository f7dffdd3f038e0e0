//! Multi-threaded conformance checks for the gate, barrier and limiter.

use foundation_sync::{
    AdmissionLimiter, CancellationToken, CountdownGate, PhaseBarrier, SyncError,
};
use ntest::timeout;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_test::traced_test;

#[test]
#[timeout(20000)]
fn gate_releases_all_waiters_after_exactly_n_count_downs() {
    for n in 1..=6 {
        let gate = CountdownGate::new(n);
        let counted = Arc::new(AtomicUsize::new(0));

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = gate.clone();
                let counted = Arc::clone(&counted);
                thread::spawn(move || {
                    gate.wait(&CancellationToken::new()).unwrap();
                    counted.load(Ordering::SeqCst)
                })
            })
            .collect();

        for _ in 0..n {
            thread::sleep(Duration::from_millis(2));
            counted.fetch_add(1, Ordering::SeqCst);
            gate.count_down();
        }

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), n);
        }

        gate.count_down();
        assert_eq!(gate.count(), 0);
        // late waits return immediately
        assert!(gate
            .wait_timeout(Duration::ZERO, &CancellationToken::new())
            .unwrap());
    }
}

#[test]
#[timeout(30000)]
fn barrier_releases_every_round_for_repeated_rounds() {
    for parties in 1..=5usize {
        let rounds = 4;
        let releases = Arc::new(AtomicUsize::new(0));
        let trips = Arc::clone(&releases);
        let barrier = PhaseBarrier::with_action(parties, move || {
            trips.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let passed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..parties)
            .map(|_| {
                let barrier = barrier.clone();
                let passed = Arc::clone(&passed);
                thread::spawn(move || {
                    let token = CancellationToken::new();
                    for round in 0..rounds {
                        barrier.wait(&token).unwrap();
                        // nobody may run ahead into a round the others have not finished
                        assert!(passed.load(Ordering::SeqCst) >= round * parties);
                        passed.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(releases.load(Ordering::SeqCst), rounds);
        assert_eq!(barrier.generation(), rounds as u64);
        assert_eq!(passed.load(Ordering::SeqCst), rounds * parties);
    }
}

#[test]
#[traced_test]
#[serial]
fn one_timed_out_party_breaks_the_round_for_all_others() {
    let parties = 5;
    let barrier = PhaseBarrier::new(parties).unwrap();

    let others: Vec<_> = (0..parties - 2)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.wait(&CancellationToken::new()))
        })
        .collect();
    while barrier.number_waiting() < parties - 2 {
        thread::sleep(Duration::from_millis(1));
    }

    let timed_out = barrier.wait_timeout(Duration::from_millis(25), &CancellationToken::new());
    assert_eq!(timed_out, Err(SyncError::TimedOut));

    for other in others {
        assert_eq!(other.join().unwrap(), Err(SyncError::BrokenBarrier));
    }
    assert!(logs_contain("broken"));

    // the missing party arrives late and must not slip through
    assert_eq!(
        barrier.wait(&CancellationToken::new()),
        Err(SyncError::BrokenBarrier)
    );
    barrier.reset();
    assert!(!barrier.is_broken());
}

#[test]
#[timeout(10000)]
fn cancelling_one_party_breaks_the_round() {
    let barrier = PhaseBarrier::new(3).unwrap();
    let shared = CancellationToken::new();

    let victim = {
        let barrier = barrier.clone();
        let token = shared.clone();
        thread::spawn(move || barrier.wait(&token))
    };
    let bystander = {
        let barrier = barrier.clone();
        thread::spawn(move || barrier.wait(&CancellationToken::new()))
    };
    while barrier.number_waiting() < 2 {
        thread::sleep(Duration::from_millis(1));
    }

    shared.cancel();
    assert_eq!(victim.join().unwrap(), Err(SyncError::Interrupted));
    assert_eq!(bystander.join().unwrap(), Err(SyncError::BrokenBarrier));
}

#[test]
#[timeout(30000)]
#[serial]
fn limiter_never_admits_more_than_capacity() {
    for capacity in 0..=3usize {
        let limiter = AdmissionLimiter::new(capacity, capacity % 2 == 0);
        let holders = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let limiter = limiter.clone();
                let holders = Arc::clone(&holders);
                let peak = Arc::clone(&peak);
                let admitted = Arc::clone(&admitted);
                thread::spawn(move || {
                    let token = CancellationToken::new();
                    for _ in 0..20 {
                        if !limiter
                            .try_acquire_timeout(1, Duration::from_millis(5), &token)
                            .unwrap()
                        {
                            continue;
                        }
                        let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        admitted.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_micros(200));
                        holders.fetch_sub(1, Ordering::SeqCst);
                        limiter.release();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= capacity);
        if capacity == 0 {
            assert_eq!(admitted.load(Ordering::SeqCst), 0);
        }
        assert_eq!(limiter.available_permits(), capacity);
    }
}

#[test]
fn limiter_release_then_acquire_leaves_permits_unchanged() {
    for k in 1..=4 {
        let limiter = AdmissionLimiter::new(2, true);
        let before = limiter.available_permits();
        limiter.release_many(k).unwrap();
        limiter
            .acquire_many(k, &CancellationToken::new())
            .unwrap();
        assert_eq!(limiter.available_permits(), before);
    }
}

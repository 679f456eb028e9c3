#![allow(missing_docs)]
#![cfg(feature = "loom")]

use depsched::{
    event::{Event, ResetMode},
    queue::BoundedQueue,
    spinlock::{BusySpinLock, TrySpinLock, YieldingSpinLock},
};
use loom::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

#[test]
fn loom_queue_hands_off_every_element_once() {
    loom::model(|| {
        let queue = Arc::new(BoundedQueue::new(2));
        let producers: Vec<_> = [1_u32, 2]
            .into_iter()
            .map(|value| {
                let queue = queue.clone();
                thread::spawn(move || {
                    queue.enqueue(value).expect("two slots for two producers");
                })
            })
            .collect();

        let mut seen = Vec::new();
        while seen.len() < 2 {
            match queue.dequeue() {
                Some(value) => seen.push(value),
                None => thread::yield_now(),
            }
        }
        for producer in producers {
            producer.join().unwrap();
        }

        seen.sort_unstable();
        assert_eq!(seen, [1, 2]);
        assert!(queue.dequeue().is_none());
    });
}

#[test]
fn loom_queue_never_exceeds_capacity() {
    loom::model(|| {
        // Capacity 1, two concurrent producers, no consumer: exactly one
        // enqueue may succeed.
        let queue = Arc::new(BoundedQueue::new(1));
        let producers: Vec<_> = [1_u32, 2]
            .into_iter()
            .map(|value| {
                let queue = queue.clone();
                thread::spawn(move || queue.enqueue(value).is_ok())
            })
            .collect();
        let accepted = producers
            .into_iter()
            .map(|producer| producer.join().unwrap())
            .filter(|&ok| ok)
            .count();

        assert_eq!(accepted, 1);
        assert!(queue.dequeue().is_some());
        assert!(queue.dequeue().is_none());
    });
}

#[test]
fn loom_queue_consumers_race_for_one_element() {
    loom::model(|| {
        let queue = Arc::new(BoundedQueue::new(2));
        queue.enqueue(7_u32).unwrap();
        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.dequeue())
            })
            .collect();
        let taken: Vec<_> = consumers
            .into_iter()
            .filter_map(|consumer| consumer.join().unwrap())
            .collect();

        assert_eq!(taken, [7]);
    });
}

#[test]
fn loom_busy_spinlock_mutual_exclusion() {
    loom::model(|| {
        // `SpinLock` keeps its data in a `loom` cell, so any overlapping access
        // fails the model.
        let lock = Arc::new(BusySpinLock::new(0_usize));
        let threads: Vec<_> = (0..2)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    let mut guard = lock.lock().expect("waiting lock always succeeds");
                    guard.with(|value| *value += 1);
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(lock.lock().unwrap().with(|value| *value), 2);
    });
}

#[test]
fn loom_yielding_spinlock_mutual_exclusion() {
    loom::model(|| {
        let lock = Arc::new(YieldingSpinLock::new(Vec::new()));
        let other = {
            let lock = lock.clone();
            thread::spawn(move || {
                lock.lock().unwrap().with(|log| log.push(1));
            })
        };
        lock.lock().unwrap().with(|log| log.push(2));
        other.join().unwrap();

        let mut log = lock.lock().unwrap().with(|log| log.clone());
        log.sort_unstable();
        assert_eq!(log, [1, 2]);
    });
}

#[test]
fn loom_try_lock_never_blocks() {
    loom::model(|| {
        let lock = Arc::new(TrySpinLock::new(0_usize));
        let threads: Vec<_> = (0..2)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    if let Some(mut guard) = lock.lock() {
                        guard.with(|value| *value += 1);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        // A loser returns immediately; at least one thread wins.
        let wins = lock.lock().unwrap().with(|value| *value);
        assert!((1..=2).contains(&wins), "wins = {wins}");
        assert!(!lock.is_locked());
    });
}

#[test]
fn loom_event_trigger_publishes_prior_writes() {
    loom::model(|| {
        let event = Arc::new(Event::new(ResetMode::Auto));
        let data = Arc::new(AtomicUsize::new(0));
        let producer = {
            let event = event.clone();
            let data = data.clone();
            thread::spawn(move || {
                data.store(42, Ordering::Relaxed);
                event.trigger();
            })
        };

        event.wait();
        assert_eq!(data.load(Ordering::Relaxed), 42);
        assert!(!event.try_wait(), "auto-reset consumes the signal");
        producer.join().unwrap();
    });
}

#[test]
fn loom_manual_event_releases_all_waiters() {
    loom::model(|| {
        let event = Arc::new(Event::new(ResetMode::Manual));
        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let event = event.clone();
                thread::spawn(move || event.wait())
            })
            .collect();

        event.trigger();
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert!(event.try_wait());
    });
}

mod common;

use common::manual_scheduler;
use proptest::prelude::*;
use tickstep::{Error, TimerId, TimerState};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

const MS: u64 = 1_000;

#[test]
fn test_one_shot_fires_once_and_goes_idle() {
    let (_, _, scheduler) = manual_scheduler();
    let handle = scheduler.create();

    scheduler.start(&handle, Some(100), false).unwrap();

    let mut fired = Vec::new();
    scheduler.drain(50 * MS, &mut fired).unwrap();
    assert!(fired.is_empty(), "timer must not fire before its deadline");

    scheduler.drain(150 * MS, &mut fired).unwrap();
    assert_eq!(fired, vec![handle.id().unwrap()]);
    assert_eq!(handle.state(), TimerState::Idle);
    assert_eq!(scheduler.pending(), 0);

    scheduler.release(&handle).unwrap();
}

#[test]
fn test_start_after_release_is_disposed() {
    let (_, _, scheduler) = manual_scheduler();
    let handle = scheduler.create();

    scheduler.release(&handle).unwrap();

    assert_eq!(scheduler.start(&handle, Some(10), false), Err(Error::Disposed));
    assert_eq!(handle.state(), TimerState::Released);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_repeating_timer_does_not_drift() {
    let (_, _, scheduler) = manual_scheduler();
    let handle = scheduler.create();
    let id = handle.id().unwrap();

    scheduler.start(&handle, Some(100), true).unwrap();

    // Drain late by a different amount every period.
    for (n, jitter) in [37, 0, 99, 12, 64].into_iter().enumerate() {
        let due = (n as u64 + 1) * 100 * MS;
        let mut fired = Vec::new();

        scheduler.drain(due + jitter * MS, &mut fired).unwrap();
        assert_eq!(fired, vec![id]);
        assert_eq!(handle.state(), TimerState::Armed);
        assert_eq!(scheduler.next_deadline(), Some(due + 100 * MS));
    }

    scheduler.release(&handle).unwrap();
}

#[test]
fn test_repeating_timer_fires_once_per_drain_when_late() {
    let (_, _, scheduler) = manual_scheduler();
    let handle = scheduler.create();

    scheduler.start(&handle, Some(10), true).unwrap();

    let mut fired = Vec::new();
    scheduler.drain(55 * MS, &mut fired).unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(scheduler.next_deadline(), Some(20 * MS));

    scheduler.release(&handle).unwrap();
}

#[test]
fn test_zero_period_repeating_timer_fires_each_drain() {
    let (_, _, scheduler) = manual_scheduler();
    let handle = scheduler.create();

    scheduler.start(&handle, Some(0), true).unwrap();

    for _ in 0..3 {
        let mut fired = Vec::new();
        scheduler.drain(0, &mut fired).unwrap();
        assert_eq!(fired.len(), 1);
    }

    scheduler.release(&handle).unwrap();
}

#[test]
fn test_release_during_repeat_stops_rearming() {
    let (_, _, scheduler) = manual_scheduler();
    let handle = scheduler.create();

    scheduler.start(&handle, Some(5), true).unwrap();
    let mut fired = Vec::new();
    scheduler.drain(5 * MS, &mut fired).unwrap();
    assert_eq!(scheduler.pending(), 1);

    scheduler.release(&handle).unwrap();
    assert_eq!(scheduler.pending(), 0);

    fired.clear();
    scheduler.drain(1_000 * MS, &mut fired).unwrap();
    assert!(fired.is_empty());
}

#[test]
fn test_off_thread_start_is_deferred_to_coordinating_thread() {
    let (dispatcher, _, scheduler) = manual_scheduler();
    let handle = Arc::new(scheduler.create());

    let (s, h) = (scheduler.clone(), handle.clone());
    thread::spawn(move || s.start(&h, Some(20), false))
        .join()
        .unwrap()
        .unwrap();

    assert_eq!(handle.state(), TimerState::Starting);
    assert_eq!(scheduler.pending(), 0);

    assert_eq!(dispatcher.run_pending(), 1);
    assert_eq!(handle.state(), TimerState::Armed);
    assert_eq!(scheduler.next_deadline(), Some(20 * MS));

    scheduler.release(&handle).unwrap();
}

#[test]
fn test_deferred_start_never_arms_in_the_past() {
    let (dispatcher, clock, scheduler) = manual_scheduler();
    let handle = Arc::new(scheduler.create());

    let (s, h) = (scheduler.clone(), handle.clone());
    thread::spawn(move || s.start(&h, Some(10), false))
        .join()
        .unwrap()
        .unwrap();

    clock.set_millis(40);
    dispatcher.run_pending();

    assert_eq!(scheduler.next_deadline(), Some(40 * MS));
    scheduler.release(&handle).unwrap();
}

#[test]
fn test_off_thread_release_is_skipped_by_drain_and_recycled() {
    let (dispatcher, _, scheduler) = manual_scheduler();
    let handle = Arc::new(scheduler.create());
    let id = handle.id().unwrap();
    scheduler.start(&handle, Some(1), false).unwrap();

    let (s, h) = (scheduler.clone(), handle.clone());
    thread::spawn(move || s.release(&h)).join().unwrap().unwrap();

    // The entry is still queued until the coordinating thread pumps.
    assert_eq!(scheduler.pending(), 1);

    let mut fired = Vec::new();
    scheduler.drain(10 * MS, &mut fired).unwrap();
    assert!(fired.is_empty(), "released timer must not fire");

    dispatcher.run_pending();
    assert_eq!(scheduler.pending(), 0);

    // Shared-list releases are picked up by the next coordinating create.
    let reused = scheduler.create();
    assert_eq!(reused.id(), Ok(id));
    scheduler.release(&reused).unwrap();
}

#[test]
fn test_deferred_unqueue_keeps_timer_restarted_on_coordinating_thread() {
    let (dispatcher, _, scheduler) = manual_scheduler();
    let handle = Arc::new(scheduler.create());
    scheduler.start(&handle, Some(10), false).unwrap();

    let (s, h) = (scheduler.clone(), handle.clone());
    thread::spawn(move || s.stop(&h)).join().unwrap().unwrap();
    assert_eq!(handle.state(), TimerState::Idle);

    scheduler.start(&handle, Some(30), false).unwrap();
    assert_eq!(dispatcher.run_pending(), 1);

    assert!(scheduler.is_queued(&handle), "restarted timer must stay queued");
    assert_eq!(scheduler.next_deadline(), Some(30 * MS));

    let mut fired = Vec::new();
    scheduler.drain(10 * MS, &mut fired).unwrap();
    assert!(fired.is_empty());

    scheduler.drain(30 * MS, &mut fired).unwrap();
    assert_eq!(fired, vec![handle.id().unwrap()]);

    scheduler.release(&handle).unwrap();
}

#[test]
fn test_merge_released_moves_foreign_releases_once() {
    let (_, _, scheduler) = manual_scheduler();
    let handle = Arc::new(scheduler.create());
    let id = handle.id().unwrap();

    let (s, h) = (scheduler.clone(), handle.clone());
    let merged_off_thread = thread::spawn(move || {
        s.release(&h).unwrap();
        s.merge_released()
    })
    .join()
    .unwrap();

    assert_eq!(merged_off_thread, 0);
    assert_eq!(scheduler.merge_released(), 1);
    assert_eq!(scheduler.merge_released(), 0);

    let reused = scheduler.create();
    assert_eq!(reused.id(), Ok(id));
    assert_eq!(scheduler.minted(), 1);
    scheduler.release(&reused).unwrap();
}

#[test]
fn test_drain_off_thread_is_contract_violation() {
    let (_, _, scheduler) = manual_scheduler();

    let s = scheduler.clone();
    let result = thread::spawn(move || s.drain(0, &mut Vec::new()))
        .join()
        .unwrap();

    assert!(matches!(result, Err(Error::ContractViolation(_))));
}

#[test]
fn test_concurrent_allocation_never_shares_identities() {
    let (_, _, scheduler) = manual_scheduler();
    let live: Arc<Mutex<HashSet<TimerId>>> = Arc::new(Mutex::new(HashSet::new()));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = scheduler.clone();
            let live = live.clone();
            thread::spawn(move || {
                for round in 0..500 {
                    let handles: Vec<_> = (0..1 + round % 4).map(|_| scheduler.create()).collect();

                    for handle in &handles {
                        let id = handle.id().unwrap();
                        assert!(live.lock().unwrap().insert(id), "{id} handed out twice");
                    }

                    for handle in &handles {
                        live.lock().unwrap().remove(&handle.id().unwrap());
                        scheduler.release(handle).unwrap();
                    }
                }
            })
        })
        .collect();

    // The coordinating thread allocates at the same time through its local list.
    for _ in 0..500 {
        let handle = scheduler.create();
        let id = handle.id().unwrap();
        assert!(live.lock().unwrap().insert(id), "{id} handed out twice");
        live.lock().unwrap().remove(&id);
        scheduler.release(&handle).unwrap();
    }

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(scheduler.live_handles(), 0);
    assert_eq!(scheduler.leaked_handles(), 0);
    assert!(scheduler.minted() < 100, "released identities should be reused");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Timers started in the same tick with the same delay drain in start order.
    #[test]
    fn equal_deadlines_drain_in_start_order(count in 1usize..40, delay in 0i64..500) {
        let (_, _, scheduler) = manual_scheduler();
        let handles: Vec<_> = (0..count).map(|_| scheduler.create()).collect();

        for handle in &handles {
            scheduler.start(handle, Some(delay), false).unwrap();
        }

        let mut fired = Vec::new();
        scheduler.drain(delay as u64 * MS, &mut fired).unwrap();

        let expected: Vec<_> = handles.iter().map(|h| h.id().unwrap()).collect();
        prop_assert_eq!(fired, expected);

        for handle in &handles {
            scheduler.release(handle).unwrap();
        }
    }

    /// Mixed delays drain by deadline, ties kept in start order.
    #[test]
    fn mixed_deadlines_drain_sorted_and_stable(delays in prop::collection::vec(0i64..5, 1..30)) {
        let (_, _, scheduler) = manual_scheduler();
        let handles: Vec<_> = delays.iter().map(|_| scheduler.create()).collect();

        for (handle, &delay) in handles.iter().zip(&delays) {
            scheduler.start(handle, Some(delay), false).unwrap();
        }

        let mut fired = Vec::new();
        scheduler.drain(10 * MS, &mut fired).unwrap();

        let mut expected: Vec<_> = handles
            .iter()
            .zip(&delays)
            .map(|(h, &d)| (d, h.id().unwrap()))
            .collect();
        expected.sort_by_key(|&(d, _)| d);
        let expected: Vec<_> = expected.into_iter().map(|(_, id)| id).collect();
        prop_assert_eq!(fired, expected);

        for handle in &handles {
            scheduler.release(handle).unwrap();
        }
    }
}

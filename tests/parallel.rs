mod common;

use common::init_test_logging;
use tickstep::step::{drive_unit, parallel};
use tickstep::{AsyncStep, Workflow};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

fn immediate() -> Workflow {
    Workflow::new([AsyncStep::pending(|done| done())])
}

#[test]
fn test_fires_once_after_delayed_branch() {
    init_test_logging();

    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let delayed = Workflow::new([AsyncStep::pending(move |done| {
        thread::spawn(move || {
            gate_rx.recv().unwrap();
            thread::sleep(Duration::from_millis(10));
            done();
        });
    })]);

    let fired = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = mpsc::channel();

    let f = fired.clone();
    drive_unit(
        Workflow::<()>::new([parallel(vec![immediate(), delayed, immediate()])]),
        move || {
            f.fetch_add(1, Ordering::SeqCst);
            done_tx.send(()).unwrap();
        },
    );

    // Both synchronous branches are done; the delayed one has not signalled.
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    gate_tx.send(()).unwrap();
    done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    thread::sleep(Duration::from_millis(20));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_many_racing_branches_fire_exactly_once() {
    init_test_logging();

    let branches: Vec<Workflow> = (0..32)
        .map(|i| {
            Workflow::new([AsyncStep::pending(move |done| {
                thread::spawn(move || {
                    thread::sleep(Duration::from_micros(i * 50));
                    done();
                });
            })])
        })
        .collect();

    let fired = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    let f = fired.clone();
    drive_unit(Workflow::<()>::new([parallel(branches)]), move || {
        f.fetch_add(1, Ordering::SeqCst);
        tx.send(()).unwrap();
    });

    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_branches_with_several_steps_finish_before_join() {
    init_test_logging();

    let steps = Arc::new(AtomicUsize::new(0));
    let branch = |len: usize| {
        let steps = steps.clone();
        Workflow::new((0..len).map(move |_| {
            let steps = steps.clone();
            AsyncStep::pending(move |done| {
                steps.fetch_add(1, Ordering::SeqCst);
                done();
            })
        }))
    };

    let seen = Arc::new(AtomicUsize::new(0));
    let (s, total) = (seen.clone(), steps.clone());
    drive_unit(
        Workflow::<()>::new([parallel(vec![branch(1), branch(3), branch(2)])]),
        move || s.store(total.load(Ordering::SeqCst), Ordering::SeqCst),
    );

    assert_eq!(seen.load(Ordering::SeqCst), 6);
}

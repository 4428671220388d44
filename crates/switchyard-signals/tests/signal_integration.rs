//! Integration tests for signal dispatch across threads and the global
//! request lifecycle signals.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use switchyard_signals::{GotRequestException, RequestFinished, RequestStarted, Signal, SIGNALS};

#[test]
fn test_concurrent_senders_reach_every_receiver() {
    let signal = Arc::new(Signal::<usize>::new());
    let total = Arc::new(AtomicUsize::new(0));

    for id in 0..3 {
        let total = Arc::clone(&total);
        signal.connect(
            format!("adder-{id}"),
            Arc::new(move |n: &usize| {
                total.fetch_add(*n, Ordering::SeqCst);
                None
            }),
        );
    }

    let senders: Vec<_> = (1..=4)
        .map(|n| {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                signal.send(&n);
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    // (1 + 2 + 3 + 4) per receiver.
    assert_eq!(total.load(Ordering::SeqCst), 30);
}

#[test]
fn test_replaced_receiver_keeps_its_position() {
    let signal: Signal<()> = Signal::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        signal.connect(
            name,
            Arc::new(move |_: &()| {
                order.lock().unwrap().push(name.to_string());
                None
            }),
        );
    }
    let replaced = Arc::clone(&order);
    signal.connect(
        "second",
        Arc::new(move |_: &()| {
            replaced.lock().unwrap().push("second (replaced)".to_string());
            None
        }),
    );

    signal.send(&());
    assert_eq!(*order.lock().unwrap(), vec!["first", "second (replaced)", "third"]);
    assert_eq!(signal.receiver_count(), 3);
}

#[test]
fn test_request_lifecycle_signals() {
    let started = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(Mutex::new(Vec::new()));
    let finished = Arc::new(AtomicUsize::new(0));

    let sink = Arc::clone(&started);
    SIGNALS.request_started.connect(
        "lifecycle.started",
        Arc::new(move |event: &RequestStarted| {
            if event.path.starts_with("/lifecycle/") {
                sink.lock().unwrap().push(event.path.clone());
            }
            None
        }),
    );
    let sink = Arc::clone(&failures);
    SIGNALS.got_request_exception.connect(
        "lifecycle.failures",
        Arc::new(move |event: &GotRequestException| {
            if event.path.starts_with("/lifecycle/") {
                sink.lock().unwrap().push(event.error.clone());
            }
            None
        }),
    );
    let counter = Arc::clone(&finished);
    SIGNALS.request_finished.connect(
        "lifecycle.finished",
        Arc::new(move |_: &RequestFinished| {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        }),
    );

    SIGNALS.request_started.send(&RequestStarted {
        path: "/lifecycle/a/".to_string(),
    });
    SIGNALS.got_request_exception.send(&GotRequestException {
        path: "/lifecycle/a/".to_string(),
        error: "boom".to_string(),
    });
    SIGNALS.request_finished.send(&RequestFinished);

    assert_eq!(*started.lock().unwrap(), vec!["/lifecycle/a/"]);
    assert_eq!(*failures.lock().unwrap(), vec!["boom"]);
    assert!(finished.load(Ordering::SeqCst) >= 1);

    assert!(SIGNALS.request_started.disconnect("lifecycle.started"));
    assert!(SIGNALS.got_request_exception.disconnect("lifecycle.failures"));
    assert!(SIGNALS.request_finished.disconnect("lifecycle.finished"));
}

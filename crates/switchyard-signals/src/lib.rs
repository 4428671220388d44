//! # switchyard-signals
//!
//! Process-wide notifications emitted by the dispatch pipeline: a request
//! started, a response was closed, and an otherwise-uncaught failure reached
//! the 500 path. Observability layers connect receivers here without the
//! pipeline depending on them.
//!
//! ## Usage
//!
//! ```
//! use switchyard_signals::Signal;
//! use std::sync::Arc;
//!
//! struct CacheCleared;
//!
//! let signal: Signal<CacheCleared> = Signal::new();
//! signal.connect("audit", Arc::new(|_: &CacheCleared| None));
//!
//! assert_eq!(signal.send(&CacheCleared).len(), 1);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

/// A receiver callback. Its return value is handed back to the sender.
pub type SignalReceiver<T> = Arc<dyn Fn(&T) -> Option<Box<dyn Any + Send>> + Send + Sync>;

struct Connection<T: 'static> {
    id: String,
    receiver: SignalReceiver<T>,
}

/// A named-receiver notification channel carrying payloads of type `T`.
///
/// Receivers run in connection order. Connecting under an id that is
/// already present swaps the callback in place.
pub struct Signal<T: 'static> {
    connections: RwLock<Vec<Connection<T>>>,
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("receivers", &self.receiver_count()).finish()
    }
}

impl<T: 'static> Signal<T> {
    /// A signal with nobody listening.
    pub const fn new() -> Self {
        Self {
            connections: RwLock::new(Vec::new()),
        }
    }

    /// Connects `receiver` under `receiver_id`.
    pub fn connect(&self, receiver_id: impl Into<String>, receiver: SignalReceiver<T>) {
        let id = receiver_id.into();
        let mut connections = self.connections.write().expect("signal lock poisoned");
        match connections.iter_mut().find(|c| c.id == id) {
            Some(existing) => existing.receiver = receiver,
            None => connections.push(Connection { id, receiver }),
        }
    }

    /// Removes the receiver connected under `receiver_id`, reporting whether
    /// there was one.
    pub fn disconnect(&self, receiver_id: &str) -> bool {
        let mut connections = self.connections.write().expect("signal lock poisoned");
        let before = connections.len();
        connections.retain(|c| c.id != receiver_id);
        connections.len() != before
    }

    /// Calls every receiver with `payload` and collects what they return.
    ///
    /// The receiver list is snapshotted first, so a receiver may connect or
    /// disconnect others without deadlocking; such changes apply from the
    /// next send.
    pub fn send(&self, payload: &T) -> Vec<Option<Box<dyn Any + Send>>> {
        let receivers: Vec<SignalReceiver<T>> = self
            .connections
            .read()
            .expect("signal lock poisoned")
            .iter()
            .map(|c| Arc::clone(&c.receiver))
            .collect();
        receivers.iter().map(|receiver| receiver(payload)).collect()
    }

    /// How many receivers are connected.
    pub fn receiver_count(&self) -> usize {
        self.connections.read().expect("signal lock poisoned").len()
    }
}

/// Payload of [`SignalRegistry::request_started`].
#[derive(Debug, Clone)]
pub struct RequestStarted {
    /// The request path.
    pub path: String,
}

/// Payload of [`SignalRegistry::request_finished`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestFinished;

/// Payload of [`SignalRegistry::got_request_exception`].
#[derive(Debug, Clone)]
pub struct GotRequestException {
    /// The path of the request that failed.
    pub path: String,
    /// The rendered failure.
    pub error: String,
}

/// The request lifecycle signals.
#[derive(Debug, Default)]
pub struct SignalRegistry {
    /// Sent when the pipeline starts handling a request.
    pub request_started: Signal<RequestStarted>,
    /// Sent when a response is closed and its resources released.
    pub request_finished: Signal<RequestFinished>,
    /// Sent whenever a failure reaches uncaught-failure handling.
    pub got_request_exception: Signal<GotRequestException>,
}

/// The process-wide registry.
///
/// # Examples
///
/// ```
/// use switchyard_signals::{SIGNALS, GotRequestException};
/// use std::sync::Arc;
///
/// SIGNALS.got_request_exception.connect("reporter", Arc::new(|event: &GotRequestException| {
///     eprintln!("{} failed: {}", event.path, event.error);
///     None
/// }));
/// # SIGNALS.got_request_exception.disconnect("reporter");
/// ```
pub static SIGNALS: Lazy<SignalRegistry> = Lazy::new(SignalRegistry::default);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn counting(counter: &Arc<AtomicUsize>) -> SignalReceiver<u32> {
        let counter = Arc::clone(counter);
        Arc::new(move |_: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        })
    }

    #[test]
    fn test_send_reaches_receivers_in_connection_order() {
        let signal: Signal<u32> = Signal::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in ["x", "y", "z"] {
            let order = Arc::clone(&order);
            signal.connect(
                id,
                Arc::new(move |n: &u32| {
                    order.lock().unwrap().push(format!("{id}{n}"));
                    None
                }),
            );
        }

        assert_eq!(signal.send(&7).len(), 3);
        assert_eq!(*order.lock().unwrap(), vec!["x7", "y7", "z7"]);
    }

    #[test]
    fn test_reconnect_replaces_and_disconnect_removes() {
        let signal: Signal<u32> = Signal::default();
        let old = Arc::new(AtomicUsize::new(0));
        let new = Arc::new(AtomicUsize::new(0));

        signal.connect("counter", counting(&old));
        signal.connect("counter", counting(&new));
        signal.send(&1);
        assert_eq!((old.load(Ordering::SeqCst), new.load(Ordering::SeqCst)), (0, 1));
        assert_eq!(signal.receiver_count(), 1);

        assert!(signal.disconnect("counter"));
        assert!(!signal.disconnect("counter"));
        assert!(signal.send(&1).is_empty());
    }

    #[test]
    fn test_receiver_results_are_returned() {
        let signal: Signal<u32> = Signal::new();
        signal.connect("square", Arc::new(|n: &u32| Some(Box::new(n * n) as Box<dyn Any + Send>)));
        signal.connect("silent", Arc::new(|_: &u32| None));

        let results = signal.send(&9);
        assert_eq!(results[0].as_ref().and_then(|r| r.downcast_ref::<u32>()), Some(&81));
        assert!(results[1].is_none());
    }

    #[test]
    fn test_receiver_may_disconnect_during_send() {
        let signal = Arc::new(Signal::<u32>::new());
        let handle = Arc::clone(&signal);
        signal.connect(
            "once",
            Arc::new(move |_: &u32| {
                handle.disconnect("once");
                None
            }),
        );

        assert_eq!(signal.send(&0).len(), 1);
        assert!(signal.send(&0).is_empty());
    }

    #[test]
    fn test_global_registry_carries_request_payloads() {
        let paths = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&paths);
        SIGNALS.request_started.connect(
            "unit.started",
            Arc::new(move |event: &RequestStarted| {
                if event.path.starts_with("/unit/") {
                    sink.lock().unwrap().push(event.path.clone());
                }
                None
            }),
        );

        SIGNALS.request_started.send(&RequestStarted {
            path: "/unit/a/".to_string(),
        });
        SIGNALS.request_started.disconnect("unit.started");
        SIGNALS.request_started.send(&RequestStarted {
            path: "/unit/b/".to_string(),
        });
        assert_eq!(*paths.lock().unwrap(), vec!["/unit/a/"]);
    }
}

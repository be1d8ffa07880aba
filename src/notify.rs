//! Notification bus — synchronous fan-out of flag value transitions.
//!
//! The bus is owned by a flag [`crate::Database`]; there is no process-wide
//! observer list. Observers are called in registration order, once per real
//! transition.
//!
//! # Example
//!
//! ```ignore
//! let mut db = FlagDatabase::new();
//! let id = db.register_fn(|change| {
//!     println!("{} is now {}", change.name, change.value);
//! });
//! // ...
//! db.unregister(id);
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::{error, trace};

use crate::{HolderId, MarkerId};

/// A flag value transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlagChange<'a> {
    pub id: MarkerId,
    pub name: &'a str,
    pub holder: HolderId,
    pub holder_name: &'a str,
    /// The value after the transition.
    pub value: bool,
}

/// Receives flag transitions.
pub trait FlagObserver: Send + Sync {
    fn on_flag_changed(&mut self, change: &FlagChange<'_>);
}

impl<F> FlagObserver for F
where
    F: FnMut(&FlagChange<'_>) + Send + Sync,
{
    #[inline]
    fn on_flag_changed(&mut self, change: &FlagChange<'_>) {
        self(change)
    }
}

/// Handle returned by registration; used to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// What happens when an observer panics during delivery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ObserverPanicPolicy {
    /// Catch the panic, log it, and keep delivering to the remaining observers.
    #[default]
    Isolate,
    /// Let the panic unwind out of the mutating call; later observers are skipped.
    Propagate,
}

/// Observer storage a database carries, chosen per marker kind.
///
/// Kinds whose values never transition (tags) use `()`.
pub trait ObserverSlot: Default + fmt::Debug + Send + Sync + 'static {
    fn with_policy(policy: ObserverPanicPolicy) -> Self;
}

impl ObserverSlot for () {
    fn with_policy(_: ObserverPanicPolicy) -> Self {}
}

impl ObserverSlot for ChangeBus {
    fn with_policy(policy: ObserverPanicPolicy) -> Self {
        Self::new(policy)
    }
}

/// Ordered list of observers.
#[derive(Default)]
pub struct ChangeBus {
    observers: Vec<(ObserverId, Box<dyn FlagObserver>)>,
    next_id: u64,
    policy: ObserverPanicPolicy,
}

impl ChangeBus {
    pub fn new(policy: ObserverPanicPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Add an observer. Registering the same logic twice delivers twice.
    pub fn register(&mut self, observer: impl FlagObserver + 'static) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns `true` if the observer was registered.
    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    #[inline]
    pub fn policy(&self) -> ObserverPanicPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: ObserverPanicPolicy) {
        self.policy = policy;
    }

    pub(crate) fn notify(&mut self, change: &FlagChange<'_>) {
        trace!(id = change.id, value = change.value, observers = self.observers.len(), "flag changed");
        for (id, observer) in &mut self.observers {
            match self.policy {
                ObserverPanicPolicy::Propagate => observer.on_flag_changed(change),
                ObserverPanicPolicy::Isolate => {
                    let delivered = panic::catch_unwind(AssertUnwindSafe(|| observer.on_flag_changed(change)));
                    if let Err(payload) = delivered {
                        error!(
                            observer = id.0,
                            flag = change.name,
                            "flag observer panicked: {}",
                            panic_message(payload.as_ref())
                        );
                    }
                }
            }
        }
    }
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBus")
            .field("observers", &self.observers.len())
            .field("policy", &self.policy)
            .finish()
    }
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn change(value: bool) -> FlagChange<'static> {
        FlagChange {
            id: 1,
            name: "DoorOpen",
            holder: 1,
            holder_name: "World",
            value,
        }
    }

    type Log = Arc<Mutex<Vec<(&'static str, bool)>>>;

    fn recorder(log: &Log, tag: &'static str) -> impl FnMut(&FlagChange<'_>) + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |c| log.lock().unwrap().push((tag, c.value))
    }

    fn explode(_: &FlagChange<'_>) {
        panic!("bad observer")
    }

    #[test]
    fn delivers_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = ChangeBus::default();
        bus.register(recorder(&log, "first"));
        bus.register(recorder(&log, "second"));

        bus.notify(&change(true));
        assert_eq!(*log.lock().unwrap(), [("first", true), ("second", true)]);
    }

    #[test]
    fn duplicate_registration_delivers_twice() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = ChangeBus::default();
        let a = bus.register(recorder(&log, "x"));
        let b = bus.register(recorder(&log, "x"));
        assert_ne!(a, b);

        bus.notify(&change(false));
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn unregister_removes_only_that_observer() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = ChangeBus::default();
        let a = bus.register(recorder(&log, "a"));
        bus.register(recorder(&log, "b"));

        assert!(bus.unregister(a));
        assert!(!bus.unregister(a));
        bus.notify(&change(true));
        assert_eq!(*log.lock().unwrap(), [("b", true)]);
    }

    #[test]
    fn isolate_policy_keeps_delivering_after_panic() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = ChangeBus::new(ObserverPanicPolicy::Isolate);
        bus.register(explode);
        bus.register(recorder(&log, "after"));

        bus.notify(&change(true));
        assert_eq!(*log.lock().unwrap(), [("after", true)]);
        // The panicking observer stays registered
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn propagate_policy_unwinds() {
        let mut bus = ChangeBus::new(ObserverPanicPolicy::Propagate);
        bus.register(explode);

        let result = panic::catch_unwind(AssertUnwindSafe(|| bus.notify(&change(true))));
        assert!(result.is_err());
    }

    #[test]
    fn panic_message_extracts_strings() {
        let boxed: Box<dyn Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "<non-string panic payload>");
    }
}

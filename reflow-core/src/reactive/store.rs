//! Versioned Store
//!
//! The store is the authoritative `key -> value` map shared by every
//! reactive node on a surface. Each key carries a monotonically increasing
//! version counter and a registry of change subscribers.
//!
//! # How the Store Works
//!
//! 1. Reading a key returns a clone of its value and, as a side effect,
//!    records the key in the active tracking context (if any).
//!
//! 2. Writing a key replaces its value wholesale, bumps the key's version,
//!    then synchronously notifies every live subscriber for that key.
//!
//! 3. Subscribers live in a per-key slot arena: a dense array with stable
//!    indices. Removal marks the slot free rather than shifting, so handles
//!    stay valid across churn and notification never invalidates iteration.
//!
//! # Absent Keys
//!
//! A key that was never written is not an error: reads return `None` and
//! the version is 0. Subscribing to an absent key is allowed; the
//! subscriber fires on the key's first write.

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use smallvec::SmallVec;

use super::tracking::{self, StateKey};

type NotifyFn = Arc<dyn Fn() + Send + Sync>;

/// One occupied subscriber slot.
struct Slot {
    /// Stamp matching the handle this slot was issued to. A handle whose
    /// token no longer matches (the slot was freed and reused) unsubscribes
    /// nothing.
    token: u64,
    notify: NotifyFn,
}

/// Handle returned by [`StateStore::subscribe`].
///
/// Unsubscribing twice, or with a handle whose slot has since been reused,
/// is a no-op.
#[derive(Debug)]
pub struct SubscriberHandle {
    key: StateKey,
    slot: usize,
    token: u64,
}

impl SubscriberHandle {
    /// The key this handle subscribes to.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Per-key state: the value, its version counter, and the subscriber arena.
struct KeyState<V> {
    value: Option<V>,
    version: u64,
    slots: SmallVec<[Option<Slot>; 2]>,
    free: SmallVec<[usize; 2]>,
}

impl<V> Default for KeyState<V> {
    fn default() -> Self {
        Self {
            value: None,
            version: 0,
            slots: SmallVec::new(),
            free: SmallVec::new(),
        }
    }
}

struct StoreInner<V> {
    keys: IndexMap<StateKey, KeyState<V>>,
    next_token: u64,
}

/// A versioned key-value store with per-key subscription.
///
/// Cloning the store yields another handle to the same shared state, like
/// cloning a channel sender.
///
/// # Example
///
/// ```rust,ignore
/// let store: StateStore<i64> = StateStore::new();
/// store.write("counter", 1);
/// assert_eq!(store.read("counter"), Some(1));
/// assert_eq!(store.version("counter"), 1);
/// ```
pub struct StateStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<RwLock<StoreInner<V>>>,
}

impl<V> StateStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                keys: IndexMap::new(),
                next_token: 0,
            })),
        }
    }

    /// Get the current value of `key`, or `None` if it was never written.
    ///
    /// If a tracking scope is active on this thread, the key is recorded as
    /// a dependency of the current evaluation, including reads of absent
    /// keys, so a node re-evaluates once the key is first written.
    pub fn read(&self, key: &str) -> Option<V> {
        tracking::track(key);
        self.read_untracked(key)
    }

    /// Get the current value of `key` without recording a dependency.
    pub fn read_untracked(&self, key: &str) -> Option<V> {
        self.inner
            .read()
            .keys
            .get(key)
            .and_then(|state| state.value.clone())
    }

    /// Get the version counter of `key`. Absent keys have version 0.
    pub fn version(&self, key: &str) -> u64 {
        self.inner.read().keys.get(key).map_or(0, |state| state.version)
    }

    /// Replace the value of `key`, bump its version, and notify every
    /// current subscriber for that key.
    ///
    /// The write completes (value and version updated, store lock released)
    /// before any subscriber runs; each subscriber is notified at most once
    /// per write, in unspecified order.
    pub fn write(&self, key: &str, value: V) {
        let to_notify: Vec<NotifyFn> = {
            let mut inner = self.inner.write();
            let state = inner.keys.entry(key.to_owned()).or_default();
            state.value = Some(value);
            state.version += 1;
            tracing::debug!(key, version = state.version, "store write");

            state
                .slots
                .iter()
                .flatten()
                .map(|slot| Arc::clone(&slot.notify))
                .collect()
        };

        for notify in to_notify {
            notify();
        }
    }

    /// Register `notify` to run on every future write to `key`.
    pub fn subscribe<F>(&self, key: &str, notify: F) -> SubscriberHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        inner.next_token += 1;
        let token = inner.next_token;

        let state = inner.keys.entry(key.to_owned()).or_default();
        let slot = Slot {
            token,
            notify: Arc::new(notify),
        };

        let index = match state.free.pop() {
            Some(index) => {
                state.slots[index] = Some(slot);
                index
            }
            None => {
                state.slots.push(Some(slot));
                state.slots.len() - 1
            }
        };

        tracing::trace!(key, slot = index, "subscribed");
        SubscriberHandle {
            key: key.to_owned(),
            slot: index,
            token,
        }
    }

    /// Remove the subscriber registered under `handle`.
    ///
    /// Stale or repeated unsubscribes are no-ops.
    pub fn unsubscribe(&self, handle: &SubscriberHandle) {
        let mut inner = self.inner.write();
        let Some(state) = inner.keys.get_mut(&handle.key) else {
            return;
        };

        let occupied = state
            .slots
            .get(handle.slot)
            .and_then(|slot| slot.as_ref())
            .is_some_and(|slot| slot.token == handle.token);

        if occupied {
            state.slots[handle.slot] = None;
            state.free.push(handle.slot);
            tracing::trace!(key = %handle.key, slot = handle.slot, "unsubscribed");
        }
    }

    /// Number of live subscribers for `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .read()
            .keys
            .get(key)
            .map_or(0, |state| state.slots.iter().flatten().count())
    }

    /// Number of keys that have ever been written or subscribed to.
    pub fn key_count(&self) -> usize {
        self.inner.read().keys.len()
    }
}

impl<V> Default for StateStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for StateStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Debug for StateStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("key_count", &self.key_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::tracking::TrackingScope;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn read_and_write() {
        let store: StateStore<i64> = StateStore::new();
        assert_eq!(store.read("counter"), None);

        store.write("counter", 42);
        assert_eq!(store.read("counter"), Some(42));

        store.write("counter", 7);
        assert_eq!(store.read("counter"), Some(7));
    }

    #[test]
    fn absent_key_has_version_zero() {
        let store: StateStore<i64> = StateStore::new();
        assert_eq!(store.version("missing"), 0);
        assert_eq!(store.read("missing"), None);
    }

    #[test]
    fn versions_increase_monotonically() {
        let store: StateStore<i64> = StateStore::new();

        // Interleave writes to two keys; each counter advances independently.
        let mut last_a = store.version("a");
        let mut last_b = store.version("b");
        for i in 0..10 {
            store.write("a", i);
            let a = store.version("a");
            assert!(a > last_a);
            last_a = a;

            store.write("b", i * 2);
            let b = store.version("b");
            assert!(b > last_b);
            last_b = b;
        }

        assert_eq!(store.version("a"), 10);
        assert_eq!(store.version("b"), 10);
    }

    #[test]
    fn write_notifies_subscribers() {
        let store: StateStore<i64> = StateStore::new();
        let calls = Arc::new(AtomicI32::new(0));

        let calls_clone = calls.clone();
        let _handle = store.subscribe("counter", move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store.write("counter", 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.write("counter", 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Writes to other keys do not fire this subscriber.
        store.write("other", 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_notification() {
        let store: StateStore<i64> = StateStore::new();
        let calls = Arc::new(AtomicI32::new(0));

        let calls_clone = calls.clone();
        let handle = store.subscribe("counter", move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.write("counter", 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.unsubscribe(&handle);
        store.write("counter", 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Double unsubscribe is a no-op.
        store.unsubscribe(&handle);
        store.write("counter", 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_handle_does_not_evict_reused_slot() {
        let store: StateStore<i64> = StateStore::new();
        let calls = Arc::new(AtomicI32::new(0));

        let old = store.subscribe("k", || {});
        store.unsubscribe(&old);

        // The freed slot is reused by the next subscriber.
        let calls_clone = calls.clone();
        let _live = store.subscribe("k", move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        // The stale handle must not unsubscribe the new occupant.
        store.unsubscribe(&old);
        store.write("k", 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribing_to_absent_key_fires_on_first_write() {
        let store: StateStore<i64> = StateStore::new();
        let calls = Arc::new(AtomicI32::new(0));

        let calls_clone = calls.clone();
        let _handle = store.subscribe("later", move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.write("later", 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tracked_read_records_dependency() {
        let store: StateStore<i64> = StateStore::new();
        store.write("seen", 1);

        let scope = TrackingScope::enable().unwrap();
        store.read("seen");
        store.read("absent");
        store.read_untracked("hidden");
        let keys = scope.finish();

        assert!(keys.contains("seen"));
        assert!(keys.contains("absent"));
        assert!(!keys.contains("hidden"));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn clone_shares_state() {
        let store1: StateStore<i64> = StateStore::new();
        let store2 = store1.clone();

        store1.write("shared", 5);
        assert_eq!(store2.read("shared"), Some(5));
        assert_eq!(store2.version("shared"), 1);
    }
}

//! Reactive Node
//!
//! A reactive node owns one render computation and its
//! evaluate/subscribe/re-evaluate lifecycle:
//!
//! 1. At construction, the computation's IR is passed through the capture
//!    validator. A non-free computation never becomes a node.
//!
//! 2. On each evaluation cycle, the node opens a tracking window, runs the
//!    computation against the store, and closes the window to obtain the
//!    set of keys actually read.
//!
//! 3. The node then diffs that set against its previous subscriptions:
//!    keys no longer read are unsubscribed, newly read keys are subscribed.
//!    Dependencies are recomputed from scratch every cycle, so conditional
//!    reads grow and shrink the subscription set to exactly what the last
//!    cycle observed.
//!
//! 4. Any subscribed key's write schedules a re-evaluation. Writes to keys
//!    the node never read do not touch it.
//!
//! # Construction vs. mount
//!
//! Construction never evaluates; the first cycle runs at [`mount`]. This
//! keeps nested nodes legal: an outer computation may *construct* an inner
//! node inside its own tracking window (construction reads nothing), and
//! the inner node's first evaluation happens at its own mount step, after
//! the outer window has closed. Tracking windows never overlap.
//!
//! # Failure
//!
//! A failing render computation releases the tracking window, keeps the
//! previous cycle's subscriptions (so a later state change can retry), and
//! surfaces the error for this node only. Sibling nodes and the store are
//! untouched.
//!
//! [`mount`]: ReactiveNode::mount

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::ir::{self, CaptureError, FnIr};

use super::store::{StateStore, SubscriberHandle};
use super::tracking::{self, StateKey, TrackingError};

/// A failure raised by the render computation during an evaluation cycle.
///
/// Recoverable and isolated per node: it never unwinds past the node
/// boundary and never corrupts the store or sibling nodes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EvalError {
    message: String,
}

impl EvalError {
    /// Create an evaluation error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Lifecycle phase of a reactive node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    /// Not yet mounted, unmounted, or the last cycle failed.
    Idle,
    /// An evaluation cycle is in flight.
    Evaluating,
    /// The last cycle succeeded; subscribed to its observed dependency set.
    Subscribed,
}

type RenderFn<V, T> = dyn Fn(&StateStore<V>) -> Result<T, EvalError> + Send + Sync;
type PublishFn<T> = dyn Fn(Result<&T, &EvalError>) + Send + Sync;

struct NodeInner<V, T>
where
    V: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    name: String,
    store: StateStore<V>,
    render: Box<RenderFn<V, T>>,

    /// Sink for the external rendering collaborator; receives every cycle's
    /// output or failure.
    publish: RwLock<Option<Arc<PublishFn<T>>>>,

    phase: Mutex<NodePhase>,
    /// Set by key-change notifications; drained by the evaluation loop so
    /// notifications arriving mid-cycle coalesce into one follow-up cycle.
    pending: Mutex<bool>,
    mounted: AtomicBool,

    /// Keys observed by the last successful cycle.
    dependencies: RwLock<HashSet<StateKey>>,
    /// One live store subscription per dependency key.
    subscriptions: Mutex<HashMap<StateKey, SubscriberHandle>>,

    output: RwLock<Option<T>>,
    error: RwLock<Option<EvalError>>,
}

impl<V, T> NodeInner<V, T>
where
    V: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Run evaluation cycles until no notification is pending.
    fn drain(this: &Arc<Self>) -> Result<(), TrackingError> {
        while this.take_pending() {
            Self::run_cycle(this)?;
        }
        Ok(())
    }

    fn take_pending(&self) -> bool {
        std::mem::replace(&mut *self.pending.lock(), false)
    }

    /// One evaluation cycle: track, render, re-subscribe, publish.
    fn run_cycle(this: &Arc<Self>) -> Result<(), TrackingError> {
        *this.phase.lock() = NodePhase::Evaluating;
        tracing::trace!(node = %this.name, "evaluation cycle");

        let tracked = tracking::with_tracking(|| (this.render)(&this.store));
        let (result, observed) = match tracked {
            Ok(pair) => pair,
            Err(err) => {
                // Overlapping tracking windows mean a nested evaluation was
                // not routed through its own mount step.
                *this.phase.lock() = NodePhase::Idle;
                tracing::error!(node = %this.name, %err, "evaluation aborted");
                return Err(err);
            }
        };

        match result {
            Ok(value) => {
                Self::resubscribe(this, observed);
                *this.error.write() = None;
                *this.output.write() = Some(value.clone());
                *this.phase.lock() = NodePhase::Subscribed;

                // Clone the sink out before calling it so the lock is not
                // held across user code (the sink may call on_publish).
                let publish = this.publish.read().clone();
                if let Some(publish) = publish {
                    publish(Ok(&value));
                }
            }
            Err(err) => {
                // Keep the previous cycle's subscriptions so the node can
                // still retry when state changes again.
                tracing::debug!(node = %this.name, error = %err, "render computation failed");
                *this.error.write() = Some(err.clone());
                *this.phase.lock() = NodePhase::Idle;

                let publish = this.publish.read().clone();
                if let Some(publish) = publish {
                    publish(Err(&err));
                }
            }
        }

        Ok(())
    }

    /// Diff the observed dependency set against the current subscriptions.
    fn resubscribe(this: &Arc<Self>, observed: HashSet<StateKey>) {
        let mut subs = this.subscriptions.lock();

        let stale: Vec<StateKey> = subs
            .keys()
            .filter(|key| !observed.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(handle) = subs.remove(&key) {
                this.store.unsubscribe(&handle);
                tracing::trace!(node = %this.name, key = %key, "dependency dropped");
            }
        }

        for key in &observed {
            if !subs.contains_key(key) {
                let weak = Arc::downgrade(this);
                let handle = this.store.subscribe(key, move || {
                    if let Some(node) = weak.upgrade() {
                        Self::on_key_changed(&node);
                    }
                });
                subs.insert(key.clone(), handle);
                tracing::trace!(node = %this.name, key = %key, "dependency added");
            }
        }
        drop(subs);

        *this.dependencies.write() = observed;
    }

    /// A subscribed key was written.
    fn on_key_changed(this: &Arc<Self>) {
        if !this.mounted.load(Ordering::SeqCst) {
            return;
        }

        {
            let phase = this.phase.lock();
            let mut pending = this.pending.lock();
            *pending = true;
            if *phase == NodePhase::Evaluating {
                // The in-flight cycle's drain loop picks this up.
                return;
            }
        }

        if let Err(err) = Self::drain(this) {
            tracing::error!(node = %this.name, %err, "re-evaluation dropped");
        }
    }

    fn release_subscriptions(&self) {
        let mut subs = self.subscriptions.lock();
        for (_, handle) in subs.drain() {
            tracing::trace!(node = %self.name, key = handle.key(), "subscription released");
            self.store.unsubscribe(&handle);
        }
        self.dependencies.write().clear();
    }
}

impl<V, T> Drop for NodeInner<V, T>
where
    V: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.release_subscriptions();
    }
}

/// The owner of one render computation's reactive lifecycle.
///
/// Cloning yields another handle to the same node.
///
/// # Example
///
/// ```rust,ignore
/// let store: StateStore<i64> = StateStore::new();
/// store.write("counter", 0);
///
/// let node = ReactiveNode::new(&ir, store.clone(), |store| {
///     Ok(store.read("counter").unwrap_or(0) * 2)
/// })?;
/// node.mount()?;
///
/// assert_eq!(node.output(), Some(0));
/// store.write("counter", 5); // node re-evaluates
/// assert_eq!(node.output(), Some(10));
/// ```
pub struct ReactiveNode<V, T>
where
    V: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<NodeInner<V, T>>,
}

impl<V, T> ReactiveNode<V, T>
where
    V: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Create a node for the render computation described by `ir`, with
    /// `render` as its compiled form.
    ///
    /// Validates the IR first: a computation that captures bindings from an
    /// enclosing scope is rejected and no node is created. Construction
    /// never evaluates and never touches the store or the tracking context.
    pub fn new<F>(ir: &FnIr, store: StateStore<V>, render: F) -> Result<Self, CaptureError>
    where
        F: Fn(&StateStore<V>) -> Result<T, EvalError> + Send + Sync + 'static,
    {
        ir::validate(ir)?;

        Ok(Self {
            inner: Arc::new(NodeInner {
                name: ir.name.clone(),
                store,
                render: Box::new(render),
                publish: RwLock::new(None),
                phase: Mutex::new(NodePhase::Idle),
                pending: Mutex::new(false),
                mounted: AtomicBool::new(false),
                dependencies: RwLock::new(HashSet::new()),
                subscriptions: Mutex::new(HashMap::new()),
                output: RwLock::new(None),
                error: RwLock::new(None),
            }),
        })
    }

    /// Register the sink that receives every cycle's output or failure.
    ///
    /// This is the seam to the external rendering collaborator.
    pub fn on_publish<P>(&self, publish: P)
    where
        P: Fn(Result<&T, &EvalError>) + Send + Sync + 'static,
    {
        *self.inner.publish.write() = Some(Arc::new(publish));
    }

    /// Mount the node and run its first evaluation cycle.
    ///
    /// Must not be called inside another node's tracking window; nested
    /// nodes mount after the outer evaluation completes.
    pub fn mount(&self) -> Result<(), TrackingError> {
        self.inner.mounted.store(true, Ordering::SeqCst);
        *self.inner.pending.lock() = true;
        NodeInner::drain(&self.inner)
    }

    /// Force a re-evaluation cycle, e.g. when a pull-based host loop
    /// detects a stale [`snapshot`](Self::snapshot). No-op before mount.
    pub fn evaluate(&self) -> Result<(), TrackingError> {
        if !self.inner.mounted.load(Ordering::SeqCst) {
            return Ok(());
        }
        *self.inner.pending.lock() = true;
        NodeInner::drain(&self.inner)
    }

    /// Unmount the node: release every subscription and discard the
    /// dependency set. Further store writes no longer reach this node.
    pub fn unmount(&self) {
        self.inner.mounted.store(false, Ordering::SeqCst);
        self.inner.release_subscriptions();
        *self.inner.phase.lock() = NodePhase::Idle;
        tracing::debug!(node = %self.inner.name, "unmounted");
    }

    /// The node's display name (from its IR).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> NodePhase {
        *self.inner.phase.lock()
    }

    /// Whether the node is mounted.
    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::SeqCst)
    }

    /// Output of the last successful cycle.
    pub fn output(&self) -> Option<T> {
        self.inner.output.read().clone()
    }

    /// Error of the last cycle, if it failed. Cleared by a later success.
    pub fn last_error(&self) -> Option<EvalError> {
        self.inner.error.read().clone()
    }

    /// Keys observed by the last successful cycle.
    pub fn dependencies(&self) -> HashSet<StateKey> {
        self.inner.dependencies.read().clone()
    }

    /// Per-key version snapshot of the current dependency set, as
    /// `key:version` pairs sorted by key and joined with `;`.
    ///
    /// A pull-based external render loop can compare snapshots to detect
    /// when this node's inputs changed without this crate depending on any
    /// particular loop implementation.
    pub fn snapshot(&self) -> String {
        let deps = self.inner.dependencies.read();
        let mut keys: Vec<&StateKey> = deps.iter().collect();
        keys.sort();

        keys.iter()
            .map(|key| format!("{key}:{}", self.inner.store.version(key)))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl<V, T> Clone for ReactiveNode<V, T>
where
    V: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, T> Debug for ReactiveNode<V, T>
where
    V: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveNode")
            .field("name", &self.inner.name)
            .field("phase", &self.phase())
            .field("mounted", &self.is_mounted())
            .field("dependency_count", &self.inner.dependencies.read().len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

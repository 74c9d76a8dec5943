//! Dependency Tracking
//!
//! The tracking context records which state keys a render computation reads
//! during one evaluation. This enables automatic dependency discovery: when a
//! store key is read, the active context accumulates it, and the owning node
//! subscribes to exactly the keys that were touched.
//!
//! # Implementation
//!
//! We use a thread-local slot holding the accumulator for the currently
//! executing evaluation. Unlike a context *stack*, the slot is deliberately
//! non-nestable: at most one evaluation may track at a time on a thread.
//! Nested reactive nodes defer their first evaluation to their own mount
//! step, which runs after the outer scope has been released (see
//! [`ReactiveNode`](super::node::ReactiveNode)).
//!
//! The [`TrackingScope`] guard releases the slot on every exit path,
//! including when the render computation fails mid-evaluation. Prefer the
//! [`with_tracking`] combinator over manual scope handling; it makes the
//! leak class unrepresentable.

use std::cell::RefCell;
use std::collections::HashSet;

use thiserror::Error;

/// A state key names one slot of shared state in a
/// [`StateStore`](super::store::StateStore).
///
/// Keys are opaque strings, globally unique within one store instance.
pub type StateKey = String;

thread_local! {
    /// The accumulator for the evaluation currently tracking on this thread.
    ///
    /// `None` means no evaluation is tracking; reads are then untracked
    /// no-ops rather than errors, so plain non-reactive code can share the
    /// same read primitive.
    static ACTIVE: RefCell<Option<HashSet<StateKey>>> = RefCell::new(None);
}

/// Errors raised by the tracking context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackingError {
    /// A tracking scope was enabled while another one was still active on
    /// the same thread.
    ///
    /// This signals a broken invariant in the caller (a forgotten release,
    /// or a nested evaluation that was not routed through its own mount
    /// step). It is surfaced loudly rather than silently merged.
    #[error("a tracking scope is already active on this thread")]
    AlreadyTracking,
}

/// Guard for one tracking window.
///
/// Created by [`TrackingScope::enable`], consumed by
/// [`TrackingScope::finish`]. Dropping an unfinished scope (early return,
/// panic) still uninstalls the accumulator so the next evaluation starts
/// clean.
#[derive(Debug)]
pub struct TrackingScope {
    finished: bool,
}

impl TrackingScope {
    /// Install an empty accumulator and begin tracking on this thread.
    ///
    /// Fails with [`TrackingError::AlreadyTracking`] if a scope is already
    /// active; tracking windows must never overlap.
    pub fn enable() -> Result<Self, TrackingError> {
        ACTIVE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                tracing::error!("tracking scope enabled while another is active");
                return Err(TrackingError::AlreadyTracking);
            }
            *slot = Some(HashSet::new());
            Ok(Self { finished: false })
        })
    }

    /// Stop tracking and return the set of keys read during this window.
    pub fn finish(mut self) -> HashSet<StateKey> {
        self.finished = true;
        ACTIVE
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_default()
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        if !self.finished {
            ACTIVE.with(|slot| {
                slot.borrow_mut().take();
            });
        }
    }
}

/// Record a key read in the active accumulator, if any.
///
/// Called by the store on every tracked read. A read outside any tracking
/// window is a silent no-op.
pub fn track(key: &str) {
    ACTIVE.with(|slot| {
        if let Some(keys) = slot.borrow_mut().as_mut() {
            keys.insert(key.to_owned());
        }
    });
}

/// Check whether an evaluation is currently tracking on this thread.
pub fn is_tracking() -> bool {
    ACTIVE.with(|slot| slot.borrow().is_some())
}

/// Run `f` inside a tracking window and return its result together with the
/// set of keys it read.
///
/// The window is released on every exit path, so a failing computation never
/// leaks tracking state into the next evaluation.
pub fn with_tracking<T>(
    f: impl FnOnce() -> T,
) -> Result<(T, HashSet<StateKey>), TrackingError> {
    let scope = TrackingScope::enable()?;
    let value = f();
    Ok((value, scope.finish()))
}

//! Reactive Primitives
//!
//! This module implements the re-computation core: dependency tracking, the
//! versioned state store, and reactive nodes.
//!
//! # Concepts
//!
//! ## Versioned Store
//!
//! A [`StateStore`] maps string keys to opaque values. Every write bumps
//! the key's version and notifies that key's subscribers; reads inside a
//! tracking window are recorded as dependencies of the current evaluation.
//!
//! ## Tracking
//!
//! While a [`TrackingScope`] is active on a thread, every store read is
//! attributed to the evaluation that opened it. The scope is deliberately
//! non-nestable; nested evaluations run after the outer one releases its
//! window.
//!
//! ## Reactive Nodes
//!
//! A [`ReactiveNode`] wraps one render computation. On each cycle it tracks
//! the computation's reads, re-subscribes to exactly the keys observed, and
//! re-evaluates when any of them is written, independently of unrelated
//! state changes elsewhere.
//!
//! # Implementation Notes
//!
//! The tracking context lives in a thread-local slot. This design
//! (sometimes called "automatic dependency tracking") is used by SolidJS,
//! Vue 3, and Leptos; unlike those systems the slot here holds at most one
//! accumulator, which keeps attribution unambiguous at the cost of
//! requiring nested nodes to defer their first evaluation to mount time.

mod node;
mod store;
mod tracking;

pub use node::{EvalError, NodePhase, ReactiveNode};
pub use store::{StateStore, SubscriberHandle};
pub use tracking::{is_tracking, track, with_tracking, StateKey, TrackingError, TrackingScope};

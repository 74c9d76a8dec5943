//! Reflow Core
//!
//! This crate provides the re-computation core for the Reflow reactive
//! rendering engine. It implements:
//!
//! - A versioned key-value store with per-key subscription
//! - Automatic dependency tracking for render computations
//! - Static rejection of render computations that capture parent scope
//! - Reactive nodes that re-evaluate only when their observed keys change
//!
//! The declarative component-tree model, the renderer, and the expression
//! compiler are external collaborators: this crate only decides *when* a
//! render computation re-runs and *what* it depended on.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: tracking context, versioned store, and reactive nodes
//! - `ir`: the render-function IR and its capture validator
//!
//! # Example
//!
//! ```rust,ignore
//! use reflow_core::ir::FnIr;
//! use reflow_core::reactive::{ReactiveNode, StateStore};
//!
//! let store: StateStore<i64> = StateStore::new();
//! store.write("counter", 0);
//!
//! // The IR comes from the expression compiler; `render` is its compiled
//! // form. Construction validates that the computation is capture-free.
//! let node = ReactiveNode::new(&ir, store.clone(), |store| {
//!     Ok(store.read("counter").unwrap_or(0) * 2)
//! })?;
//!
//! node.mount()?;
//! assert_eq!(node.output(), Some(0));
//!
//! store.write("counter", 5);
//! // The node re-evaluated: it was subscribed to exactly {"counter"}.
//! assert_eq!(node.output(), Some(10));
//! ```

pub mod ir;
pub mod reactive;

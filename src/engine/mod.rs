// src/engine/mod.rs

//! Execution engine for task trees.
//!
//! - [`tree`] is the public [`TaskTree`] handle.
//! - [`core`] is the start / child-done / stop state machine.
//! - [`runtime`] holds the live per-run nodes and storage scoping.
//! - [`signal`] is the completion channel handed to task adapters.
//! - [`events`] holds observer lists and the [`TreeEvent`] channel view.
//! - [`guard`] is the reentrancy lock counter.

pub(crate) mod core;
pub mod events;
pub mod guard;
pub(crate) mod runtime;
pub mod signal;
pub mod tree;

pub use events::TreeEvent;
pub use guard::{Guard, GuardLocker};
pub use signal::DoneSignal;
pub use tree::TaskTree;

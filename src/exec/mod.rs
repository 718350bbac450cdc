// src/exec/mod.rs

//! Ready-made task adapters and ways to drive a tree.
//!
//! - [`timeout`]: [`TimeoutTask`] and the [`with_timeout`] wrapper.
//! - [`nested`]: [`TaskTreeTask`], a whole tree used as one task.
//! - [`process`]: [`ProcessTask`], a shell command run with `tokio::process`.
//! - [`runner`]: [`TaskTreeRunner`], owner of one tree at a time.
//! - [`blocking`]: [`run_blocking`] for synchronous callers.
//!
//! Adapters that spawn work use `tokio::task::spawn_local`; their trees must
//! be started inside a `LocalSet`, otherwise `start()` panics.

pub mod blocking;
pub mod nested;
pub mod process;
pub mod runner;
pub mod timeout;

pub use blocking::run_blocking;
pub use nested::TaskTreeTask;
pub use process::ProcessTask;
pub use runner::TaskTreeRunner;
pub use timeout::{TimeoutTask, with_timeout, with_timeout_handler};

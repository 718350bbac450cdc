// src/recipe/mod.rs

//! Declarative description of a task tree.
//!
//! - [`group`] holds [`Group`], [`GroupItem`] and the attribute builders.
//! - [`task`] holds the [`TaskAdapter`] boundary and [`CustomTask`].
//! - [`desc`] is the compiled form consumed by the engine.

pub(crate) mod desc;
pub mod group;
pub mod task;

pub use group::{
    Group, GroupData, GroupItem, continue_on_done, continue_on_error, finish_all_and_done,
    finish_all_and_error, on_group_done, on_group_error, on_group_finished, on_group_setup,
    parallel, parallel_limit, sequential, stop_on_done, stop_on_error, stop_on_finished, sync,
    workflow_policy,
};
pub use task::{CustomTask, IntoDoneResult, IntoSetupResult, TaskAdapter, TaskHandler};

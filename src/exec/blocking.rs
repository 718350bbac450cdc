// src/exec/blocking.rs

//! Run a recipe to completion from synchronous code.

use std::time::Duration;

use tokio::task::LocalSet;
use tracing::debug;

use crate::engine::TaskTree;
use crate::errors::{Result, TaskTreeError};
use crate::recipe::Group;
use crate::types::DoneWith;

use super::timeout::with_timeout;

/// Block the current thread until `recipe` finishes.
///
/// Builds a current-thread tokio runtime with a `LocalSet`, so adapters that
/// spawn local work (timers, processes, nested trees) can be used. With a
/// `timeout`, the recipe is wrapped by [`with_timeout`] and fails once it
/// elapses.
///
/// Must not be called from inside an async runtime.
pub fn run_blocking(recipe: Group, timeout: Option<Duration>) -> Result<DoneWith> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(TaskTreeError::Usage(
            "run_blocking() called from inside an async runtime".to_string(),
        ));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let recipe = match timeout {
        Some(timeout) => with_timeout(recipe, timeout),
        None => recipe,
    };

    let local = LocalSet::new();
    let result = local.block_on(&runtime, async move {
        let tree = TaskTree::with_recipe(recipe);
        tree.run().await
    });
    debug!(%result, "blocking run finished");
    Ok(result)
}

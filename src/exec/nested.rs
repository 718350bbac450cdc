// src/exec/nested.rs

//! A whole task tree used as a single task of another tree.

use tracing::{debug, error};

use crate::engine::{DoneSignal, TaskTree};
use crate::recipe::{Group, TaskAdapter};
use crate::types::DoneWith;

/// Runs a nested [`TaskTree`] and reports its outcome as its own.
///
/// The recipe is supplied from the outer task's setup handler:
///
/// ```ignore
/// CustomTask::<TaskTreeTask>::new().on_setup(|task| task.set_recipe(inner.clone()))
/// ```
///
/// The nested tree counts as one task in the outer tree. Starting without a
/// recipe reports an error. Dropping the adapter while the nested tree runs
/// stops it.
#[derive(Default)]
pub struct TaskTreeTask {
    recipe: Option<Group>,
    tree: Option<TaskTree>,
}

impl TaskTreeTask {
    pub fn set_recipe(&mut self, recipe: Group) {
        self.recipe = Some(recipe);
    }

    /// The nested tree, once started.
    pub fn tree(&self) -> Option<&TaskTree> {
        self.tree.as_ref()
    }
}

impl TaskAdapter for TaskTreeTask {
    fn start(&mut self, done: DoneSignal) {
        let Some(recipe) = self.recipe.take() else {
            error!("TaskTreeTask started without a recipe");
            done.emit(false);
            return;
        };
        let tree = TaskTree::with_recipe(recipe);
        debug!(task_count = tree.task_count(), "starting nested task tree");
        tree.on_done(move |result| done.emit(result == DoneWith::Success));
        let tree = self.tree.insert(tree);
        tree.start();
    }
}

impl Drop for TaskTreeTask {
    fn drop(&mut self) {
        if let Some(tree) = self.tree.as_ref().filter(|tree| tree.is_running()) {
            tree.stop();
        }
    }
}

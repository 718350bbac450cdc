// src/exec/runner.rs

//! Owner of at most one task tree at a time.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::engine::TaskTree;
use crate::recipe::Group;
use crate::types::DoneWith;

/// Keeps the current tree alive while it runs and replaces it on every
/// [`start`](Self::start).
///
/// Starting while a previous tree is still running drops that tree without
/// running any of its handlers.
#[derive(Default)]
pub struct TaskTreeRunner {
    current: Rc<RefCell<Option<TaskTree>>>,
}

impl TaskTreeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.current
            .borrow()
            .as_ref()
            .is_some_and(TaskTree::is_running)
    }

    /// Run `recipe` in a fresh tree.
    ///
    /// `setup` sees the tree before it starts (to attach observers or storage
    /// handlers). `done` receives the outcome, after which the tree is
    /// released.
    pub fn start(
        &self,
        recipe: Group,
        setup: impl FnOnce(&TaskTree),
        done: impl Fn(DoneWith) + 'static,
    ) {
        let tree = TaskTree::with_recipe(recipe);
        setup(&tree);

        let slot = Rc::downgrade(&self.current);
        tree.on_done(move |result| {
            let finished = slot.upgrade().and_then(|slot| {
                let tree = slot.borrow_mut().take();
                tree
            });
            done(result);
            drop(finished);
        });

        let core = Rc::clone(&tree.core);
        let previous = self.current.borrow_mut().replace(tree);
        if previous.is_some() {
            debug!("replacing the previous task tree");
        }
        drop(previous);
        core.start();
    }

    /// Drop the current tree, if any, without running its handlers.
    pub fn reset(&self) {
        let previous = self.current.borrow_mut().take();
        drop(previous);
    }
}

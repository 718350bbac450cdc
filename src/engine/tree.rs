// src/engine/tree.rs

//! Public handle of a task tree.

use std::fmt;
use std::rc::Rc;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::recipe::Group;
use crate::storage::Storage;
use crate::types::DoneWith;

use super::core::{StorageHook, StorageHooks, TreeCore};
use super::events::TreeEvent;

/// Runs a [`Group`] recipe and reports started / progress / done.
///
/// A tree is single-threaded (`!Send`): every callback and every task
/// completion happens on the thread that owns it. Adapters that spawn work
/// (timers, processes, nested trees) need a tokio `LocalSet`.
///
/// ```ignore
/// let tree = TaskTree::with_recipe(recipe);
/// tree.on_done(|result| println!("finished: {result}"));
/// let result = tree.run().await;
/// ```
pub struct TaskTree {
    pub(crate) core: Rc<TreeCore>,
}

impl Default for TaskTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskTree {
    /// A tree without a recipe; see [`set_recipe`](Self::set_recipe).
    pub fn new() -> Self {
        Self {
            core: TreeCore::new(),
        }
    }

    pub fn with_recipe(recipe: Group) -> Self {
        let tree = Self::new();
        tree.core.set_recipe(&recipe);
        tree
    }

    /// Replace the recipe. Ignored (and logged) while running or when called
    /// from one of the tree's handlers.
    pub fn set_recipe(&self, recipe: Group) {
        self.core.set_recipe(&recipe);
    }

    /// Start a run. Ignored (and logged) when already running, when no
    /// recipe is set, or when called from one of the tree's handlers.
    ///
    /// Emits `started` and the initial progress before any task starts. A
    /// recipe that finishes synchronously emits `done` before this returns.
    pub fn start(&self) {
        let core = Rc::clone(&self.core);
        core.start();
    }

    /// Stop a running tree: running tasks get their error handlers, the
    /// remaining tasks are credited as progress, and `done(Cancel)` is
    /// emitted. A no-op when idle; ignored when called from a handler.
    pub fn stop(&self) {
        let core = Rc::clone(&self.core);
        core.stop();
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Number of leaf tasks in the recipe.
    pub fn task_count(&self) -> usize {
        self.core.task_count()
    }

    pub fn progress_value(&self) -> usize {
        self.core.progress_value()
    }

    pub fn progress_maximum(&self) -> usize {
        self.core.task_count()
    }

    pub fn on_started(&self, f: impl Fn() + 'static) {
        self.core.observers.add_started(Rc::new(f));
    }

    pub fn on_progress_value_changed(&self, f: impl Fn(usize) + 'static) {
        self.core.observers.add_progress(Rc::new(f));
    }

    /// Called once per run with its outcome.
    pub fn on_done(&self, f: impl Fn(DoneWith) + 'static) {
        self.core.observers.add_done(Rc::new(f));
    }

    /// Called once per run that ends with `Error` or `Cancel`, after `on_done`.
    pub fn on_error_occurred(&self, f: impl Fn() + 'static) {
        self.core.observers.add_error(Rc::new(f));
    }

    /// Called right after each instance of `storage` is created in this tree.
    pub fn on_storage_setup<T: 'static>(&self, storage: &Storage<T>, f: impl Fn(&mut T) + 'static) {
        let slot = storage.clone();
        let hook: StorageHook = Rc::new(move |id: usize| {
            slot.with_instance_mut(id, |value| f(value));
        });
        let mut hooks = self.core.storage_hooks.borrow_mut();
        let entry = hooks.entry(storage.handle()).or_insert_with(StorageHooks::default);
        if entry.setup.is_some() {
            warn!("storage setup handler redefined; the last one wins");
        }
        entry.setup = Some(hook);
    }

    /// Called right before each instance of `storage` is destroyed in this
    /// tree, when its group ended or was stopped.
    pub fn on_storage_done<T: 'static>(&self, storage: &Storage<T>, f: impl Fn(&T) + 'static) {
        let slot = storage.clone();
        let hook: StorageHook = Rc::new(move |id: usize| {
            slot.with_instance(id, |value| f(value));
        });
        let mut hooks = self.core.storage_hooks.borrow_mut();
        let entry = hooks.entry(storage.handle()).or_insert_with(StorageHooks::default);
        if entry.done.is_some() {
            warn!("storage done handler redefined; the last one wins");
        }
        entry.done = Some(hook);
    }

    /// Channel view of the notifications of every future run.
    pub fn events(&self) -> mpsc::UnboundedReceiver<TreeEvent> {
        self.core.observers.subscribe()
    }

    /// Start the tree and wait for its outcome.
    ///
    /// Returns `Error` right away if the tree could not be started, and
    /// `Cancel` if the tree was dropped before finishing.
    pub async fn run(&self) -> DoneWith {
        let (tx, rx) = oneshot::channel();
        self.core.waiters.borrow_mut().push(tx);
        let core = Rc::clone(&self.core);
        if !core.start() {
            self.core.waiters.borrow_mut().pop();
            return DoneWith::Error;
        }
        rx.await.unwrap_or(DoneWith::Cancel)
    }
}

impl Drop for TaskTree {
    fn drop(&mut self) {
        if self.core.guard.is_locked() && self.core.is_running() {
            warn!("running TaskTree dropped from one of its own handlers");
        }
    }
}

impl fmt::Debug for TaskTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskTree")
            .field("has_recipe", &self.core.has_recipe())
            .field("running", &self.core.is_running())
            .field("progress", &self.core.progress_value())
            .field("task_count", &self.core.task_count())
            .finish()
    }
}

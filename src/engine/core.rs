// src/engine/core.rs

//! The task tree state machine.
//!
//! [`TreeCore`] owns everything a running tree needs and implements the
//! start / child-done / stop protocol over the runtime nodes:
//!
//! - `start_node` instantiates a child: a group gets a container with fresh
//!   storage instances, a task gets a fresh adapter.
//! - `start_children` issues children in declaration order up to the group's
//!   current limit, with the container's start guard locked.
//! - `child_done` is the single place where a child's outcome is folded into
//!   its group's accumulator and the group decides to stop, continue, or end.
//! - `stop_node` / `stop_container` cancel depth-first and credit progress
//!   for everything they cut short.
//!
//! Outcomes that arrive while a container is still issuing children are
//! queued on the container and consumed by the issuing loop, so the loop is
//! never re-entered for the same container.
//!
//! No `RefCell` borrow is held while user code (handlers, observers,
//! adapters) runs.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::recipe::desc::{ContainerDesc, TaskNode};
use crate::recipe::task::{ErasedTask, TaskHandler};
use crate::recipe::Group;
use crate::storage::StorageHandle;
use crate::types::{DoneWith, SetupResult};

use super::events::Observers;
use super::guard::{Guard, GuardLocker};
use super::runtime::{RuntimeContainer, RuntimeNode, ScopeActivator};
use super::signal::DoneSignal;

pub(crate) type StorageHook = Rc<dyn Fn(usize)>;

#[derive(Default)]
pub(crate) struct StorageHooks {
    pub(crate) setup: Option<StorageHook>,
    pub(crate) done: Option<StorageHook>,
}

#[derive(Default)]
pub(crate) struct TreeCore {
    /// Locked for the duration of every user callback.
    pub(crate) guard: Guard,
    recipe: RefCell<Option<Rc<ContainerDesc>>>,
    task_count: Cell<usize>,
    runtime_root: RefCell<Option<Rc<RuntimeNode>>>,
    progress: Cell<usize>,
    pub(crate) observers: Observers,
    pub(crate) storage_hooks: RefCell<HashMap<StorageHandle, StorageHooks>>,
    pub(crate) waiters: RefCell<Vec<oneshot::Sender<DoneWith>>>,
}

impl TreeCore {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub(crate) fn task_count(&self) -> usize {
        self.task_count.get()
    }

    pub(crate) fn progress_value(&self) -> usize {
        self.progress.get()
    }

    pub(crate) fn has_recipe(&self) -> bool {
        self.recipe.borrow().is_some()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.runtime_root.borrow().is_some()
    }

    pub(crate) fn set_recipe(&self, recipe: &Group) {
        if self.guard.is_locked() {
            warn!("set_recipe() called from one of the tree's handlers; ignoring");
            return;
        }
        if self.is_running() {
            warn!("set_recipe() called on a running tree; ignoring");
            return;
        }
        let desc = ContainerDesc::compile(recipe);
        self.task_count.set(desc.task_count);
        self.progress.set(0);
        *self.recipe.borrow_mut() = Some(desc);
    }

    /// Start a run. Returns `false` when the call was rejected.
    pub(crate) fn start(self: &Rc<Self>) -> bool {
        if self.guard.is_locked() {
            warn!("start() called from one of the tree's handlers; ignoring");
            return false;
        }
        if self.is_running() {
            warn!("start() called on a running tree; ignoring");
            return false;
        }
        let recipe = self.recipe.borrow().clone();
        let Some(recipe) = recipe else {
            warn!("start() called on a tree without a recipe; ignoring");
            return false;
        };

        self.warn_about_unused_hooks(&recipe);
        self.progress.set(0);
        info!(task_count = recipe.task_count, "task tree started");
        {
            let _locker = GuardLocker::new(&self.guard);
            self.observers.notify_started();
            self.observers.notify_progress(0);
        }

        let root = RuntimeNode::new(TaskNode::Group(recipe), None);
        *self.runtime_root.borrow_mut() = Some(Rc::clone(&root));
        self.start_node(&root);
        true
    }

    /// Cancel a running tree. A no-op when idle.
    pub(crate) fn stop(self: &Rc<Self>) {
        if self.guard.is_locked() {
            warn!("stop() called from one of the tree's handlers; ignoring");
            return;
        }
        let root = self.runtime_root.borrow().clone();
        let Some(root) = root else {
            return;
        };
        debug!(progress = self.progress.get(), "stopping task tree");
        self.stop_node(&root);
        let finished = self.runtime_root.borrow_mut().take();
        drop(finished);
        self.emit_done(DoneWith::Cancel);
    }

    fn warn_about_unused_hooks(&self, recipe: &ContainerDesc) {
        let hooks = self.storage_hooks.borrow();
        if hooks.is_empty() {
            return;
        }
        let mut used = HashSet::new();
        recipe.collect_storages(&mut used);
        for storage in hooks.keys().filter(|storage| !used.contains(*storage)) {
            warn!(
                storage = storage.key(),
                value_type = storage.type_name(),
                "storage handler registered for a storage the recipe never uses"
            );
        }
    }

    fn start_node(self: &Rc<Self>, node: &Rc<RuntimeNode>) {
        match &node.desc {
            TaskNode::Group(desc) => {
                let container = self.create_container(desc, node);
                *node.container.borrow_mut() = Some(Rc::clone(&container));
                self.start_container(&container);
            }
            TaskNode::Task(handler) => self.start_task(node, handler),
        }
    }

    fn create_container(
        &self,
        desc: &Rc<ContainerDesc>,
        node: &Rc<RuntimeNode>,
    ) -> Rc<RuntimeContainer> {
        let storage_ids = desc
            .storages
            .iter()
            .map(|storage| {
                let id = storage.create_instance();
                self.call_storage_hook(storage, id, |hooks| hooks.setup.clone());
                id
            })
            .collect();
        Rc::new(RuntimeContainer::new(
            Rc::clone(desc),
            Rc::downgrade(node),
            storage_ids,
        ))
    }

    fn start_container(self: &Rc<Self>, container: &Rc<RuntimeContainer>) {
        let desc = Rc::clone(&container.desc);
        trace!(
            children = desc.children.len(),
            limit = desc.parallel_limit,
            policy = %desc.policy,
            "group started"
        );

        let mut action = SetupResult::Continue;
        if let Some(setup) = &desc.setup {
            action = self.invoke_in_scope(Some(container), || setup());
            if action != SetupResult::Continue {
                debug!(?action, skipped = desc.task_count, "group setup handler skipped its children");
                self.advance_progress(desc.task_count);
                container.success_bit.set(action == SetupResult::StopWithDone);
            }
        }
        if action == SetupResult::Continue && desc.children.is_empty() {
            action = SetupResult::from_success(container.success_bit.get());
        }
        self.continue_start(container, action, 0);
    }

    /// Issue children from `next_child` when `action` is `Continue`; end the
    /// group if the issuing (or `action` itself) decided the outcome.
    fn continue_start(
        self: &Rc<Self>,
        container: &Rc<RuntimeContainer>,
        action: SetupResult,
        next_child: usize,
    ) {
        let group_action = match action {
            SetupResult::Continue => self.start_children(container, next_child),
            decided => decided,
        };
        if group_action == SetupResult::Continue {
            return;
        }

        let bit = container.update_success_bit(group_action == SetupResult::StopWithDone);
        let success = self.finish_container(container, DoneWith::from_success(bit));
        match container.parent_node.upgrade() {
            Some(node) => self.report_done(&node, success),
            None => warn!("finished group has no owning node"),
        }
    }

    fn start_children(
        self: &Rc<Self>,
        container: &Rc<RuntimeContainer>,
        next_child: usize,
    ) -> SetupResult {
        let _starting = GuardLocker::new(&container.start_guard);
        for index in next_child..container.child_count() {
            if index >= container.current_limit() {
                break;
            }

            let child = RuntimeNode::new(
                container.desc.children[index].clone(),
                Some(Rc::downgrade(container)),
            );
            container.children.borrow_mut().push(Rc::clone(&child));
            self.start_node(&child);

            while let Some(success) = container.take_deferred() {
                // Read before `child_done` bumps the done count.
                let limit = container.current_limit();
                let action = self.child_done(container, success);
                if action == SetupResult::Continue {
                    continue;
                }
                container.clear_deferred();
                // Issued but never started; the current child already reported.
                self.advance_progress(container.task_count_of(index + 1, limit));
                return action;
            }
        }
        SetupResult::Continue
    }

    fn child_done(
        self: &Rc<Self>,
        container: &Rc<RuntimeContainer>,
        success: bool,
    ) -> SetupResult {
        let limit = container.current_limit();
        let policy = container.desc.policy;
        let should_stop = policy.should_stop(success);
        if should_stop {
            self.stop_container(container);
        }

        let done_count = container.done_count.get() + 1;
        container.done_count.set(done_count);
        let bit = container.update_success_bit(success);
        let action = if should_stop || done_count == container.child_count() {
            SetupResult::from_success(bit)
        } else {
            SetupResult::Continue
        };
        trace!(success, done_count, should_stop, ?action, "child finished");

        if container.is_starting() {
            return action;
        }
        self.continue_start(container, action, limit);
        action
    }

    fn stop_container(self: &Rc<Self>, container: &Rc<RuntimeContainer>) {
        let running = container.take_children();
        for child in &running {
            self.stop_node(child);
        }
        drop(running);

        let limit = container.current_limit();
        self.advance_progress(container.task_count_of(limit, container.child_count()));
    }

    fn stop_node(self: &Rc<Self>, node: &Rc<RuntimeNode>) {
        node.disarm();
        let task = node.task.borrow_mut().take();
        if let Some(task) = task {
            self.invoke_task_done_handler(node, &*task, DoneWith::Cancel);
            drop(task);
            return;
        }

        let container = node.container.borrow().clone();
        if let Some(container) = container {
            self.stop_container(&container);
            container.update_success_bit(false);
            self.finish_container(&container, DoneWith::Cancel);
        }
    }

    fn start_task(self: &Rc<Self>, node: &Rc<RuntimeNode>, handler: &Rc<TaskHandler>) {
        let parent = node.parent_container();
        let mut task = (handler.create)();

        let action = match &handler.setup {
            Some(setup) => self.invoke_in_scope(parent.as_ref(), || setup(&mut *task)),
            None => SetupResult::Continue,
        };
        if action != SetupResult::Continue {
            debug!(adapter = handler.adapter, ?action, "task setup handler skipped the task");
            self.advance_progress(1);
            drop(task);
            self.report_done(node, action == SetupResult::StopWithDone);
            return;
        }

        let signal = DoneSignal::new(Rc::downgrade(self), Rc::downgrade(node));
        *node.signal.borrow_mut() = Some(signal.clone());
        trace!(adapter = handler.adapter, "starting task");
        node.starting.set(true);
        {
            let _locker = GuardLocker::new(&self.guard);
            task.start(signal);
        }
        node.starting.set(false);
        *node.task.borrow_mut() = Some(task);

        if let Some(success) = node.sync_result.take() {
            self.task_done(node, success);
        }
    }

    /// Completion of a running task, delivered through its [`DoneSignal`].
    pub(crate) fn task_done(self: &Rc<Self>, node: &Rc<RuntimeNode>, success: bool) {
        node.disarm();
        let task = node.task.borrow_mut().take();
        let Some(task) = task else {
            warn!(success, "completion reported for a task that is not running");
            return;
        };
        let result =
            self.invoke_task_done_handler(node, &*task, DoneWith::from_success(success));
        drop(task);
        self.report_done(node, result);
    }

    fn invoke_task_done_handler(
        &self,
        node: &Rc<RuntimeNode>,
        task: &dyn ErasedTask,
        done_with: DoneWith,
    ) -> bool {
        if let TaskNode::Task(handler) = &node.desc {
            trace!(adapter = handler.adapter, %done_with, "task finished");
            let callback = match done_with {
                DoneWith::Success => handler.done.as_ref(),
                DoneWith::Error | DoneWith::Cancel => handler.error.as_ref(),
            };
            if let Some(callback) = callback {
                let parent = node.parent_container();
                let result = self.invoke_in_scope(parent.as_ref(), || callback(task, done_with));
                self.advance_progress(1);
                return result;
            }
        }
        self.advance_progress(1);
        done_with.is_success()
    }

    /// Hand a finished node's outcome to its parent, or end the run at the root.
    fn report_done(self: &Rc<Self>, node: &Rc<RuntimeNode>, success: bool) {
        if node.is_root() {
            let finished = self.runtime_root.borrow_mut().take();
            let owned = finished.as_ref().is_some_and(|root| Rc::ptr_eq(root, node));
            drop(finished);
            if !owned {
                warn!("finished root does not belong to the current run");
                return;
            }
            self.emit_done(DoneWith::from_success(success));
            return;
        }

        let Some(parent) = node.parent_container() else {
            debug!(success, "parent group already ended; dropping child outcome");
            return;
        };
        parent.remove_child(node);
        if parent.is_starting() {
            parent.defer(success);
        } else {
            self.child_done(&parent, success);
        }
    }

    /// Run the group's done/error handler and release its storages.
    ///
    /// Returns the outcome to report upward, as decided by the handler.
    fn finish_container(&self, container: &Rc<RuntimeContainer>, done_with: DoneWith) -> bool {
        let desc = Rc::clone(&container.desc);
        trace!(%done_with, policy = %desc.policy, "group finished");
        let handler = match done_with {
            DoneWith::Success => desc.done.as_ref(),
            DoneWith::Error | DoneWith::Cancel => desc.error.as_ref(),
        };
        let result = match handler {
            Some(handler) => self.invoke_in_scope(Some(container), || handler(done_with)),
            None => done_with.is_success(),
        };

        if container.begin_release() {
            for (storage, id) in container.storages().rev() {
                self.call_storage_hook(storage, id, |hooks| hooks.done.clone());
                storage.destroy_instance(id);
            }
        }
        if let Some(node) = container.parent_node.upgrade() {
            let finished = node.container.borrow_mut().take();
            drop(finished);
        }
        result
    }

    fn invoke_in_scope<R>(
        &self,
        container: Option<&Rc<RuntimeContainer>>,
        f: impl FnOnce() -> R,
    ) -> R {
        let _scope = ScopeActivator::new(container);
        let _locker = GuardLocker::new(&self.guard);
        f()
    }

    fn call_storage_hook(
        &self,
        storage: &StorageHandle,
        id: usize,
        select: impl FnOnce(&StorageHooks) -> Option<StorageHook>,
    ) {
        let hook = self.storage_hooks.borrow().get(storage).and_then(select);
        if let Some(hook) = hook {
            let _locker = GuardLocker::new(&self.guard);
            hook(id);
        }
    }

    fn advance_progress(&self, by: usize) {
        if by == 0 {
            return;
        }
        let max = self.task_count.get();
        let mut value = self.progress.get() + by;
        if value > max {
            warn!(value, max, "progress would exceed the task count; clamping");
            value = max;
        }
        self.progress.set(value);
        let _locker = GuardLocker::new(&self.guard);
        self.observers.notify_progress(value);
    }

    fn emit_done(&self, result: DoneWith) {
        let progress = self.progress.get();
        let max = self.task_count.get();
        if progress != max {
            warn!(progress, max, "task tree finished before progress reached the task count");
        }
        info!(%result, progress, "task tree finished");
        {
            let _locker = GuardLocker::new(&self.guard);
            self.observers.notify_done(result);
        }
        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        for waiter in waiters {
            let _ = waiter.send(result);
        }
    }
}

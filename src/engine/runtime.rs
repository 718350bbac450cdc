// src/engine/runtime.rs

//! Live per-run state of the recipe nodes.
//!
//! - [`RuntimeNode`] wraps one child slot: a running task adapter or a
//!   running group's [`RuntimeContainer`].
//! - [`RuntimeContainer`] tracks a group's finished children, its success
//!   accumulator, its storage instances and the children it started.
//! - [`ScopeActivator`] activates the storages visible from a container for
//!   the duration of one handler call.
//!
//! Ownership runs top-down (tree → root node → container → child nodes);
//! every upward link is a `Weak`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::recipe::desc::{ContainerDesc, TaskNode};
use crate::recipe::task::ErasedTask;
use crate::storage::StorageHandle;

use super::guard::Guard;
use super::signal::DoneSignal;

pub(crate) struct RuntimeNode {
    pub(crate) desc: TaskNode,
    /// `None` only for the root node of a tree.
    pub(crate) parent: Option<Weak<RuntimeContainer>>,
    pub(crate) container: RefCell<Option<Rc<RuntimeContainer>>>,
    pub(crate) task: RefCell<Option<Box<dyn ErasedTask>>>,
    pub(crate) signal: RefCell<Option<DoneSignal>>,
    /// Set while the adapter's `start()` is on the stack.
    pub(crate) starting: Cell<bool>,
    /// Outcome emitted from inside `start()`, processed once it returns.
    pub(crate) sync_result: Cell<Option<bool>>,
}

impl RuntimeNode {
    pub(crate) fn new(desc: TaskNode, parent: Option<Weak<RuntimeContainer>>) -> Rc<Self> {
        Rc::new(Self {
            desc,
            parent,
            container: RefCell::new(None),
            task: RefCell::new(None),
            signal: RefCell::new(None),
            starting: Cell::new(false),
            sync_result: Cell::new(None),
        })
    }

    pub(crate) fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub(crate) fn parent_container(&self) -> Option<Rc<RuntimeContainer>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Detach the completion signal so late emissions are ignored.
    pub(crate) fn disarm(&self) {
        let signal = self.signal.borrow_mut().take();
        if let Some(signal) = signal {
            signal.disarm();
        }
    }
}

pub(crate) struct RuntimeContainer {
    pub(crate) desc: Rc<ContainerDesc>,
    pub(crate) parent_node: Weak<RuntimeNode>,
    /// Instance ids, aligned with `desc.storages`.
    pub(crate) storage_ids: Vec<usize>,
    /// Started children that have not finished yet.
    pub(crate) children: RefCell<Vec<Rc<RuntimeNode>>>,
    pub(crate) done_count: Cell<usize>,
    pub(crate) success_bit: Cell<bool>,
    /// Locked while the container is issuing children.
    pub(crate) start_guard: Guard,
    /// Child outcomes that arrived while `start_guard` was locked.
    deferred: RefCell<VecDeque<bool>>,
    storages_released: Cell<bool>,
}

impl RuntimeContainer {
    pub(crate) fn new(
        desc: Rc<ContainerDesc>,
        parent_node: Weak<RuntimeNode>,
        storage_ids: Vec<usize>,
    ) -> Self {
        let success_bit = desc.policy.initial_success_bit();
        Self {
            desc,
            parent_node,
            storage_ids,
            children: RefCell::new(Vec::new()),
            done_count: Cell::new(0),
            success_bit: Cell::new(success_bit),
            start_guard: Guard::new(),
            deferred: RefCell::new(VecDeque::new()),
            storages_released: Cell::new(false),
        }
    }

    pub(crate) fn is_starting(&self) -> bool {
        self.start_guard.is_locked()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.desc.children.len()
    }

    /// Index one past the last child allowed to be started right now.
    pub(crate) fn current_limit(&self) -> usize {
        let child_count = self.child_count();
        match self.desc.parallel_limit {
            0 => child_count,
            limit => (self.done_count.get() + limit).min(child_count),
        }
    }

    pub(crate) fn parent_container(&self) -> Option<Rc<RuntimeContainer>> {
        self.parent_node.upgrade()?.parent_container()
    }

    pub(crate) fn update_success_bit(&self, success: bool) -> bool {
        let bit = self.desc.policy.update(self.success_bit.get(), success);
        self.success_bit.set(bit);
        bit
    }

    /// Sum of task counts of children in `range`.
    pub(crate) fn task_count_of(&self, from: usize, to: usize) -> usize {
        let to = to.min(self.child_count());
        if from >= to {
            return 0;
        }
        self.desc.children[from..to]
            .iter()
            .map(TaskNode::task_count)
            .sum()
    }

    pub(crate) fn remove_child(&self, node: &Rc<RuntimeNode>) {
        let removed = {
            let mut children = self.children.borrow_mut();
            children
                .iter()
                .position(|child| Rc::ptr_eq(child, node))
                .map(|index| children.remove(index))
        };
        drop(removed);
    }

    pub(crate) fn take_children(&self) -> Vec<Rc<RuntimeNode>> {
        std::mem::take(&mut *self.children.borrow_mut())
    }

    pub(crate) fn defer(&self, success: bool) {
        trace!(success, "child outcome deferred while issuing children");
        self.deferred.borrow_mut().push_back(success);
    }

    pub(crate) fn take_deferred(&self) -> Option<bool> {
        self.deferred.borrow_mut().pop_front()
    }

    pub(crate) fn clear_deferred(&self) {
        self.deferred.borrow_mut().clear();
    }

    /// Mark storages as released; `true` the first time only.
    pub(crate) fn begin_release(&self) -> bool {
        !self.storages_released.replace(true)
    }

    pub(crate) fn storages(&self) -> impl DoubleEndedIterator<Item = (&StorageHandle, usize)> {
        self.desc
            .storages
            .iter()
            .zip(self.storage_ids.iter().copied())
    }
}

impl Drop for RuntimeContainer {
    fn drop(&mut self) {
        // Teardown without a normal end (tree dropped mid-run): no handlers.
        if self.begin_release() {
            for (storage, id) in self.storages().rev() {
                storage.destroy_instance(id);
            }
        }
    }
}

/// Activates every storage visible from a container until dropped.
///
/// Walks from the container towards the root. A storage that is already
/// active (owned by a nearer scope) is skipped, so inner scopes shadow outer
/// ones. Deactivation happens in reverse order.
pub(crate) struct ScopeActivator {
    activated: Vec<StorageHandle>,
}

impl ScopeActivator {
    pub(crate) fn new(container: Option<&Rc<RuntimeContainer>>) -> Self {
        let mut activated = Vec::new();
        let mut current = container.cloned();
        while let Some(scope) = current {
            for (storage, id) in scope.storages() {
                if storage.is_active() {
                    continue;
                }
                if storage.activate(id) {
                    activated.push(storage.clone());
                }
            }
            current = scope.parent_container();
        }
        Self { activated }
    }
}

impl Drop for ScopeActivator {
    fn drop(&mut self) {
        for storage in self.activated.iter().rev() {
            storage.deactivate();
        }
    }
}

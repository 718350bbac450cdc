// src/engine/signal.rs

//! Completion channel handed to a task adapter when it is started.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::core::TreeCore;
use super::runtime::RuntimeNode;

/// One-shot completion signal of a running task.
///
/// Cloning is cheap and every clone refers to the same signal. The first
/// [`emit`](Self::emit) wins; later ones, and any emission after the task was
/// stopped or its tree dropped, are ignored.
///
/// Emitting from inside the adapter's own `start()` is allowed: the outcome
/// is processed as soon as `start()` returns.
#[derive(Clone)]
pub struct DoneSignal {
    state: Rc<SignalState>,
}

struct SignalState {
    armed: Cell<bool>,
    tree: Weak<TreeCore>,
    node: Weak<RuntimeNode>,
}

impl DoneSignal {
    pub(crate) fn new(tree: Weak<TreeCore>, node: Weak<RuntimeNode>) -> Self {
        Self {
            state: Rc::new(SignalState {
                armed: Cell::new(true),
                tree,
                node,
            }),
        }
    }

    /// Report the task's outcome.
    pub fn emit(&self, success: bool) {
        if !self.state.armed.replace(false) {
            debug!(success, "ignoring completion of a task that is no longer running");
            return;
        }
        let Some(node) = self.state.node.upgrade() else {
            return;
        };
        if node.starting.get() {
            node.sync_result.set(Some(success));
            return;
        }
        let Some(tree) = self.state.tree.upgrade() else {
            return;
        };
        tree.task_done(&node, success);
    }

    /// `false` once the signal was emitted or its task was stopped.
    pub fn is_armed(&self) -> bool {
        self.state.armed.get()
    }

    pub(crate) fn disarm(&self) {
        self.state.armed.set(false);
    }
}

impl fmt::Debug for DoneSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoneSignal")
            .field("armed", &self.state.armed.get())
            .finish()
    }
}

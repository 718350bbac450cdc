// src/engine/events.rs

//! Tree notifications: callback observers and a channel view.
//!
//! Observers are plain closures registered on a [`TaskTree`](super::TaskTree).
//! The same notifications are also pushed as [`TreeEvent`]s to every receiver
//! obtained from `TaskTree::events()`, for async consumers.
//!
//! Observer lists are cloned before invocation, so an observer may register
//! further observers without tripping a `RefCell` borrow.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::mpsc;

use crate::types::DoneWith;

/// Notification emitted by a running tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    /// The tree started; always the first event of a run.
    Started,
    /// Progress changed (finished, skipped or stopped tasks).
    ProgressValueChanged(usize),
    /// The run ended; always the last event of a run.
    Done(DoneWith),
}

type Observer = Rc<dyn Fn()>;
type ProgressObserver = Rc<dyn Fn(usize)>;
type DoneObserver = Rc<dyn Fn(DoneWith)>;

#[derive(Default)]
pub(crate) struct Observers {
    started: RefCell<Vec<Observer>>,
    progress: RefCell<Vec<ProgressObserver>>,
    done: RefCell<Vec<DoneObserver>>,
    error: RefCell<Vec<Observer>>,
    channels: RefCell<Vec<mpsc::UnboundedSender<TreeEvent>>>,
}

impl Observers {
    pub(crate) fn add_started(&self, f: Observer) {
        self.started.borrow_mut().push(f);
    }

    pub(crate) fn add_progress(&self, f: ProgressObserver) {
        self.progress.borrow_mut().push(f);
    }

    pub(crate) fn add_done(&self, f: DoneObserver) {
        self.done.borrow_mut().push(f);
    }

    pub(crate) fn add_error(&self, f: Observer) {
        self.error.borrow_mut().push(f);
    }

    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<TreeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.borrow_mut().push(tx);
        rx
    }

    pub(crate) fn notify_started(&self) {
        let observers = self.started.borrow().clone();
        for observer in observers {
            observer();
        }
        self.send(TreeEvent::Started);
    }

    pub(crate) fn notify_progress(&self, value: usize) {
        let observers = self.progress.borrow().clone();
        for observer in observers {
            observer(value);
        }
        self.send(TreeEvent::ProgressValueChanged(value));
    }

    /// `done` observers first, then `error` observers for a failed or
    /// cancelled run.
    pub(crate) fn notify_done(&self, result: DoneWith) {
        let observers = self.done.borrow().clone();
        for observer in observers {
            observer(result);
        }
        if !result.is_success() {
            let observers = self.error.borrow().clone();
            for observer in observers {
                observer();
            }
        }
        self.send(TreeEvent::Done(result));
    }

    fn send(&self, event: TreeEvent) {
        self.channels
            .borrow_mut()
            .retain(|tx| tx.send(event).is_ok());
    }
}

// crates/test-utils/src/builders.rs

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use tasktree::{
    CustomTask, GroupItem, TaskTree, on_group_done, on_group_error, on_group_setup,
};

use crate::fake_task::{FakeTask, TaskController};

/// Shared, ordered record of everything the handlers saw.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Rc<RefCell<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    /// Entries starting with `prefix`, in order.
    pub fn filtered(&self, prefix: &str) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Record the tree's notifications as `tree:started`, `progress:N` and
    /// `tree:done:<result>` (plus `tree:error` for non-success).
    pub fn attach(&self, tree: &TaskTree) {
        let log = self.clone();
        tree.on_started(move || log.push("tree:started"));
        let log = self.clone();
        tree.on_progress_value_changed(move |value| log.push(format!("progress:{value}")));
        let log = self.clone();
        tree.on_done(move |result| log.push(format!("tree:done:{result}")));
        let log = self.clone();
        tree.on_error_occurred(move || log.push("tree:error"));
    }

    /// Progress values reported so far.
    pub fn progress(&self) -> Vec<usize> {
        self.entries
            .borrow()
            .iter()
            .filter_map(|entry| entry.strip_prefix("progress:"))
            .filter_map(|value| value.parse().ok())
            .collect()
    }
}

/// A fake task that logs `setup:<name>`, `done:<name>` and `error:<name>`.
pub fn logged_task(controller: &TaskController, log: &EventLog, name: &str) -> CustomTask<FakeTask> {
    let setup_log = log.clone();
    let done_log = log.clone();
    let error_log = log.clone();
    controller
        .task(name)
        .on_setup(move |task: &mut FakeTask| setup_log.push(format!("setup:{}", task.name())))
        .on_done(move |task: &FakeTask| done_log.push(format!("done:{}", task.name())))
        .on_error(move |task: &FakeTask| error_log.push(format!("error:{}", task.name())))
}

/// Group handlers that log `group-setup:<name>`, `group-done:<name>` and
/// `group-error:<name>`.
pub fn logged_group_handlers(log: &EventLog, name: &str) -> GroupItem {
    let (setup_log, setup_name) = (log.clone(), name.to_string());
    let (done_log, done_name) = (log.clone(), name.to_string());
    let (error_log, error_name) = (log.clone(), name.to_string());
    GroupItem::List(vec![
        on_group_setup(move || setup_log.push(format!("group-setup:{setup_name}"))),
        on_group_done(move || done_log.push(format!("group-done:{done_name}"))),
        on_group_error(move || error_log.push(format!("group-error:{error_name}"))),
    ])
}

// crates/test-utils/src/fake_task.rs

//! A task adapter driven by hand from the test.
//!
//! Tasks are created through a [`TaskController`] by name. A started task
//! stays pending until the test calls [`TaskController::finish`], unless its
//! [`FinishMode`] makes it report from inside `start()`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use anyhow::{Result, bail};
use tasktree::{CustomTask, DoneSignal, TaskAdapter};

/// How a fake task reports once it is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishMode {
    /// Stay pending until [`TaskController::finish`].
    #[default]
    Manual,
    /// Emit success synchronously from `start()`.
    SucceedImmediately,
    /// Emit failure synchronously from `start()`.
    FailImmediately,
}

#[derive(Default)]
struct ControllerState {
    started: Vec<String>,
    pending: Vec<(String, DoneSignal)>,
    canceled: Vec<String>,
    max_running: usize,
    modes: HashMap<String, FinishMode>,
}

/// Creates [`FakeTask`]s and records what happens to them.
///
/// Cloning yields a handle to the same records.
#[derive(Clone, Default)]
pub struct TaskController {
    state: Rc<RefCell<ControllerState>>,
}

impl TaskController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mode used by every task named `name` started from now on.
    pub fn set_mode(&self, name: &str, mode: FinishMode) {
        self.state.borrow_mut().modes.insert(name.to_string(), mode);
    }

    /// A task description whose adapter reports under `name`.
    pub fn task(&self, name: &str) -> CustomTask<FakeTask> {
        let name = name.to_string();
        let state = Rc::downgrade(&self.state);
        CustomTask::with_factory(move || FakeTask {
            name: name.clone(),
            state: state.clone(),
        })
    }

    /// Complete the oldest pending task named `name`.
    ///
    /// The record is removed before the signal is emitted, so the engine may
    /// start or stop other fake tasks from inside this call.
    pub fn finish(&self, name: &str, success: bool) -> Result<()> {
        let signal = {
            let mut state = self.state.borrow_mut();
            let Some(pos) = state.pending.iter().position(|(n, _)| n == name) else {
                bail!("task '{name}' is not running");
            };
            state.pending.remove(pos).1
        };
        signal.emit(success);
        Ok(())
    }

    /// Names in the order the tasks were started.
    pub fn started(&self) -> Vec<String> {
        self.state.borrow().started.clone()
    }

    /// Names of the tasks currently waiting for [`finish`](Self::finish).
    pub fn running(&self) -> Vec<String> {
        self.state
            .borrow()
            .pending
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.state.borrow().pending.iter().any(|(n, _)| n == name)
    }

    /// Highest number of tasks pending at the same time.
    pub fn max_running(&self) -> usize {
        self.state.borrow().max_running
    }

    /// Names of tasks dropped while still pending, i.e. stopped by the engine.
    pub fn canceled(&self) -> Vec<String> {
        self.state.borrow().canceled.clone()
    }
}

/// Adapter created by [`TaskController::task`].
pub struct FakeTask {
    name: String,
    state: Weak<RefCell<ControllerState>>,
}

impl FakeTask {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TaskAdapter for FakeTask {
    fn start(&mut self, done: DoneSignal) {
        let Some(state) = self.state.upgrade() else {
            done.emit(false);
            return;
        };
        let mode = {
            let mut state = state.borrow_mut();
            state.started.push(self.name.clone());
            state.modes.get(&self.name).copied().unwrap_or_default()
        };
        match mode {
            FinishMode::SucceedImmediately => done.emit(true),
            FinishMode::FailImmediately => done.emit(false),
            FinishMode::Manual => {
                let mut state = state.borrow_mut();
                state.pending.push((self.name.clone(), done));
                state.max_running = state.max_running.max(state.pending.len());
            }
        }
    }
}

impl Drop for FakeTask {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let Ok(mut state) = state.try_borrow_mut() else {
            return;
        };
        // Finished tasks were removed by `finish`. A stopped task has a
        // disarmed signal; a task dropped with its tree is still armed.
        let mine = state
            .pending
            .iter()
            .position(|(name, signal)| name == &self.name && !signal.is_armed())
            .or_else(|| state.pending.iter().position(|(name, _)| name == &self.name));
        if let Some(pos) = mine {
            state.pending.remove(pos);
            state.canceled.push(self.name.clone());
        }
    }
}

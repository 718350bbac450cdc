// tests/reentrancy.rs

mod common;
use crate::common::{EventLog, TaskController, init_tracing};

use std::cell::{Cell, RefCell};
use std::error::Error;
use std::rc::Rc;

use tasktree::{
    CustomTask, DoneSignal, DoneWith, TaskAdapter, TaskTree, group, on_group_done, parallel,
};

type TestResult = Result<(), Box<dyn Error>>;

/// Adapter that hands its signal to the test.
#[derive(Default)]
struct Captured {
    slot: Rc<RefCell<Option<DoneSignal>>>,
}

impl TaskAdapter for Captured {
    fn start(&mut self, done: DoneSignal) {
        *self.slot.borrow_mut() = Some(done);
    }
}

fn captured_task(slot: &Rc<RefCell<Option<DoneSignal>>>) -> CustomTask<Captured> {
    let slot = Rc::clone(slot);
    CustomTask::with_factory(move || Captured {
        slot: Rc::clone(&slot),
    })
}

#[test]
fn stop_and_start_from_a_task_handler_are_rejected() -> TestResult {
    init_tracing();
    let controller = TaskController::new();
    let tree = Rc::new(TaskTree::new());
    let weak = Rc::downgrade(&tree);
    tree.set_recipe(group![
        controller.task("A").on_done(move |_| {
            if let Some(tree) = weak.upgrade() {
                tree.stop();
                tree.start();
            }
        }),
        controller.task("B"),
    ]);
    let log = EventLog::new();
    log.attach(&tree);

    tree.start();
    controller.finish("A", true)?;

    assert!(tree.is_running());
    assert_eq!(controller.running(), vec!["B"]);
    assert!(log.filtered("tree:done").is_empty());

    controller.finish("B", true)?;
    assert_eq!(log.filtered("tree:"), vec!["tree:started", "tree:done:success"]);
    Ok(())
}

#[test]
fn stop_from_a_done_observer_is_rejected() -> TestResult {
    init_tracing();
    let controller = TaskController::new();
    let tree = Rc::new(TaskTree::with_recipe(group![controller.task("A")]));
    let weak = Rc::downgrade(&tree);
    let done_calls = Rc::new(Cell::new(0));
    let calls = Rc::clone(&done_calls);
    tree.on_done(move |_| {
        calls.set(calls.get() + 1);
        if let Some(tree) = weak.upgrade() {
            tree.stop();
            tree.set_recipe(group![]);
        }
    });

    tree.start();
    controller.finish("A", true)?;

    assert_eq!(done_calls.get(), 1);
    assert!(!tree.is_running());
    // The recipe was not replaced from inside the observer.
    assert_eq!(tree.task_count(), 1);
    Ok(())
}

#[test]
fn second_start_while_running_is_ignored() -> TestResult {
    init_tracing();
    let controller = TaskController::new();
    let tree = TaskTree::with_recipe(group![controller.task("A")]);

    tree.start();
    tree.start();
    assert_eq!(controller.started(), vec!["A"]);

    controller.finish("A", true)?;
    assert!(!tree.is_running());
    Ok(())
}

#[test]
fn stop_on_an_idle_tree_does_nothing() {
    init_tracing();
    let controller = TaskController::new();
    let tree = TaskTree::with_recipe(group![controller.task("A")]);
    let log = EventLog::new();
    log.attach(&tree);

    tree.stop();

    assert!(log.entries().is_empty());
    assert!(controller.started().is_empty());
}

#[test]
fn start_without_a_recipe_is_ignored() {
    init_tracing();
    let tree = TaskTree::new();
    let log = EventLog::new();
    log.attach(&tree);

    tree.start();

    assert!(!tree.is_running());
    assert!(log.entries().is_empty());
}

#[test]
fn external_stop_cancels_and_credits_progress() {
    init_tracing();
    let controller = TaskController::new();
    let log = EventLog::new();
    let tree = TaskTree::with_recipe(group![
        on_group_done(|| panic!("done handler must not run on stop")),
        group![parallel(), controller.task("A"), controller.task("B")],
        controller.task("C"),
    ]);
    log.attach(&tree);

    tree.start();
    tree.stop();

    assert!(!tree.is_running());
    assert_eq!(controller.canceled(), vec!["A", "B"]);
    assert_eq!(tree.progress_value(), 3);
    assert_eq!(log.filtered("tree:done"), vec!["tree:done:cancel"]);
    assert_eq!(log.filtered("tree:error"), vec!["tree:error"]);
}

#[test]
fn dropping_a_running_tree_drops_its_tasks() {
    init_tracing();
    let controller = TaskController::new();
    let tree = TaskTree::with_recipe(group![controller.task("A")]);
    tree.start();
    assert!(controller.is_running("A"));

    drop(tree);

    assert_eq!(controller.canceled(), vec!["A"]);
    assert!(controller.finish("A", true).is_err());
}

#[test]
fn completion_after_stop_is_ignored() {
    init_tracing();
    let slot = Rc::new(RefCell::new(None));
    let tree = TaskTree::with_recipe(group![captured_task(&slot)]);
    let log = EventLog::new();
    log.attach(&tree);

    tree.start();
    let signal = slot.borrow_mut().take();
    let Some(signal) = signal else {
        panic!("task was not started");
    };
    assert!(signal.is_armed());

    tree.stop();
    assert!(!signal.is_armed());
    signal.emit(true);

    assert_eq!(log.filtered("tree:done"), vec!["tree:done:cancel"]);
}

#[test]
fn only_the_first_completion_counts() {
    init_tracing();
    let slot = Rc::new(RefCell::new(None));
    let tree = TaskTree::with_recipe(group![captured_task(&slot)]);
    let log = EventLog::new();
    log.attach(&tree);

    tree.start();
    let signal = slot.borrow_mut().take();
    let Some(signal) = signal else {
        panic!("task was not started");
    };
    signal.emit(true);
    signal.emit(false);

    assert_eq!(log.filtered("tree:done"), vec!["tree:done:success"]);
    assert_eq!(log.progress(), vec![0, 1]);
}

#[test]
fn sibling_completed_from_a_done_handler() -> TestResult {
    init_tracing();
    let controller = TaskController::new();
    let sibling = controller.clone();
    let tree = TaskTree::with_recipe(group![
        parallel(),
        controller.task("A").on_done(move |_| {
            let _ = sibling.finish("B", true);
        }),
        controller.task("B"),
    ]);
    let result = Rc::new(Cell::new(None));
    let slot = Rc::clone(&result);
    tree.on_done(move |done| slot.set(Some(done)));

    tree.start();
    controller.finish("A", true)?;

    assert_eq!(result.get(), Some(DoneWith::Success));
    assert_eq!(tree.progress_value(), 2);
    Ok(())
}

// tests/exec_adapters.rs

mod common;
use crate::common::{FinishMode, TaskController, init_tracing};

use std::cell::{Cell, RefCell};
use std::error::Error;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::LocalSet;

use tasktree::errors::TaskTreeError;
use tasktree::{
    CustomTask, DoneWith, ProcessTask, TaskTree, TaskTreeRunner, TaskTreeTask, TimeoutTask, group,
    run_blocking, with_timeout, with_timeout_handler,
};

type TestResult = Result<(), Box<dyn Error>>;

fn sleep_task(ms: u64) -> CustomTask<TimeoutTask> {
    CustomTask::<TimeoutTask>::new()
        .on_setup(move |task: &mut TimeoutTask| task.set_timeout(Duration::from_millis(ms)))
}

#[tokio::test]
async fn timeout_task_succeeds_after_its_delay() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();
        let local = LocalSet::new();
        local
            .run_until(async {
                let tree = TaskTree::with_recipe(group![sleep_task(10), sleep_task(10)]);
                let started = tokio::time::Instant::now();
                assert_eq!(tree.run().await, DoneWith::Success);
                assert!(started.elapsed() >= Duration::from_millis(20));
            })
            .await;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn with_timeout_fails_a_task_that_takes_too_long() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();
        let local = LocalSet::new();
        local
            .run_until(async {
                let controller = TaskController::new();
                let fired = Rc::new(Cell::new(false));
                let flag = Rc::clone(&fired);
                let recipe = group![with_timeout_handler(
                    controller.task("stuck"),
                    Duration::from_millis(20),
                    move || flag.set(true),
                )];
                let tree = TaskTree::with_recipe(recipe);
                assert_eq!(tree.task_count(), 2);

                assert_eq!(tree.run().await, DoneWith::Error);
                assert!(fired.get());
                assert_eq!(controller.canceled(), vec!["stuck"]);
                assert_eq!(tree.progress_value(), 2);
            })
            .await;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn with_timeout_keeps_the_outcome_of_a_fast_task() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();
        let local = LocalSet::new();
        local
            .run_until(async {
                let controller = TaskController::new();
                controller.set_mode("fast", FinishMode::SucceedImmediately);
                controller.set_mode("broken", FinishMode::FailImmediately);

                let tree = TaskTree::with_recipe(group![with_timeout(
                    controller.task("fast"),
                    Duration::from_secs(10)
                )]);
                assert_eq!(tree.run().await, DoneWith::Success);

                let tree = TaskTree::with_recipe(
                    group![controller.task("broken")].with_timeout(Duration::from_secs(10)),
                );
                assert_eq!(tree.run().await, DoneWith::Error);
            })
            .await;
        Ok(())
    })
    .await
}

#[test]
fn run_blocking_drives_timers_to_completion() -> TestResult {
    init_tracing();
    let result = run_blocking(group![sleep_task(5)], None)?;
    assert_eq!(result, DoneWith::Success);

    let result = run_blocking(group![sleep_task(5_000)], Some(Duration::from_millis(20)))?;
    assert_eq!(result, DoneWith::Error);
    Ok(())
}

#[test]
fn spawning_adapters_fail_without_a_runtime() {
    init_tracing();
    let tree = TaskTree::with_recipe(group![sleep_task(5)]);
    let result = Rc::new(Cell::new(None));
    let slot = Rc::clone(&result);
    tree.on_done(move |done| slot.set(Some(done)));
    tree.start();
    assert!(!tree.is_running());
    assert_eq!(result.get(), Some(DoneWith::Error));

    let process = CustomTask::<ProcessTask>::new()
        .on_setup(|task: &mut ProcessTask| task.set_command("true"));
    let tree = TaskTree::with_recipe(group![process]);
    let slot = Rc::clone(&result);
    tree.on_done(move |done| slot.set(Some(done)));
    result.set(None);
    tree.start();
    assert!(!tree.is_running());
    assert_eq!(result.get(), Some(DoneWith::Error));
}

#[tokio::test]
async fn run_blocking_refuses_to_nest_in_a_runtime() -> TestResult {
    init_tracing();
    match run_blocking(group![], None) {
        Err(TaskTreeError::Usage(msg)) => assert!(msg.contains("async runtime")),
        other => panic!("expected a usage error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn nested_tree_counts_as_one_task() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();
        let local = LocalSet::new();
        local
            .run_until(async {
                let inner = group![sleep_task(5), sleep_task(5), sleep_task(5)];
                let nested = CustomTask::<TaskTreeTask>::new()
                    .on_setup(move |task: &mut TaskTreeTask| task.set_recipe(inner.clone()));
                let tree = TaskTree::with_recipe(group![nested, sleep_task(5)]);
                assert_eq!(tree.task_count(), 2);
                assert_eq!(tree.run().await, DoneWith::Success);

                let controller = TaskController::new();
                controller.set_mode("bad", FinishMode::FailImmediately);
                let failing = group![controller.task("bad")];
                let nested = CustomTask::<TaskTreeTask>::new()
                    .on_setup(move |task: &mut TaskTreeTask| task.set_recipe(failing.clone()));
                let tree = TaskTree::with_recipe(group![nested]);
                assert_eq!(tree.run().await, DoneWith::Error);

                let tree = TaskTree::with_recipe(group![CustomTask::<TaskTreeTask>::new()]);
                assert_eq!(tree.run().await, DoneWith::Error);
            })
            .await;
        Ok(())
    })
    .await
}

#[test]
fn stopping_the_outer_tree_stops_the_nested_one() {
    init_tracing();
    let controller = TaskController::new();
    let inner = group![controller.task("deep")];
    let nested = CustomTask::<TaskTreeTask>::new()
        .on_setup(move |task: &mut TaskTreeTask| task.set_recipe(inner.clone()));
    let tree = TaskTree::with_recipe(group![nested]);

    tree.start();
    assert!(controller.is_running("deep"));

    tree.stop();
    assert_eq!(controller.canceled(), vec!["deep"]);
}

#[test]
fn runner_releases_the_tree_once_done() -> TestResult {
    init_tracing();
    let controller = TaskController::new();
    let runner = TaskTreeRunner::new();
    let results = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&results);
    let started = Rc::new(Cell::new(false));
    let started_flag = Rc::clone(&started);
    runner.start(
        group![controller.task("A")],
        move |tree| tree.on_started(move || started_flag.set(true)),
        move |result| sink.borrow_mut().push(result),
    );
    assert!(started.get());
    assert!(runner.is_running());

    controller.finish("A", true)?;
    assert!(!runner.is_running());
    assert_eq!(*results.borrow(), vec![DoneWith::Success]);

    // Replacing or resetting a running tree drops it without a done callback.
    let sink = Rc::clone(&results);
    runner.start(group![controller.task("B")], |_| {}, move |result| {
        sink.borrow_mut().push(result)
    });
    let sink = Rc::clone(&results);
    runner.start(group![controller.task("C")], |_| {}, move |result| {
        sink.borrow_mut().push(result)
    });
    assert_eq!(controller.canceled(), vec!["B"]);
    runner.reset();
    assert_eq!(controller.canceled(), vec!["B", "C"]);
    assert_eq!(results.borrow().len(), 1);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn process_task_reports_the_exit_status() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();
        let local = LocalSet::new();
        local
            .run_until(async {
                let command = |cmd: &'static str| {
                    CustomTask::<ProcessTask>::new().on_setup(move |task: &mut ProcessTask| {
                        task.set_name(cmd);
                        task.set_command(cmd);
                    })
                };

                let tree = TaskTree::with_recipe(group![command("echo hello"), command("true")]);
                assert_eq!(tree.run().await, DoneWith::Success);

                let tree = TaskTree::with_recipe(group![command("exit 3")]);
                assert_eq!(tree.run().await, DoneWith::Error);

                let tree = TaskTree::with_recipe(group![CustomTask::<ProcessTask>::new()]);
                assert_eq!(tree.run().await, DoneWith::Error);
            })
            .await;
        Ok(())
    })
    .await
}

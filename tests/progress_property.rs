// tests/progress_property.rs

mod common;
use crate::common::{EventLog, FakeTask, FinishMode, TaskController, init_tracing};

use proptest::prelude::*;
use tasktree::{
    Group, GroupItem, SetupResult, TaskTree, WorkflowPolicy, on_group_setup, parallel_limit,
    workflow_policy,
};

const POLICIES: [WorkflowPolicy; 7] = [
    WorkflowPolicy::StopOnError,
    WorkflowPolicy::ContinueOnError,
    WorkflowPolicy::StopOnDone,
    WorkflowPolicy::ContinueOnDone,
    WorkflowPolicy::StopOnFinished,
    WorkflowPolicy::FinishAllAndDone,
    WorkflowPolicy::FinishAllAndError,
];

/// How a generated task ends.
#[derive(Debug, Clone, Copy)]
enum Leaf {
    /// Finished by the driver.
    Manual,
    /// Reports from inside `start()`.
    Immediate(bool),
    /// Skipped by its setup handler.
    Skipped(bool),
}

#[derive(Debug, Clone)]
enum Shape {
    Task(Leaf),
    Group {
        limit: usize,
        policy: WorkflowPolicy,
        /// `Some` makes the group's setup handler skip its children.
        skip: Option<bool>,
        children: Vec<Shape>,
    },
}

fn leaf_strategy() -> impl Strategy<Value = Shape> {
    prop_oneof![
        6 => Just(Leaf::Manual),
        2 => any::<bool>().prop_map(Leaf::Immediate),
        1 => any::<bool>().prop_map(Leaf::Skipped),
    ]
    .prop_map(Shape::Task)
}

fn skip_strategy() -> impl Strategy<Value = Option<bool>> {
    prop_oneof![8 => Just(None), 1 => any::<bool>().prop_map(Some)]
}

fn group_strategy(children: impl Strategy<Value = Shape>) -> impl Strategy<Value = Shape> {
    (
        0..3usize,
        prop::sample::select(POLICIES.to_vec()),
        skip_strategy(),
        prop::collection::vec(children, 0..4),
    )
        .prop_map(|(limit, policy, skip, children)| Shape::Group {
            limit,
            policy,
            skip,
            children,
        })
}

fn tree_strategy() -> impl Strategy<Value = Shape> {
    let shape = leaf_strategy().prop_recursive(3, 24, 4, |inner| group_strategy(inner));
    group_strategy(shape)
}

fn build(shape: &Shape, controller: &TaskController, next: &mut usize) -> GroupItem {
    match shape {
        Shape::Task(leaf) => {
            *next += 1;
            let name = format!("t{next}");
            match *leaf {
                Leaf::Manual => controller.task(&name).into(),
                Leaf::Immediate(success) => {
                    let mode = if success {
                        FinishMode::SucceedImmediately
                    } else {
                        FinishMode::FailImmediately
                    };
                    controller.set_mode(&name, mode);
                    controller.task(&name).into()
                }
                Leaf::Skipped(success) => controller
                    .task(&name)
                    .on_setup(move |_: &mut FakeTask| SetupResult::from_success(success))
                    .into(),
            }
        }
        Shape::Group {
            limit,
            policy,
            skip,
            children,
        } => {
            let mut items = vec![parallel_limit(*limit), workflow_policy(*policy)];
            if let Some(success) = *skip {
                items.push(on_group_setup(move || SetupResult::from_success(success)));
            }
            for child in children {
                items.push(build(child, controller, next));
            }
            Group::new(items).into()
        }
    }
}

fn build_root(shape: &Shape, controller: &TaskController) -> Group {
    let mut next = 0;
    match build(shape, controller, &mut next) {
        GroupItem::Group(group) => group,
        other => Group::new([other]),
    }
}

struct Run {
    entries: Vec<String>,
    started: Vec<String>,
    progress: Vec<usize>,
    task_count: usize,
    leftover: Vec<String>,
}

/// Drive a fresh tree, finishing one running task per choice.
fn drive(shape: &Shape, choices: &[(usize, bool)]) -> Run {
    let controller = TaskController::new();
    let tree = TaskTree::with_recipe(build_root(shape, &controller));
    let log = EventLog::new();
    log.attach(&tree);

    tree.start();
    let mut choices = choices.iter().copied();
    while tree.is_running() {
        let running = controller.running();
        assert!(!running.is_empty(), "running tree without running tasks");
        let (pick, success) = choices.next().unwrap_or((0, true));
        controller
            .finish(&running[pick % running.len()], success)
            .expect("picked task is running");
    }

    Run {
        entries: log.entries(),
        started: controller.started(),
        progress: log.progress(),
        task_count: tree.task_count(),
        leftover: controller.running(),
    }
}

proptest! {
    #[test]
    fn progress_strictly_increases_to_the_task_count(
        shape in tree_strategy(),
        choices in prop::collection::vec((0..8usize, any::<bool>()), 0..48),
    ) {
        init_tracing();
        let run = drive(&shape, &choices);

        // Every credit is a fresh task, so a repeated value means a task was
        // credited twice and the total got clamped.
        prop_assert!(
            run.progress.windows(2).all(|w| w[0] < w[1]),
            "progress not strictly increasing: {:?}",
            run.progress
        );
        prop_assert_eq!(run.progress.first().copied(), Some(0));
        prop_assert_eq!(run.progress.last().copied(), Some(run.task_count));

        let done_events = run.entries.iter().filter(|e| e.starts_with("tree:done")).count();
        prop_assert_eq!(done_events, 1);
        prop_assert!(run.leftover.is_empty());

        let mut started = run.started.clone();
        started.sort();
        started.dedup();
        prop_assert_eq!(started.len(), run.started.len(), "a task was started twice");
    }

    #[test]
    fn identical_runs_produce_identical_events(
        shape in tree_strategy(),
        choices in prop::collection::vec((0..8usize, any::<bool>()), 0..48),
    ) {
        init_tracing();
        let first = drive(&shape, &choices);
        let second = drive(&shape, &choices);

        prop_assert_eq!(first.entries, second.entries);
        prop_assert_eq!(first.started, second.started);
    }
}

// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod recipe;
pub mod storage;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tokio::task::LocalSet;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{GroupConfig, ItemConfig, RecipeFile};

pub use crate::engine::{DoneSignal, Guard, GuardLocker, TaskTree, TreeEvent};
pub use crate::exec::{
    ProcessTask, TaskTreeRunner, TaskTreeTask, TimeoutTask, run_blocking, with_timeout,
    with_timeout_handler,
};
pub use crate::recipe::{
    CustomTask, Group, GroupData, GroupItem, IntoDoneResult, IntoSetupResult, TaskAdapter,
    TaskHandler, continue_on_done, continue_on_error, finish_all_and_done, finish_all_and_error,
    on_group_done, on_group_error, on_group_finished, on_group_setup, parallel, parallel_limit,
    sequential, stop_on_done, stop_on_error, stop_on_finished, sync, workflow_policy,
};
pub use crate::storage::{Storage, StorageHandle};
pub use crate::types::{CallDoneIf, DoneWith, SetupResult, WorkflowPolicy};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - recipe loading and validation
/// - building the [`Group`] and running it on a `LocalSet`
/// - Ctrl-C handling (stops the tree, the run ends with `Cancel`)
pub async fn run(args: CliArgs) -> Result<DoneWith> {
    let config_path = PathBuf::from(&args.config);
    let file = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&file);
        return Ok(DoneWith::Success);
    }

    let recipe = config::build_recipe(&file);
    let local = LocalSet::new();
    let result = local
        .run_until(async move {
            let tree = TaskTree::with_recipe(recipe);
            let maximum = tree.progress_maximum();
            tree.on_progress_value_changed(move |value| {
                debug!(progress = value, maximum, "progress");
            });
            info!(
                config = %config_path.display(),
                tasks = file.task_count(),
                "starting run"
            );

            tokio::select! {
                result = tree.run() => result,
                _ = wait_for_ctrl_c() => {
                    info!("Ctrl-C received; stopping run");
                    tree.stop();
                    DoneWith::Cancel
                }
            }
        })
        .await;

    info!(%result, "run finished");
    Ok(result)
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

/// Simple dry-run output: print the group tree with its tasks.
fn print_dry_run(file: &RecipeFile) {
    println!("tasktree dry-run");
    if let Some(ms) = file.config.timeout_ms {
        println!("  config.timeout_ms = {ms}");
    }
    println!();

    println!("tasks ({}):", file.task_count());
    print_group(&file.root, "root", 1);

    debug!("dry-run complete (no execution)");
}

fn print_group(group: &GroupConfig, fallback: &str, depth: usize) {
    let indent = "  ".repeat(depth);
    let name = group.name.as_deref().unwrap_or(fallback);
    let limit = match group.parallel_limit {
        0 => "unlimited".to_string(),
        n => n.to_string(),
    };
    println!(
        "{indent}+ {name} (policy: {}, parallel_limit: {limit})",
        group.workflow_policy
    );
    if let Some(ms) = group.timeout_ms {
        println!("{indent}    timeout_ms: {ms}");
    }

    for (index, child) in group.children.iter().enumerate() {
        match child {
            ItemConfig::Task(task) => {
                println!("{indent}  - {}", task.name);
                if let Some(ref cmd) = task.cmd {
                    println!("{indent}      cmd: {cmd}");
                }
                if let Some(ms) = task.sleep_ms {
                    println!("{indent}      sleep_ms: {ms}");
                }
                if let Some(ms) = task.timeout_ms {
                    println!("{indent}      timeout_ms: {ms}");
                }
                if task.skip {
                    println!("{indent}      skip: true");
                }
            }
            ItemConfig::Group(child) => {
                print_group(child, &format!("{name}[{index}]"), depth + 1);
            }
        }
    }
}

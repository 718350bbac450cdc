// src/config/build.rs

//! Turn a validated [`RecipeFile`] into a runnable [`Group`].
//!
//! - `cmd` tasks become [`ProcessTask`]s, `sleep_ms` tasks [`TimeoutTask`]s.
//! - `skip = true` short-circuits the task from its setup handler.
//! - Every `timeout_ms` wraps the item with [`with_timeout`].

use std::rc::Rc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::model::{GroupConfig, ItemConfig, RecipeFile, TaskConfig};
use crate::exec::{ProcessTask, TimeoutTask, with_timeout, with_timeout_handler};
use crate::recipe::{
    CustomTask, Group, GroupItem, on_group_done, on_group_error, on_group_setup, parallel_limit,
    workflow_policy,
};
use crate::types::SetupResult;

/// Build the root group of `file`, applying `[config].timeout_ms` if set.
pub fn build_recipe(file: &RecipeFile) -> Group {
    let root = build_group(&file.root, "root");
    match file.config.timeout_ms {
        Some(ms) => with_timeout_handler(root, Duration::from_millis(ms), move || {
            warn!(timeout_ms = ms, "run timed out");
        }),
        None => root,
    }
}

fn build_group(cfg: &GroupConfig, fallback_name: &str) -> Group {
    let name: Rc<str> = cfg.name.as_deref().unwrap_or(fallback_name).into();

    let mut items = vec![
        parallel_limit(cfg.parallel_limit),
        workflow_policy(cfg.workflow_policy),
    ];
    {
        let name = Rc::clone(&name);
        let policy = cfg.workflow_policy;
        let limit = cfg.parallel_limit;
        items.push(on_group_setup(move || {
            info!(group = %name, %policy, parallel_limit = limit, "group started");
        }));
    }
    {
        let name = Rc::clone(&name);
        items.push(on_group_done(move || info!(group = %name, "group done")));
    }
    {
        let name = Rc::clone(&name);
        items.push(on_group_error(move || warn!(group = %name, "group failed")));
    }

    for (index, child) in cfg.children.iter().enumerate() {
        let item = match child {
            ItemConfig::Task(task) => build_task(task),
            ItemConfig::Group(group) => {
                let child_name = format!("{name}[{index}]");
                build_group(group, &child_name).into()
            }
        };
        items.push(item);
    }

    let group = Group::new(items);
    match cfg.timeout_ms {
        Some(ms) => with_timeout(group, Duration::from_millis(ms)),
        None => group,
    }
}

fn build_task(cfg: &TaskConfig) -> GroupItem {
    let item = match (&cfg.cmd, cfg.sleep_ms) {
        (Some(cmd), _) => command_task(cfg, cmd),
        (None, Some(ms)) => sleep_task(cfg, Duration::from_millis(ms)),
        (None, None) => {
            let name = cfg.name.clone();
            CustomTask::<TimeoutTask>::new()
                .on_setup(move |_: &mut TimeoutTask| {
                    warn!(task = %name, "task has no action; failing it");
                    SetupResult::StopWithError
                })
                .into()
        }
    };

    match cfg.timeout_ms {
        Some(ms) => with_timeout(item, Duration::from_millis(ms)).into(),
        None => item,
    }
}

fn command_task(cfg: &TaskConfig, cmd: &str) -> GroupItem {
    let name = cfg.name.clone();
    let cmd = cmd.to_string();
    let skip = cfg.skip;

    CustomTask::<ProcessTask>::new()
        .on_setup(move |task: &mut ProcessTask| {
            if skip {
                info!(task = %name, "task skipped");
                return SetupResult::StopWithDone;
            }
            task.set_name(name.as_str());
            task.set_command(cmd.as_str());
            SetupResult::Continue
        })
        .on_done(|task: &ProcessTask| info!(task = %task.name(), "task succeeded"))
        .on_error(|task: &ProcessTask| warn!(task = %task.name(), "task failed"))
        .into()
}

fn sleep_task(cfg: &TaskConfig, duration: Duration) -> GroupItem {
    let skip = cfg.skip;
    let setup_name = cfg.name.clone();
    let done_name = cfg.name.clone();
    let error_name = cfg.name.clone();

    CustomTask::<TimeoutTask>::new()
        .on_setup(move |task: &mut TimeoutTask| {
            if skip {
                info!(task = %setup_name, "task skipped");
                return SetupResult::StopWithDone;
            }
            task.set_timeout(duration);
            info!(task = %setup_name, sleep_ms = duration.as_millis() as u64, "sleeping");
            SetupResult::Continue
        })
        .on_done(move |_: &TimeoutTask| info!(task = %done_name, "task succeeded"))
        .on_error(move |_: &TimeoutTask| warn!(task = %error_name, "task failed"))
        .into()
}

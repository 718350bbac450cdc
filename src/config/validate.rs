// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{GroupConfig, ItemConfig, RawRecipeFile, RecipeFile, TaskConfig};
use crate::errors::{Result, TaskTreeError};

impl TryFrom<RawRecipeFile> for RecipeFile {
    type Error = crate::errors::TaskTreeError;

    fn try_from(raw: RawRecipeFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_recipe(&raw)?;
        Ok(RecipeFile::new_unchecked(raw.config, raw.root))
    }
}

fn validate_raw_recipe(raw: &RawRecipeFile) -> Result<()> {
    validate_timeout("[config].timeout_ms", raw.config.timeout_ms)?;
    let mut names = HashSet::new();
    validate_group(&raw.root, "root", &mut names)?;
    Ok(())
}

fn validate_group<'a>(
    group: &'a GroupConfig,
    path: &str,
    names: &mut HashSet<&'a str>,
) -> Result<()> {
    if let Some(name) = &group.name {
        if name.trim().is_empty() {
            return Err(TaskTreeError::ConfigError(format!(
                "group at {path} has an empty name"
            )));
        }
    }
    validate_timeout(&format!("{path}.timeout_ms"), group.timeout_ms)?;

    for (index, child) in group.children.iter().enumerate() {
        let child_path = format!("{path}.children[{index}]");
        match child {
            ItemConfig::Task(task) => validate_task(task, &child_path, names)?,
            ItemConfig::Group(child) => validate_group(child, &child_path, names)?,
        }
    }
    Ok(())
}

fn validate_task<'a>(
    task: &'a TaskConfig,
    path: &str,
    names: &mut HashSet<&'a str>,
) -> Result<()> {
    let name = task.name.trim();
    if name.is_empty() {
        return Err(TaskTreeError::ConfigError(format!(
            "task at {path} has an empty name"
        )));
    }
    if !names.insert(task.name.as_str()) {
        return Err(TaskTreeError::ConfigError(format!(
            "task name '{}' is used more than once",
            task.name
        )));
    }

    match (&task.cmd, task.sleep_ms) {
        (Some(_), Some(_)) => {
            return Err(TaskTreeError::ConfigError(format!(
                "task '{}' sets both `cmd` and `sleep_ms`",
                task.name
            )));
        }
        (None, None) => {
            return Err(TaskTreeError::ConfigError(format!(
                "task '{}' needs either `cmd` or `sleep_ms`",
                task.name
            )));
        }
        (Some(cmd), None) if cmd.trim().is_empty() => {
            return Err(TaskTreeError::ConfigError(format!(
                "task '{}' has an empty `cmd`",
                task.name
            )));
        }
        _ => {}
    }

    validate_timeout(&format!("task '{}' timeout_ms", task.name), task.timeout_ms)
}

fn validate_timeout(what: &str, timeout_ms: Option<u64>) -> Result<()> {
    if timeout_ms == Some(0) {
        return Err(TaskTreeError::ConfigError(format!(
            "{what} must be >= 1 (got 0)"
        )));
    }
    Ok(())
}

// src/config/model.rs

use serde::Deserialize;

use crate::types::WorkflowPolicy;

/// Top-level recipe file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// timeout_ms = 10000
///
/// [root]
/// name = "build"
/// parallel_limit = 2
/// workflow_policy = "stop_on_error"
///
/// [[root.children]]
/// kind = "task"
/// name = "compile"
/// cmd = "cargo build"
///
/// [[root.children]]
/// kind = "group"
/// name = "checks"
/// parallel_limit = 0
/// workflow_policy = "continue_on_error"
///
/// [[root.children.children]]
/// kind = "task"
/// name = "wait"
/// sleep_ms = 200
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecipeFile {
    /// Run-wide settings from `[config]`.
    #[serde(default)]
    pub config: RunSection,

    /// The root group from `[root]`.
    pub root: GroupConfig,
}

/// Validated recipe file; build it with `RecipeFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct RecipeFile {
    pub config: RunSection,
    pub root: GroupConfig,
}

impl RecipeFile {
    pub(crate) fn new_unchecked(config: RunSection, root: GroupConfig) -> Self {
        Self { config, root }
    }

    /// Number of leaf tasks, not counting timeout timers.
    pub fn task_count(&self) -> usize {
        self.root.task_count()
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunSection {
    /// Fail the whole run when it takes longer than this.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// A group table (`[root]` or a child with `kind = "group"`).
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// Label used in log lines.
    #[serde(default)]
    pub name: Option<String>,

    /// 0 = unlimited, 1 = sequential (default).
    #[serde(default = "default_parallel_limit")]
    pub parallel_limit: usize,

    #[serde(default)]
    pub workflow_policy: WorkflowPolicy,

    /// Fail the group when it takes longer than this.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub children: Vec<ItemConfig>,
}

fn default_parallel_limit() -> usize {
    1
}

impl GroupConfig {
    pub fn task_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                ItemConfig::Task(_) => 1,
                ItemConfig::Group(group) => group.task_count(),
            })
            .sum()
    }
}

/// One child of a group, tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemConfig {
    Task(TaskConfig),
    Group(GroupConfig),
}

/// A task table (`kind = "task"`).
///
/// Exactly one of `cmd` and `sleep_ms` must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    /// Shell command; the task succeeds iff it exits with status 0.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Timer task that succeeds after this many milliseconds.
    #[serde(default)]
    pub sleep_ms: Option<u64>,

    /// Skip the task and report success without running it.
    #[serde(default)]
    pub skip: bool,

    /// Fail the task when it takes longer than this.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

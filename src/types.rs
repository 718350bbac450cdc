// src/types.rs

//! Small value types shared by the recipe model and the runtime.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// How a group combines the outcomes of its children.
///
/// Each policy is defined by four things:
/// - the seed of the group's success accumulator,
/// - how a finished child updates the accumulator,
/// - whether a finished child stops the remaining children,
/// - the result of a group that has no children at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPolicy {
    /// All children must succeed; the first failure stops the group.
    StopOnError,
    /// All children run; the group succeeds only if all of them did.
    ContinueOnError,
    /// One child must succeed; the first success stops the group.
    StopOnDone,
    /// All children run; the group succeeds if any of them did.
    ContinueOnDone,
    /// The first child to finish decides the outcome and stops the rest.
    StopOnFinished,
    /// All children run; the group always succeeds.
    FinishAllAndDone,
    /// All children run; the group always fails.
    FinishAllAndError,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        WorkflowPolicy::StopOnError
    }
}

impl WorkflowPolicy {
    /// Value the success accumulator of a fresh group starts with.
    ///
    /// For a group without children this is also the final outcome.
    pub fn initial_success_bit(self) -> bool {
        match self {
            WorkflowPolicy::StopOnError
            | WorkflowPolicy::ContinueOnError
            | WorkflowPolicy::FinishAllAndDone => true,
            WorkflowPolicy::StopOnDone
            | WorkflowPolicy::ContinueOnDone
            | WorkflowPolicy::StopOnFinished
            | WorkflowPolicy::FinishAllAndError => false,
        }
    }

    /// Result of a group with zero children.
    pub fn empty_group_success(self) -> bool {
        self.initial_success_bit()
    }

    /// Whether a child finishing with `success` stops its siblings.
    pub fn should_stop(self, success: bool) -> bool {
        match self {
            WorkflowPolicy::StopOnError => !success,
            WorkflowPolicy::StopOnDone => success,
            WorkflowPolicy::StopOnFinished => true,
            WorkflowPolicy::ContinueOnError
            | WorkflowPolicy::ContinueOnDone
            | WorkflowPolicy::FinishAllAndDone
            | WorkflowPolicy::FinishAllAndError => false,
        }
    }

    /// Fold one child outcome into the accumulator.
    pub fn update(self, acc: bool, success: bool) -> bool {
        match self {
            WorkflowPolicy::StopOnError | WorkflowPolicy::ContinueOnError => acc && success,
            WorkflowPolicy::StopOnDone | WorkflowPolicy::ContinueOnDone => acc || success,
            WorkflowPolicy::StopOnFinished => success,
            WorkflowPolicy::FinishAllAndDone | WorkflowPolicy::FinishAllAndError => acc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowPolicy::StopOnError => "stop_on_error",
            WorkflowPolicy::ContinueOnError => "continue_on_error",
            WorkflowPolicy::StopOnDone => "stop_on_done",
            WorkflowPolicy::ContinueOnDone => "continue_on_done",
            WorkflowPolicy::StopOnFinished => "stop_on_finished",
            WorkflowPolicy::FinishAllAndDone => "finish_all_and_done",
            WorkflowPolicy::FinishAllAndError => "finish_all_and_error",
        }
    }
}

impl fmt::Display for WorkflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "stop_on_error" => Ok(WorkflowPolicy::StopOnError),
            "continue_on_error" => Ok(WorkflowPolicy::ContinueOnError),
            "stop_on_done" => Ok(WorkflowPolicy::StopOnDone),
            "continue_on_done" => Ok(WorkflowPolicy::ContinueOnDone),
            "stop_on_finished" => Ok(WorkflowPolicy::StopOnFinished),
            "finish_all_and_done" => Ok(WorkflowPolicy::FinishAllAndDone),
            "finish_all_and_error" => Ok(WorkflowPolicy::FinishAllAndError),
            other => Err(format!("invalid workflow_policy: {other}")),
        }
    }
}

/// What a setup handler asks the engine to do with its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupResult {
    /// Start the task (or the group's children) normally.
    Continue,
    /// Skip the node and report success to the parent.
    StopWithDone,
    /// Skip the node and report failure to the parent.
    StopWithError,
}

impl SetupResult {
    pub fn from_success(success: bool) -> Self {
        if success {
            SetupResult::StopWithDone
        } else {
            SetupResult::StopWithError
        }
    }
}

/// Terminal outcome of a tree run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoneWith {
    Success,
    Error,
    /// The run was ended by an explicit `TaskTree::stop()`.
    Cancel,
}

impl DoneWith {
    pub fn from_success(success: bool) -> Self {
        if success {
            DoneWith::Success
        } else {
            DoneWith::Error
        }
    }

    pub fn is_success(self) -> bool {
        self == DoneWith::Success
    }
}

impl fmt::Display for DoneWith {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DoneWith::Success => "success",
            DoneWith::Error => "error",
            DoneWith::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// Which outcomes a done handler is called for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallDoneIf {
    #[default]
    SuccessOrError,
    Success,
    /// Failures and cancellations.
    Error,
}

impl CallDoneIf {
    pub fn matches(self, done_with: DoneWith) -> bool {
        match done_with {
            DoneWith::Success => self != CallDoneIf::Error,
            DoneWith::Error | DoneWith::Cancel => self != CallDoneIf::Success,
        }
    }
}

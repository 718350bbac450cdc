// src/recipe/desc.rs

//! Compiled, shareable form of a recipe used by the runtime.
//!
//! Compiling resolves defaults and precomputes task counts once per
//! `set_recipe`, so starting a run never walks the builder items again.

use std::collections::HashSet;
use std::rc::Rc;

use crate::storage::StorageHandle;
use crate::types::WorkflowPolicy;

use super::group::{Group, GroupDoneHandler, GroupItem, GroupSetupHandler};
use super::task::TaskHandler;

#[derive(Clone)]
pub(crate) enum TaskNode {
    Task(Rc<TaskHandler>),
    Group(Rc<ContainerDesc>),
}

impl TaskNode {
    pub(crate) fn task_count(&self) -> usize {
        match self {
            TaskNode::Task(_) => 1,
            TaskNode::Group(desc) => desc.task_count,
        }
    }
}

pub(crate) struct ContainerDesc {
    pub(crate) parallel_limit: usize,
    pub(crate) policy: WorkflowPolicy,
    pub(crate) setup: Option<GroupSetupHandler>,
    pub(crate) done: Option<GroupDoneHandler>,
    pub(crate) error: Option<GroupDoneHandler>,
    pub(crate) storages: Vec<StorageHandle>,
    pub(crate) children: Vec<TaskNode>,
    pub(crate) task_count: usize,
}

impl ContainerDesc {
    pub(crate) fn compile(group: &Group) -> Rc<Self> {
        let children: Vec<TaskNode> = group
            .children
            .iter()
            .filter_map(|item| match item {
                GroupItem::Group(child) => Some(TaskNode::Group(Self::compile(child))),
                GroupItem::Task(handler) => Some(TaskNode::Task(Rc::new(handler.clone()))),
                _ => None,
            })
            .collect();
        let task_count = children.iter().map(TaskNode::task_count).sum();

        Rc::new(Self {
            parallel_limit: group.parallel_limit(),
            policy: group.workflow_policy(),
            setup: group.data.setup.clone(),
            done: group.data.done.clone(),
            error: group.data.error.clone(),
            storages: group.storages.clone(),
            children,
            task_count,
        })
    }

    /// Every storage referenced anywhere in this subtree.
    pub(crate) fn collect_storages(&self, out: &mut HashSet<StorageHandle>) {
        out.extend(self.storages.iter().cloned());
        for child in &self.children {
            if let TaskNode::Group(desc) = child {
                desc.collect_storages(out);
            }
        }
    }
}

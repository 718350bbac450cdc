// src/recipe/group.rs

//! Declarative group description and its builder items.
//!
//! A recipe is a [`Group`] built from a flat list of [`GroupItem`]s. Items
//! are either children (tasks and nested groups) or attributes of the group
//! itself (limit, policy, handlers, storages). Attributes are collapsed into
//! the group when it is built:
//!
//! ```ignore
//! let recipe = group![
//!     parallel_limit(2),
//!     stop_on_error(),
//!     on_group_done(|| println!("all done")),
//!     controller.task("A"),
//!     group![parallel(), controller.task("B"), controller.task("C")],
//! ];
//! ```
//!
//! Redefining an attribute inside one group logs a warning and the last
//! definition wins.

use std::rc::Rc;
use std::time::Duration;

use tracing::warn;

use crate::storage::{Storage, StorageHandle};
use crate::types::{CallDoneIf, DoneWith, SetupResult, WorkflowPolicy};

use super::task::{IntoDoneResult, IntoSetupResult, TaskHandler};

pub(crate) type GroupSetupHandler = Rc<dyn Fn() -> SetupResult>;
pub(crate) type GroupDoneHandler = Rc<dyn Fn(DoneWith) -> bool>;

/// Group attributes carried by a [`GroupItem::Data`] item.
#[derive(Clone, Default)]
pub struct GroupData {
    pub(crate) parallel_limit: Option<usize>,
    pub(crate) workflow_policy: Option<WorkflowPolicy>,
    pub(crate) setup: Option<GroupSetupHandler>,
    pub(crate) done: Option<GroupDoneHandler>,
    pub(crate) error: Option<GroupDoneHandler>,
}

impl GroupData {
    fn merge(&mut self, other: GroupData) {
        if let Some(limit) = other.parallel_limit {
            if self.parallel_limit.is_some() {
                warn!(limit, "group parallel limit redefined; the last one wins");
            }
            self.parallel_limit = Some(limit);
        }
        if let Some(policy) = other.workflow_policy {
            if self.workflow_policy.is_some() {
                warn!(%policy, "group workflow policy redefined; the last one wins");
            }
            self.workflow_policy = Some(policy);
        }
        if other.setup.is_some() {
            if self.setup.is_some() {
                warn!("group setup handler redefined; the last one wins");
            }
            self.setup = other.setup;
        }
        if other.done.is_some() {
            if self.done.is_some() {
                warn!("group done handler redefined; the last one wins");
            }
            self.done = other.done;
        }
        if other.error.is_some() {
            if self.error.is_some() {
                warn!("group error handler redefined; the last one wins");
            }
            self.error = other.error;
        }
    }
}

/// One element of a group's item list.
#[derive(Clone)]
pub enum GroupItem {
    /// A nested group (child).
    Group(Group),
    /// A task (child).
    Task(TaskHandler),
    /// A storage owned by the group.
    Storage(StorageHandle),
    /// Attributes of the group.
    Data(GroupData),
    /// Items spliced into the enclosing group in place.
    List(Vec<GroupItem>),
}

/// Immutable, reusable description of a group node.
#[derive(Clone, Default)]
pub struct Group {
    pub(crate) children: Vec<GroupItem>,
    pub(crate) data: GroupData,
    pub(crate) storages: Vec<StorageHandle>,
}

impl Group {
    pub fn new(items: impl IntoIterator<Item = GroupItem>) -> Self {
        let mut group = Group::default();
        for item in items {
            group.add(item);
        }
        group
    }

    fn add(&mut self, item: GroupItem) {
        match item {
            GroupItem::Group(_) | GroupItem::Task(_) => self.children.push(item),
            GroupItem::Storage(storage) => {
                if self.storages.contains(&storage) {
                    warn!(
                        storage = storage.key(),
                        value_type = storage.type_name(),
                        "storage listed twice in one group; keeping the first"
                    );
                    return;
                }
                self.storages.push(storage);
            }
            GroupItem::Data(data) => self.data.merge(data),
            GroupItem::List(items) => {
                for item in items {
                    self.add(item);
                }
            }
        }
    }

    /// Declared limit; 0 means unlimited, the default 1 means sequential.
    pub fn parallel_limit(&self) -> usize {
        self.data.parallel_limit.unwrap_or(1)
    }

    pub fn workflow_policy(&self) -> WorkflowPolicy {
        self.data.workflow_policy.unwrap_or_default()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn storages(&self) -> &[StorageHandle] {
        &self.storages
    }

    /// Number of leaf tasks; a nested tree task counts as one.
    pub fn task_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                GroupItem::Group(group) => group.task_count(),
                GroupItem::Task(_) => 1,
                _ => 0,
            })
            .sum()
    }

    /// Race this group against a timer; see [`with_timeout`](crate::exec::with_timeout).
    pub fn with_timeout(self, timeout: Duration) -> Group {
        crate::exec::with_timeout(self, timeout)
    }
}

impl From<Group> for GroupItem {
    fn from(group: Group) -> Self {
        GroupItem::Group(group)
    }
}

impl From<GroupData> for GroupItem {
    fn from(data: GroupData) -> Self {
        GroupItem::Data(data)
    }
}

impl From<StorageHandle> for GroupItem {
    fn from(storage: StorageHandle) -> Self {
        GroupItem::Storage(storage)
    }
}

impl<T: 'static> From<&Storage<T>> for GroupItem {
    fn from(storage: &Storage<T>) -> Self {
        GroupItem::Storage(storage.handle())
    }
}

impl<T: 'static> From<Storage<T>> for GroupItem {
    fn from(storage: Storage<T>) -> Self {
        GroupItem::Storage(storage.handle())
    }
}

impl From<Vec<GroupItem>> for GroupItem {
    fn from(items: Vec<GroupItem>) -> Self {
        GroupItem::List(items)
    }
}

/// Build a [`Group`] from items convertible into [`GroupItem`].
#[macro_export]
macro_rules! group {
    ($($item:expr),* $(,)?) => {
        $crate::recipe::Group::new(::std::vec![$($crate::recipe::GroupItem::from($item)),*])
    };
}

pub fn parallel_limit(limit: usize) -> GroupItem {
    GroupItem::Data(GroupData {
        parallel_limit: Some(limit),
        ..GroupData::default()
    })
}

/// Children run one after another (the default).
pub fn sequential() -> GroupItem {
    parallel_limit(1)
}

/// All children start at once.
pub fn parallel() -> GroupItem {
    parallel_limit(0)
}

pub fn workflow_policy(policy: WorkflowPolicy) -> GroupItem {
    GroupItem::Data(GroupData {
        workflow_policy: Some(policy),
        ..GroupData::default()
    })
}

pub fn stop_on_error() -> GroupItem {
    workflow_policy(WorkflowPolicy::StopOnError)
}

pub fn continue_on_error() -> GroupItem {
    workflow_policy(WorkflowPolicy::ContinueOnError)
}

pub fn stop_on_done() -> GroupItem {
    workflow_policy(WorkflowPolicy::StopOnDone)
}

pub fn continue_on_done() -> GroupItem {
    workflow_policy(WorkflowPolicy::ContinueOnDone)
}

pub fn stop_on_finished() -> GroupItem {
    workflow_policy(WorkflowPolicy::StopOnFinished)
}

pub fn finish_all_and_done() -> GroupItem {
    workflow_policy(WorkflowPolicy::FinishAllAndDone)
}

pub fn finish_all_and_error() -> GroupItem {
    workflow_policy(WorkflowPolicy::FinishAllAndError)
}

/// Runs when the group starts, with the group's storages active.
///
/// A non-`Continue` result skips all children and ends the group with that
/// outcome, overriding the workflow policy.
pub fn on_group_setup<R: IntoSetupResult>(f: impl Fn() -> R + 'static) -> GroupItem {
    GroupItem::Data(GroupData {
        setup: Some(Rc::new(move || f().into_setup_result())),
        ..GroupData::default()
    })
}

/// Runs when the group ends with success.
pub fn on_group_done(f: impl Fn() + 'static) -> GroupItem {
    on_group_finished(CallDoneIf::Success, move |_| f())
}

/// Runs when the group ends with an error or is stopped.
pub fn on_group_error(f: impl Fn() + 'static) -> GroupItem {
    on_group_finished(CallDoneIf::Error, move |_| f())
}

/// Runs with the group's outcome for every outcome `call_if` selects.
///
/// Returning a `bool` replaces the outcome reported to the parent (or, for
/// the root, the tree's result). When the group is stopped the handler sees
/// [`DoneWith::Cancel`] and its return value is ignored.
pub fn on_group_finished<R: IntoDoneResult>(
    call_if: CallDoneIf,
    f: impl Fn(DoneWith) -> R + 'static,
) -> GroupItem {
    let handler: GroupDoneHandler =
        Rc::new(move |done_with: DoneWith| f(done_with).into_done_result(done_with));
    GroupItem::Data(GroupData {
        done: call_if.matches(DoneWith::Success).then(|| Rc::clone(&handler)),
        error: call_if.matches(DoneWith::Error).then_some(handler),
        ..GroupData::default()
    })
}

/// A zero-task step that runs `f` synchronously and reports its result.
pub fn sync(f: impl Fn() -> bool + 'static) -> GroupItem {
    GroupItem::Group(Group::new([on_group_setup(move || {
        SetupResult::from_success(f())
    })]))
}

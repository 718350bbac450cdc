// src/recipe/task.rs

//! The task adapter boundary and the typed task description.
//!
//! The engine never knows what a task does. It only needs to:
//! - create a fresh adapter per run ([`CustomTask::with_factory`]),
//! - start it with a [`DoneSignal`],
//! - drop it once it reported, or when it is stopped.
//!
//! Handlers registered on a [`CustomTask`] receive the concrete adapter type,
//! so a setup handler can configure it before it starts and a done handler
//! can read its results.

use std::any::{Any, type_name};
use std::rc::Rc;

use tracing::{error, warn};

use crate::engine::DoneSignal;
use crate::types::{CallDoneIf, DoneWith, SetupResult};

use super::group::GroupItem;

/// An asynchronous unit of work driven by a task tree.
///
/// Contract:
/// - `start()` must not block; the work continues in the background
///   (typically a future spawned on the current `LocalSet`).
/// - `done` must be emitted exactly once per started adapter.
/// - The adapter may be dropped while still running (after a stop); it must
///   then cancel its work on a best-effort basis without emitting.
pub trait TaskAdapter: 'static {
    fn start(&mut self, done: DoneSignal);
}

/// Object-safe view of an adapter used by the engine.
pub(crate) trait ErasedTask {
    fn start(&mut self, done: DoneSignal);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: TaskAdapter> ErasedTask for T {
    fn start(&mut self, done: DoneSignal) {
        TaskAdapter::start(self, done)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Return values accepted from setup handlers.
///
/// `()` means [`SetupResult::Continue`].
pub trait IntoSetupResult {
    fn into_setup_result(self) -> SetupResult;
}

impl IntoSetupResult for () {
    fn into_setup_result(self) -> SetupResult {
        SetupResult::Continue
    }
}

impl IntoSetupResult for SetupResult {
    fn into_setup_result(self) -> SetupResult {
        self
    }
}

/// Return values accepted from done handlers.
///
/// `()` keeps the outcome the node finished with; a `bool` replaces it.
/// The value is ignored when the node was stopped.
pub trait IntoDoneResult {
    fn into_done_result(self, done_with: DoneWith) -> bool;
}

impl IntoDoneResult for () {
    fn into_done_result(self, done_with: DoneWith) -> bool {
        done_with.is_success()
    }
}

impl IntoDoneResult for bool {
    fn into_done_result(self, _done_with: DoneWith) -> bool {
        self
    }
}

pub(crate) type CreateHandler = Rc<dyn Fn() -> Box<dyn ErasedTask>>;
pub(crate) type TaskSetupHandler = Rc<dyn Fn(&mut dyn ErasedTask) -> SetupResult>;
pub(crate) type TaskDoneHandler = Rc<dyn Fn(&dyn ErasedTask, DoneWith) -> bool>;

/// Type-erased task description, as stored in a [`Group`](super::Group).
#[derive(Clone)]
pub struct TaskHandler {
    pub(crate) adapter: &'static str,
    pub(crate) create: CreateHandler,
    pub(crate) setup: Option<TaskSetupHandler>,
    pub(crate) done: Option<TaskDoneHandler>,
    pub(crate) error: Option<TaskDoneHandler>,
}

impl TaskHandler {
    /// Name of the adapter type, for diagnostics.
    pub fn adapter_type(&self) -> &'static str {
        self.adapter
    }
}

/// Description of one task backed by adapter type `A`.
pub struct CustomTask<A: TaskAdapter> {
    create: Rc<dyn Fn() -> A>,
    setup: Option<Rc<dyn Fn(&mut A) -> SetupResult>>,
    done: Option<DoneFn<A>>,
    error: Option<DoneFn<A>>,
}

type DoneFn<A> = Rc<dyn Fn(&A, DoneWith) -> bool>;

impl<A: TaskAdapter> Clone for CustomTask<A> {
    fn clone(&self) -> Self {
        Self {
            create: Rc::clone(&self.create),
            setup: self.setup.clone(),
            done: self.done.clone(),
            error: self.error.clone(),
        }
    }
}

impl<A: TaskAdapter + Default> CustomTask<A> {
    pub fn new() -> Self {
        Self::with_factory(A::default)
    }
}

impl<A: TaskAdapter + Default> Default for CustomTask<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: TaskAdapter> CustomTask<A> {
    /// Task whose adapter is built by `factory`, once per run.
    pub fn with_factory(factory: impl Fn() -> A + 'static) -> Self {
        Self {
            create: Rc::new(factory),
            setup: None,
            done: None,
            error: None,
        }
    }

    /// Called with the fresh adapter right before it starts.
    ///
    /// Returning [`SetupResult::StopWithDone`] or
    /// [`SetupResult::StopWithError`] skips the task: it is never started and
    /// none of its done handlers runs.
    pub fn on_setup<R: IntoSetupResult>(mut self, f: impl Fn(&mut A) -> R + 'static) -> Self {
        if self.setup.is_some() {
            warn!(adapter = type_name::<A>(), "task setup handler redefined; the last one wins");
        }
        self.setup = Some(Rc::new(move |task: &mut A| f(task).into_setup_result()));
        self
    }

    /// Called when the adapter reports success.
    pub fn on_done(self, f: impl Fn(&A) + 'static) -> Self {
        self.on_finished(CallDoneIf::Success, move |task: &A, _| f(task))
    }

    /// Called when the adapter reports failure or is stopped.
    pub fn on_error(self, f: impl Fn(&A) + 'static) -> Self {
        self.on_finished(CallDoneIf::Error, move |task: &A, _| f(task))
    }

    /// Called with the outcome for every outcome `call_if` selects.
    ///
    /// Returning a `bool` replaces the outcome reported to the parent group,
    /// e.g. to treat an expected failure as success. A stopped task sees
    /// [`DoneWith::Cancel`] and its return value is ignored.
    pub fn on_finished<R: IntoDoneResult>(
        mut self,
        call_if: CallDoneIf,
        f: impl Fn(&A, DoneWith) -> R + 'static,
    ) -> Self {
        let handler: DoneFn<A> = Rc::new(move |task: &A, done_with: DoneWith| {
            f(task, done_with).into_done_result(done_with)
        });
        if call_if.matches(DoneWith::Success) {
            if self.done.is_some() {
                warn!(adapter = type_name::<A>(), "task done handler redefined; the last one wins");
            }
            self.done = Some(Rc::clone(&handler));
        }
        if call_if.matches(DoneWith::Error) {
            if self.error.is_some() {
                warn!(adapter = type_name::<A>(), "task error handler redefined; the last one wins");
            }
            self.error = Some(handler);
        }
        self
    }

    pub fn into_handler(self) -> TaskHandler {
        let create = self.create;
        TaskHandler {
            adapter: type_name::<A>(),
            create: Rc::new(move || Box::new(create()) as Box<dyn ErasedTask>),
            setup: self.setup.map(|setup| {
                Rc::new(move |task: &mut dyn ErasedTask| {
                    match task.as_any_mut().downcast_mut::<A>() {
                        Some(task) => setup(task),
                        None => {
                            error!(adapter = type_name::<A>(), "task adapter type mismatch");
                            SetupResult::StopWithError
                        }
                    }
                }) as TaskSetupHandler
            }),
            done: self.done.map(erase_done_handler::<A>),
            error: self.error.map(erase_done_handler::<A>),
        }
    }
}

fn erase_done_handler<A: TaskAdapter>(f: DoneFn<A>) -> TaskDoneHandler {
    Rc::new(move |task: &dyn ErasedTask, done_with: DoneWith| {
        match task.as_any().downcast_ref::<A>() {
            Some(task) => f(task, done_with),
            None => {
                error!(adapter = type_name::<A>(), "task adapter type mismatch");
                false
            }
        }
    })
}

impl<A: TaskAdapter> From<CustomTask<A>> for GroupItem {
    fn from(task: CustomTask<A>) -> Self {
        GroupItem::Task(task.into_handler())
    }
}

impl From<TaskHandler> for GroupItem {
    fn from(handler: TaskHandler) -> Self {
        GroupItem::Task(handler)
    }
}

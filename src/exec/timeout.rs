// src/exec/timeout.rs

//! Timer task and the `with_timeout` wrapper built on it.

use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::engine::DoneSignal;
use crate::recipe::{
    CustomTask, Group, GroupItem, TaskAdapter, finish_all_and_error, parallel, stop_on_finished,
};

/// Completes with success once its timeout elapsed.
///
/// Dropping the adapter cancels the timer.
///
/// # Panics
///
/// The timer is spawned with `tokio::task::spawn_local`, so a tree holding a
/// `TimeoutTask` must be started inside a tokio `LocalSet` (or through
/// [`run_blocking`](crate::exec::run_blocking)). Starting it on a runtime
/// without a `LocalSet` panics. Without any runtime the task reports failure.
#[derive(Debug, Default)]
pub struct TimeoutTask {
    timeout: Duration,
    timer: Option<JoinHandle<()>>,
}

impl TimeoutTask {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            timer: None,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl TaskAdapter for TimeoutTask {
    fn start(&mut self, done: DoneSignal) {
        // Only the missing runtime is detectable; a missing `LocalSet` panics below.
        if tokio::runtime::Handle::try_current().is_err() {
            error!("TimeoutTask started without a tokio runtime; reporting failure");
            done.emit(false);
            return;
        }
        let timeout = self.timeout;
        self.timer = Some(tokio::task::spawn_local(async move {
            tokio::time::sleep(timeout).await;
            debug!(timeout_ms = timeout.as_millis() as u64, "timeout elapsed");
            done.emit(true);
        }));
    }
}

impl Drop for TimeoutTask {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Run `item` against a timer; whichever finishes first decides.
///
/// If `item` finishes first its outcome is the group's outcome. If the timer
/// fires first, `item` is stopped and the group fails. The timer counts as
/// one extra task.
pub fn with_timeout(item: impl Into<GroupItem>, timeout: Duration) -> Group {
    timeout_group(item.into(), timeout, None)
}

/// Like [`with_timeout`], running `handler` when the timer fires.
pub fn with_timeout_handler(
    item: impl Into<GroupItem>,
    timeout: Duration,
    handler: impl Fn() + 'static,
) -> Group {
    timeout_group(item.into(), timeout, Some(Rc::new(handler)))
}

fn timeout_group(item: GroupItem, timeout: Duration, handler: Option<Rc<dyn Fn()>>) -> Group {
    let timer = CustomTask::<TimeoutTask>::new()
        .on_setup(move |task: &mut TimeoutTask| task.set_timeout(timeout))
        .on_done(move |_: &TimeoutTask| {
            if let Some(handler) = &handler {
                handler();
            }
        });

    Group::new([
        parallel(),
        stop_on_finished(),
        Group::new([finish_all_and_error(), timer.into()]).into(),
        item,
    ])
}

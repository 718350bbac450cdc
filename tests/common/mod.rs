// tests/common/mod.rs

#![allow(dead_code, unused_imports)]

pub use tasktree_test_utils::builders::{EventLog, logged_group_handlers, logged_task};
pub use tasktree_test_utils::fake_task::{FakeTask, FinishMode, TaskController};
pub use tasktree_test_utils::{init_tracing, with_timeout};

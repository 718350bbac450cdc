// tests/config_loading.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::io::Write;

use tempfile::NamedTempFile;

use tasktree::cli::CliArgs;
use tasktree::config::{ItemConfig, build_recipe, load_and_validate};
use tasktree::errors::TaskTreeError;
use tasktree::{DoneWith, WorkflowPolicy};

type TestResult = Result<(), Box<dyn Error>>;

fn recipe_file(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    write!(file, "{contents}")?;
    Ok(file)
}

fn expect_config_error(contents: &str, needle: &str) -> TestResult {
    let file = recipe_file(contents)?;
    match load_and_validate(file.path()) {
        Err(TaskTreeError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "unexpected message: {msg}");
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
    Ok(())
}

#[test]
fn test_full_recipe_loads_with_defaults() -> TestResult {
    init_tracing();
    let file = recipe_file(
        r#"
[root]
name = "ci"

[[root.children]]
kind = "task"
name = "build"
cmd = "true"

[[root.children]]
kind = "group"
parallel_limit = 0
workflow_policy = "continue_on_error"

[[root.children.children]]
kind = "task"
name = "lint"
sleep_ms = 1
skip = true
"#,
    )?;

    let recipe = load_and_validate(file.path())?;
    assert_eq!(recipe.config.timeout_ms, None);
    assert_eq!(recipe.root.parallel_limit, 1);
    assert_eq!(recipe.root.workflow_policy, WorkflowPolicy::StopOnError);
    assert_eq!(recipe.task_count(), 2);

    match &recipe.root.children[1] {
        ItemConfig::Group(group) => {
            assert_eq!(group.parallel_limit, 0);
            assert_eq!(group.workflow_policy, WorkflowPolicy::ContinueOnError);
        }
        other => panic!("expected a group, got {other:?}"),
    }
    assert_eq!(build_recipe(&recipe).task_count(), 2);
    Ok(())
}

#[test]
fn test_duplicate_task_names_are_rejected() -> TestResult {
    expect_config_error(
        r#"
[root]

[[root.children]]
kind = "task"
name = "a"
cmd = "true"

[[root.children]]
kind = "group"

[[root.children.children]]
kind = "task"
name = "a"
sleep_ms = 1
"#,
        "more than once",
    )
}

#[test]
fn test_task_needs_exactly_one_action() -> TestResult {
    expect_config_error(
        r#"
[root]

[[root.children]]
kind = "task"
name = "idle"
"#,
        "needs either",
    )?;
    expect_config_error(
        r#"
[root]

[[root.children]]
kind = "task"
name = "both"
cmd = "true"
sleep_ms = 3
"#,
        "both",
    )
}

#[test]
fn test_zero_timeout_is_rejected() -> TestResult {
    expect_config_error(
        r#"
[config]
timeout_ms = 0

[root]
"#,
        "timeout_ms",
    )
}

#[test]
fn test_empty_task_name_is_rejected() -> TestResult {
    expect_config_error(
        r#"
[root]

[[root.children]]
kind = "task"
name = "  "
cmd = "true"
"#,
        "empty name",
    )
}

#[test]
fn test_unknown_policy_is_a_toml_error() -> TestResult {
    let file = recipe_file(
        r#"
[root]
workflow_policy = "sometimes"
"#,
    )?;
    match load_and_validate(file.path()) {
        Err(TaskTreeError::TomlError(_)) => Ok(()),
        other => panic!("Expected TomlError, got: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_file_is_an_io_error() {
    let result = load_and_validate("/definitely/not/here/TaskTree.toml");
    assert!(matches!(result, Err(TaskTreeError::IoError(_))));
}

#[tokio::test]
async fn test_run_executes_a_recipe_file() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();
        let file = recipe_file(
            r#"
[config]
timeout_ms = 4000

[root]
parallel_limit = 0

[[root.children]]
kind = "task"
name = "short"
sleep_ms = 5

[[root.children]]
kind = "task"
name = "skipped"
sleep_ms = 60000
skip = true
"#,
        )?;
        let args = CliArgs {
            config: file.path().display().to_string(),
            log_level: None,
            dry_run: false,
        };
        assert_eq!(tasktree::run(args).await?, DoneWith::Success);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_task_timeout_fails_the_run() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();
        let file = recipe_file(
            r#"
[root]

[[root.children]]
kind = "task"
name = "slow"
sleep_ms = 60000
timeout_ms = 20
"#,
        )?;
        let args = CliArgs {
            config: file.path().display().to_string(),
            log_level: None,
            dry_run: false,
        };
        assert_eq!(tasktree::run(args).await?, DoneWith::Error);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_dry_run_does_not_execute() -> TestResult {
    init_tracing();
    let file = recipe_file(
        r#"
[root]

[[root.children]]
kind = "task"
name = "never"
cmd = "exit 1"
"#,
    )?;
    let args = CliArgs {
        config: file.path().display().to_string(),
        log_level: None,
        dry_run: true,
    };
    assert_eq!(tasktree::run(args).await?, DoneWith::Success);
    Ok(())
}

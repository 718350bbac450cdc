// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `tasktree`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tasktree",
    version,
    about = "Run a declarative tree of tasks described in a TOML recipe.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the recipe file (TOML).
    ///
    /// Default: `TaskTree.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "TaskTree.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKTREE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the tree, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_tasktree_toml() {
        let args = CliArgs::try_parse_from(["tasktree"]).unwrap();
        assert_eq!(args.config, "TaskTree.toml");
        assert!(args.log_level.is_none());
        assert!(!args.dry_run);
    }

    #[test]
    fn parses_flags() {
        let args = CliArgs::try_parse_from([
            "tasktree",
            "--config",
            "ci.toml",
            "--log-level",
            "debug",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.config, "ci.toml");
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(args.dry_run);
    }
}

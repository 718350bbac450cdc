// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only the outer layers (recipe files, blocking runner, CLI) return these.
//! Misuse of the engine itself is logged and skipped, never returned.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskTreeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskTreeError>;

// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawRecipeFile, RecipeFile};
use crate::errors::Result;

/// Read and deserialize a recipe file without semantic validation.
///
/// Use [`load_and_validate`] to get a [`RecipeFile`] the builder accepts.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawRecipeFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let raw: RawRecipeFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), "recipe file parsed");

    Ok(raw)
}

/// Load a recipe file and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - empty or duplicate task names,
///   - tasks without exactly one action (`cmd` or `sleep_ms`),
///   - zero timeouts.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<RecipeFile> {
    let raw = load_from_path(&path)?;
    let recipe = RecipeFile::try_from(raw)?;
    Ok(recipe)
}

/// Default recipe location: `TaskTree.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("TaskTree.toml")
}

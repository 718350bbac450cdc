// src/config/mod.rs

//! Recipe files: TOML model, validation, loading and building.

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::build_recipe;
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{GroupConfig, ItemConfig, RawRecipeFile, RecipeFile, RunSection, TaskConfig};

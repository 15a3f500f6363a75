// src/config/mod.rs

//! Configuration: executor settings and task-graph files (TOML).
//!
//! - [`model`] holds the `serde` types.
//! - [`loader`] reads files and applies environment overrides.
//! - [`validate`] turns a [`RawGraphFile`] into a checked [`GraphConfig`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{apply_env_overrides, default_graph_path, load_and_validate, load_from_path};
pub use model::{ExecutorConfig, GraphConfig, RawGraphFile, TaskConfig};

// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::model::{ExecutorConfig, GraphConfig, RawGraphFile};
use crate::errors::Result;

/// Environment variable that overrides `[executor].workers`.
pub const WORKERS_ENV: &str = "DAGPOOL_WORKERS";

/// Read and deserialize a graph file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawGraphFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let graph: RawGraphFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), tasks = graph.task.len(), "graph file parsed");

    Ok(graph)
}

/// Read a graph file and validate it: known `after` references, no
/// cycles, sane executor settings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<GraphConfig> {
    let raw = load_from_path(&path)?;
    let graph = GraphConfig::try_from(raw)?;
    Ok(graph)
}

/// Apply `DAGPOOL_WORKERS` if it is set to a valid number.
///
/// Invalid values are logged and ignored.
pub fn apply_env_overrides(config: &mut ExecutorConfig) {
    let Ok(raw) = std::env::var(WORKERS_ENV) else {
        return;
    };
    match raw.trim().parse::<usize>() {
        Ok(workers) => {
            debug!(workers, "worker count overridden from {WORKERS_ENV}");
            config.workers = workers;
        }
        Err(err) => warn!(value = %raw, error = %err, "ignoring invalid {WORKERS_ENV}"),
    }
}

/// Graph file used when `--graph` is not given.
pub fn default_graph_path() -> PathBuf {
    PathBuf::from("Dagpool.toml")
}

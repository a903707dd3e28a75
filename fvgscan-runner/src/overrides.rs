//! JSON persistence for the parameter override store.
//!
//! When the file exists it is authoritative, defaults included. When it does
//! not, the store starts from the config defaults with no overrides.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use fvgscan_core::params::{ParameterSet, ParameterStore};

pub const DEFAULT_OVERRIDES_PATH: &str = "data/parameters.json";

/// Load the store at `path`, or a fresh one over `defaults` if absent.
pub fn load_store(path: &Path, defaults: ParameterSet) -> Result<ParameterStore> {
    if !path.exists() {
        debug!(path = %path.display(), "no override file, using defaults");
        return ParameterStore::new(defaults).context("invalid default parameters");
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("read overrides {}", path.display()))?;
    let store = ParameterStore::from_json(&json)
        .with_context(|| format!("parse overrides {}", path.display()))?;
    debug!(path = %path.display(), version = store.version(), "loaded parameter overrides");
    Ok(store)
}

/// Write the store as pretty JSON, creating parent directories.
pub fn save_store(path: &Path, store: &ParameterStore) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    std::fs::write(path, store.to_json())
        .with_context(|| format!("write overrides {}", path.display()))?;
    Ok(())
}

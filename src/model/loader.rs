//! Loads behavior definitions from a directory tree.
//!
//! Layout: one sub-directory per category, one `*.json` behavior per file.
//! A behavior whose file leaves `category` empty inherits the directory name.
//!
//! ```text
//! behaviors/
//!   device/
//!     purifier.json
//!   person/
//!     auth.json
//! ```

use super::Behavior;
use crate::error::{Result, RosixError};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub fn load_behaviors_from_dir(root: impl AsRef<Path>) -> Result<Vec<Behavior>> {
    let root = root.as_ref();
    let mut categories = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| io_error(root, e))? {
        let entry = entry.map_err(|e| io_error(root, e))?;
        if entry.path().is_dir() {
            categories.push(entry.path());
        }
    }
    categories.sort();

    let mut behaviors = Vec::new();
    for dir in categories {
        let category = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let loaded = load_category(&dir, &category)?;
        debug!(%category, count = loaded.len(), "Loaded behavior category");
        behaviors.extend(loaded);
    }

    info!(dir = %root.display(), count = behaviors.len(), "Loaded behaviors");
    Ok(behaviors)
}

fn load_category(dir: &Path, category: &str) -> Result<Vec<Behavior>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
        let path = entry.map_err(|e| io_error(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();

    files
        .iter()
        .map(|path| {
            let mut behavior = load_behavior_file(path)?;
            if behavior.category.is_empty() {
                behavior.category = category.to_string();
            }
            Ok(behavior)
        })
        .collect()
}

pub fn load_behavior_file(path: &Path) -> Result<Behavior> {
    let data = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    serde_json::from_str(&data).map_err(|e| {
        RosixError::InvalidParameter(format!("behavior file {}: {e}", path.display()))
    })
}

fn io_error(path: &Path, e: std::io::Error) -> RosixError {
    RosixError::Internal(format!("{}: {e}", path.display()))
}

use std::fs::create_dir_all;
use std::path::Path;
use std::path::PathBuf;

use tracing::error;

use crate::Result;
use crate::StorageError;

pub fn create_dir_if_not_exist(dir: &Path) -> Result<()> {
    if !dir.exists() {
        if let Err(e) = create_dir_all(dir) {
            error!("Failed to create directory {:?}: {:?}", dir, e);
            return Err(StorageError::PathError {
                path: dir.to_path_buf(),
                source: e,
            }
            .into());
        }
    }
    Ok(())
}

/// Files directly under `dir` whose stem is a number and whose extension is
/// `ext`, sorted by that number.
pub fn numbered_files(
    dir: &Path,
    ext: &str,
) -> Result<Vec<(u64, PathBuf)>> {
    let entries = std::fs::read_dir(dir).map_err(|e| StorageError::PathError {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = vec![];
    for entry in entries {
        let path = entry.map_err(StorageError::Io)?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        let number = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(n) = number {
            files.push((n, path));
        }
    }
    files.sort_by_key(|(n, _)| *n);
    Ok(files)
}

use std::fs::create_dir_all;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::error;

use crate::ProvisionError;
use crate::Result;

fn path_error(
    path: &Path,
    source: std::io::Error,
) -> ProvisionError {
    ProvisionError::PathError {
        path: path.to_path_buf(),
        source,
    }
}

pub fn create_parent_dir_if_not_exist(path: &Path) -> Result<()> {
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.exists() {
            if let Err(e) = create_dir_all(parent_dir) {
                error!("Failed to create parent directory: {:?}", e);
                return Err(path_error(parent_dir, e).into());
            }
        }
    }
    Ok(())
}

/// Create `path` (and its parents) if it does not exist yet
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        create_dir_all(path).map_err(|e| path_error(path, e))?;
        debug!("created directory: {:?}", path);
    }
    Ok(())
}

pub fn open_file_for_append(path: PathBuf) -> Result<File> {
    create_parent_dir_if_not_exist(&path)?;
    let log_file = match OpenOptions::new().append(true).create(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            return Err(path_error(&path, e).into());
        }
    };
    Ok(log_file)
}

/// Truncating open used for per-run generator logs
pub fn create_file(path: &Path) -> Result<File> {
    create_parent_dir_if_not_exist(path)?;
    File::create(path).map_err(|e| path_error(path, e).into())
}

/// Replace `path` with `content` via a sibling temp file and rename, so a
/// reader never observes a half-written file.
pub fn write_atomically(
    path: &Path,
    content: &str,
) -> Result<()> {
    create_parent_dir_if_not_exist(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let write = || -> std::io::Result<()> {
        let mut f = File::create(&tmp_path)?;
        f.write_all(content.as_bytes())?;
        f.sync_all()?;
        std::fs::rename(&tmp_path, path)
    };

    if let Err(e) = write() {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(path_error(path, e).into());
    }
    Ok(())
}

/// Append lines to an existing file, never truncating it
pub fn append_lines<S: AsRef<str>>(
    path: &Path,
    lines: &[S],
) -> Result<()> {
    let mut f = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| path_error(path, e))?;
    for line in lines {
        writeln!(f, "{}", line.as_ref()).map_err(|e| path_error(path, e))?;
    }
    Ok(())
}

/// Remove a directory tree if present
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| path_error(path, e))?;
        debug!("removed stale directory: {:?}", path);
    }
    Ok(())
}

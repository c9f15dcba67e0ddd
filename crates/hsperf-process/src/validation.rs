//! Executable validation.
//!
//! A missing or non-executable binary is a configuration error and is
//! reported before anything is spawned.

use hsperf_common::{Error, Result};
use std::path::{Path, PathBuf};

/// Validate that `path` names an existing, executable regular file.
pub fn validate_executable(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::config("Executable path cannot be empty"));
    }

    let metadata = std::fs::metadata(path).map_err(|e| {
        Error::config(format!("Executable {} is not accessible: {}", path.display(), e))
    })?;

    if !metadata.is_file() {
        return Err(Error::config(format!(
            "Executable {} is not a regular file",
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(Error::config(format!(
                "Executable {} is not executable",
                path.display()
            )));
        }
    }

    Ok(())
}

/// Resolve an executable name the way a shell would.
///
/// Names containing a path separator are taken as paths; bare names are
/// looked up in `PATH`. The result is validated either way.
pub fn resolve_executable(name: &Path) -> Result<PathBuf> {
    if name.components().count() > 1 || name.is_absolute() {
        validate_executable(name)?;
        return Ok(name.to_path_buf());
    }

    let search_path = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&search_path) {
        let candidate = dir.join(name);
        if validate_executable(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    Err(Error::config(format!(
        "Executable {} not found in PATH",
        name.display()
    )))
}

//! Path containment checks against the allowed directory set.
//!
//! All checks are lexical: `.` and `..` are collapsed without touching the
//! filesystem, so `/tmp/../etc/x` resolves to `/etc/x` and fails containment
//! even when `/tmp` is allowed. Tilde is never expanded — the execution
//! environment is scrubbed and has no HOME — so a `~`-prefixed argument is
//! treated as a relative component.

use std::path::{Component, Path, PathBuf};

/// Collapse `.` and `..` components without filesystem access.
///
/// Root-stable: popping at `/` is a no-op, so `..` sequences cannot escape
/// above the root.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Component-wise prefix containment against the allowed set.
pub fn is_contained(path: &Path, allowed_dirs: &[PathBuf]) -> bool {
    allowed_dirs.iter().any(|dir| path.starts_with(dir))
}

/// Check a path argument of a command against the allowed directories.
///
/// Relative paths are joined onto `base` before normalisation. Returns the
/// normalised path, or the complete denial reason.
pub fn check_path_argument(
    arg: &str,
    base: &Path,
    allowed_dirs: &[PathBuf],
    default_reason: &str,
) -> Result<PathBuf, String> {
    if arg.is_empty() {
        return Err("empty path not allowed".to_string());
    }

    let raw = Path::new(arg);
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        base.join(raw)
    };
    let resolved = normalize_path(&joined);

    if is_contained(&resolved, allowed_dirs) {
        Ok(resolved)
    } else {
        Err(format!(
            "path {arg:?} is outside of allowed directories: {default_reason}"
        ))
    }
}

/// Check a request's working directory. The directory must be absolute and
/// inside the allowed set; the normalised form is returned.
pub fn check_working_directory(
    dir: &str,
    allowed_dirs: &[PathBuf],
    default_reason: &str,
) -> Result<PathBuf, String> {
    let denied = || format!("directory {dir:?} is not allowed: {default_reason}");

    if dir.is_empty() {
        return Err(denied());
    }
    let raw = Path::new(dir);
    if !raw.is_absolute() {
        return Err(denied());
    }
    let resolved = normalize_path(raw);
    if is_contained(&resolved, allowed_dirs) {
        Ok(resolved)
    } else {
        Err(denied())
    }
}

//! Logical path handling.
//!
//! A logical path is appended to the mount point verbatim:
//! `<mount point>/<logical path>`. Nothing is normalized, so by default a
//! `..` segment addresses locations outside the volume.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Join `logical` onto `mount_point` with a single separator.
///
/// With `contain` set, a logical path holding a `..` segment is rejected
/// instead of being resolved.
pub fn resolve(mount_point: &Path, logical: &str, contain: bool) -> Result<PathBuf, StorageError> {
    if contain && escapes(logical) {
        return Err(StorageError::PathEscapes {
            path: logical.to_string(),
        });
    }

    let mut joined = OsString::from(mount_point.as_os_str());
    joined.push("/");
    joined.push(logical);
    Ok(PathBuf::from(joined))
}

fn escapes(logical: &str) -> bool {
    logical.split('/').any(|segment| segment == "..")
}

/// Final component of a logical path, `basename(3)` style.
pub fn base_name(logical: &str) -> String {
    if logical.is_empty() {
        return ".".to_string();
    }

    let trimmed = logical.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }

    match trimmed.rfind('/') {
        Some(idx) => trimmed[idx + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

/// Logical path of a directory entry.
pub fn child(parent: &str, name: &str) -> String {
    format!("{}/{}", parent, name)
}

//! Absolute, `/`-separated node path helpers.

use crate::error::StoreError;

pub const ROOT: &str = "/";

/// Collapses duplicate separators and trailing slashes. Rejects relative
/// paths and `.`/`..` segments.
pub fn normalize(path: &str) -> Result<String, StoreError> {
    if !path.starts_with('/') {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let mut normalized = String::with_capacity(path.len());
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    Ok(normalized)
}

pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Parent of a normalized path. The root has none.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(index) => Some(&path[..index]),
        None => None,
    }
}

/// Last segment of a normalized path. Empty for the root.
pub fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

pub fn depth(path: &str) -> usize {
    path.split('/').filter(|segment| !segment.is_empty()).count()
}

/// Validates a single child name.
pub fn check_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(StoreError::InvalidPath(name.to_string()));
    }
    Ok(())
}

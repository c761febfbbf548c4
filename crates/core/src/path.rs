//! Object key helpers
//!
//! Mapping between local file paths and object keys.

use std::path::Path;

use crate::error::{Error, Result};

/// Strip everything up to and including the last `/` of an object key
///
/// `some/prefix/object.zip` becomes `object.zip`; a key without `/` is
/// returned unchanged.
pub fn remove_object_prefix(key: &str) -> &str {
    match key.rfind('/') {
        Some(index) => &key[index + 1..],
        None => key,
    }
}

/// Build the object key for a local file: `prefix` followed by the file name
///
/// A `/` is inserted between a non-empty prefix and the file name when the
/// prefix does not already end with one.
pub fn object_key_for(prefix: &str, file: &Path) -> Result<String> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidPath(file.display().to_string()))?;

    if prefix.is_empty() || prefix.ends_with('/') {
        Ok(format!("{prefix}{name}"))
    } else {
        Ok(format!("{prefix}/{name}"))
    }
}

/// Local destination for a downloaded key: `dir` joined with the key's base name
pub fn local_path_for(dir: &Path, key: &str) -> Result<std::path::PathBuf> {
    let name = remove_object_prefix(key);
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidPath(key.to_string()));
    }
    Ok(dir.join(name))
}

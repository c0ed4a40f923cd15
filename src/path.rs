//! Path handling for the single VFS namespace.
//!
//! Paths are `/`-separated UTF-8 strings. The facade normalizes user input
//! once; everything below the facade works on canonical absolute paths and
//! mount-relative keys.

use crate::error::{ErrorKind, VfsResult};

/// Coerces user input into an absolute path.
///
/// Rejects the empty string and prepends `/` when missing. No other cleanup
/// happens here; see [`normalize`].
pub fn to_absolute(path: &str) -> VfsResult<String> {
    if path.is_empty() {
        return Err(ErrorKind::InvalidPath.into());
    }
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Ok(format!("/{path}"))
    }
}

/// Canonicalizes an absolute path: collapses duplicate separators, resolves
/// `.` and `..` segments, and strips any trailing separator. `..` at the root
/// stays at the root.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Splits an absolute path into the key relative to `mount_point`: the prefix
/// is stripped, then one leading `/`. Equal paths produce the empty key,
/// which denotes the mount root.
pub fn to_relative(path: &str, mount_point: &str) -> String {
    let rest = path.strip_prefix(mount_point).unwrap_or(path);
    rest.strip_prefix('/').unwrap_or(rest).to_string()
}

/// True if `path` begins with `prefix`. The empty prefix matches everything.
pub fn has_prefix(path: &str, prefix: &str) -> bool {
    prefix.is_empty() || path == prefix || path.starts_with(prefix)
}

/// True if `path` lies strictly below `prefix`: the prefix matches and the
/// next character is a separator. The root prefix `/` is a special case
/// because it already ends with the separator.
pub fn is_strict_child(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return path.len() > 1 && path.starts_with('/');
    }
    path.len() > prefix.len()
        && path.starts_with(prefix)
        && path.as_bytes()[prefix.len()] == b'/'
}

/// The parent of a relative key, or `None` for top-level keys and the mount
/// root itself.
pub fn key_parent(key: &str) -> Option<&str> {
    key.rsplit_once('/').map(|(parent, _)| parent)
}

/// The final component of a relative key.
pub fn key_basename(key: &str) -> &str {
    key.rsplit_once('/').map_or(key, |(_, base)| base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_absolute_prepends_slash() {
        assert_eq!(to_absolute("a/b").unwrap(), "/a/b");
        assert_eq!(to_absolute("/a/b").unwrap(), "/a/b");
        assert_eq!(
            *to_absolute("").unwrap_err().kind(),
            ErrorKind::InvalidPath
        );
    }

    #[test]
    fn normalize_collapses_segments() {
        assert_eq!(normalize("/a//b/./c/"), "/a/b/c");
        assert_eq!(normalize("/a/b/../c"), "/a/c");
        assert_eq!(normalize("/../.."), "/");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn relative_keys() {
        assert_eq!(to_relative("/data/x/y", "/data"), "x/y");
        assert_eq!(to_relative("/data", "/data"), "");
        assert_eq!(to_relative("/a/b", "/"), "a/b");
        assert_eq!(to_relative("/", "/"), "");
    }

    #[test]
    fn prefix_relations() {
        assert!(has_prefix("/a/b", ""));
        assert!(has_prefix("/a/b", "/a"));
        assert!(has_prefix("/a/b", "/a/b"));
        assert!(!has_prefix("/a", "/a/b"));

        assert!(is_strict_child("/a/b", "/a"));
        assert!(is_strict_child("/a/b", "/"));
        assert!(!is_strict_child("/a", "/a"));
        assert!(!is_strict_child("/ab", "/a"));
        assert!(!is_strict_child("/", "/"));
    }

    #[test]
    fn key_components() {
        assert_eq!(key_parent("a/b/c"), Some("a/b"));
        assert_eq!(key_parent("a"), None);
        assert_eq!(key_basename("a/b/c"), "c");
        assert_eq!(key_basename("a"), "a");
    }
}

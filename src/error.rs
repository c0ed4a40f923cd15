//! The canonical error currency of the VFS core.
//!
//! Backend adapters own the mapping from their native error domains into
//! [`ErrorKind`]; nothing backend-native crosses the core boundary.

use std::fmt;
use thiserror::Error;

/// Canonical error kinds. Every failing operation yields exactly one of
/// these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("invalid path")]
    InvalidPath,
    #[error("not mounted")]
    NotMounted,
    #[error("already mounted")]
    AlreadyMounted,
    #[error("mount is busy")]
    MountBusy,
    #[error("mount nesting denied")]
    NestingDenied,
    #[error("mount failed: {0}")]
    MountFailed(String),
    #[error("unmount failed: {0}")]
    UnmountFailed(String),
    #[error("no such file or directory")]
    NotExist,
    #[error("file exists")]
    Exist,
    #[error("is a directory")]
    IsDirectory,
    #[error("not a directory")]
    NotDirectory,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("permission denied")]
    Permission,
    #[error("read-only filesystem")]
    ReadOnly,
    #[error("handle is closed")]
    Closed,
    #[error("resource is busy")]
    Busy,
    #[error("invalid argument")]
    Invalid,
    #[error("resource is in use")]
    InUse,
    #[error("object size {size} is below the backend minimum {min}")]
    ObjectTooSmall { size: u64, min: u64 },
    #[error("object size {size} is above the backend maximum {max}")]
    ObjectTooLarge { size: u64, max: u64 },
    #[error("backend {name} does not provide the requested capability")]
    BackendUnsupported { name: String },
    #[error("backend {name} does not implement the role it was assigned")]
    BackendIncompatible { name: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("not implemented")]
    NotImplemented,
}

/// An error raised by a VFS operation.
///
/// Carries the canonical [`ErrorKind`] plus, once it has crossed the facade,
/// the operation name and path it happened under.
#[derive(Debug, Clone)]
pub struct VfsError {
    kind: ErrorKind,
    op: Option<&'static str>,
    path: Option<String>,
}
impl VfsError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            op: None,
            path: None,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// True if the error is of the given canonical kind.
    pub fn is(&self, kind: &ErrorKind) -> bool {
        self.kind == *kind
    }

    pub fn op(&self) -> Option<&'static str> {
        self.op
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Attaches the operation and path context reported to callers.
    ///
    /// The innermost context wins; re-wrapping at an outer layer keeps the
    /// original operation name.
    pub(crate) fn with_op(mut self, op: &'static str, path: impl Into<String>) -> Self {
        if self.op.is_none() {
            self.op = Some(op);
            self.path = Some(path.into());
        }
        self
    }
}
impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.op, &self.path) {
            (Some(op), Some(path)) => write!(f, "{op} {path}: {}", self.kind),
            (Some(op), None) => write!(f, "{op}: {}", self.kind),
            _ => write!(f, "{}", self.kind),
        }
    }
}
impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}
impl From<ErrorKind> for VfsError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}
impl PartialEq<ErrorKind> for VfsError {
    fn eq(&self, other: &ErrorKind) -> bool {
        self.kind == *other
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_attached_once() {
        let err = VfsError::new(ErrorKind::NotExist)
            .with_op("open_file", "/a.txt")
            .with_op("outer", "/ignored");
        assert_eq!(err.op(), Some("open_file"));
        assert_eq!(err.to_string(), "open_file /a.txt: no such file or directory");
    }

    #[test]
    fn kind_comparison() {
        let err = VfsError::from(ErrorKind::ReadOnly);
        assert_eq!(err, ErrorKind::ReadOnly);
        assert!(err.is(&ErrorKind::ReadOnly));
    }
}

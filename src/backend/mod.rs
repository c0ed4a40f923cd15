//! Backend contracts consumed by the mount layer.
//!
//! Every backend implements [`Backend`] for lifecycle and capability
//! negotiation. A mount requires one [`ObjectStorage`]; a [`MetadataStore`]
//! and the extension capabilities are optional roles a backend may also
//! fill. Backends own the translation from their native error domain into
//! the canonical taxonomy; the core never inspects native errors.

pub mod memory;

use crate::context::Context;
use crate::error::VfsResult;
use crate::metadata::{AccessMode, FileMetadata, FileMode, FileStat, MetadataUpdate};
use crate::query::{MetadataQuery, MetadataQueryResult};
use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// A capability a backend may satisfy beyond plain object storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Metadata,
    Acl,
    Cache,
    Encrypt,
    Multipart,
    Rubbish,
    Snapshot,
    Versioning,
}
impl CapabilityKind {
    /// The extension kinds a mount binds into slots, in detection order.
    /// `Metadata` is a first-class role and deliberately not part of this
    /// list.
    pub const EXTENSIONS: [CapabilityKind; 7] = [
        CapabilityKind::Acl,
        CapabilityKind::Cache,
        CapabilityKind::Encrypt,
        CapabilityKind::Multipart,
        CapabilityKind::Rubbish,
        CapabilityKind::Snapshot,
        CapabilityKind::Versioning,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityKind::Metadata => "metadata",
            CapabilityKind::Acl => "acl",
            CapabilityKind::Cache => "cache",
            CapabilityKind::Encrypt => "encrypt",
            CapabilityKind::Multipart => "multipart",
            CapabilityKind::Rubbish => "rubbish",
            CapabilityKind::Snapshot => "snapshot",
            CapabilityKind::Versioning => "versioning",
        }
    }

    fn bit(self) -> u16 {
        match self {
            CapabilityKind::Metadata => 1 << 0,
            CapabilityKind::Acl => 1 << 1,
            CapabilityKind::Cache => 1 << 2,
            CapabilityKind::Encrypt => 1 << 3,
            CapabilityKind::Multipart => 1 << 4,
            CapabilityKind::Rubbish => 1 << 5,
            CapabilityKind::Snapshot => 1 << 6,
            CapabilityKind::Versioning => 1 << 7,
        }
    }
}
impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a backend negotiates at composition time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    /// Smallest object the backend accepts, if bounded.
    pub min_object_size: Option<u64>,
    /// Largest object the backend accepts, if bounded.
    pub max_object_size: Option<u64>,
    /// The backend refuses all mutation.
    pub read_only: bool,
    kinds: u16,
}
impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: CapabilityKind) -> Self {
        self.kinds |= kind.bit();
        self
    }

    pub fn contains(&self, kind: CapabilityKind) -> bool {
        self.kinds & kind.bit() != 0
    }
}

/// Common lifecycle every backend exposes.
///
/// `open` must be idempotent: a backend reached through several roles of one
/// mount is still opened and closed exactly once per unique instance, but a
/// backend shared across mounts will see one open per mount.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    async fn open(&self, ctx: &Context) -> VfsResult<()>;

    async fn close(&self, ctx: &Context) -> VfsResult<()>;

    fn capabilities(&self) -> CapabilitySet;
}

/// Outcome of a ranged read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    pub bytes: usize,
    /// The read exhausted the object. Not an error.
    pub eof: bool,
}

/// The primary storage contract: offset-addressed objects under flat keys.
#[async_trait]
pub trait ObjectStorage: Backend {
    /// Stats a single key. The empty key names the mount root and always
    /// resolves to a directory.
    async fn head(&self, ctx: &Context, key: &str) -> VfsResult<FileStat>;

    /// Lists `key`: a file yields its own single entry, a directory its
    /// direct children. Implicit empty roots synthesize a directory entry.
    async fn list(&self, ctx: &Context, key: &str) -> VfsResult<Vec<FileStat>>;

    /// Creates an entry. The parent directory must already exist.
    async fn create(&self, ctx: &Context, key: &str, mode: FileMode) -> VfsResult<FileStat>;

    /// Reads at `offset` into `buf`.
    async fn read(
        &self,
        ctx: &Context,
        key: &str,
        offset: u64,
        buf: &mut [u8],
    ) -> VfsResult<ReadOutcome>;

    /// Writes `data` at `offset`, extending the object when the write ends
    /// past its current size.
    async fn write(&self, ctx: &Context, key: &str, offset: u64, data: &[u8]) -> VfsResult<usize>;

    async fn truncate(&self, ctx: &Context, key: &str, size: u64) -> VfsResult<()>;

    /// Deletes an entry. Without `force` a directory is refused; with it the
    /// subtree cascades.
    async fn delete(&self, ctx: &Context, key: &str, force: bool) -> VfsResult<()>;

    /// Casts this instance into its metadata role, when it has one. Used by
    /// the composer for dual-mount auto-detection.
    fn as_metadata(self: Arc<Self>) -> Option<Arc<dyn MetadataStore>> {
        None
    }

    /// Casts this instance into an extension role it claims to satisfy.
    fn as_extension(self: Arc<Self>, kind: CapabilityKind) -> Option<ExtensionHandle> {
        let _ = kind;
        None
    }
}

/// The metadata-index contract.
///
/// Keys arrive already namespaced by the mount; a store shared between
/// mounts never sees colliding keys.
#[async_trait]
pub trait MetadataStore: Backend {
    async fn create_meta(&self, ctx: &Context, meta: &FileMetadata) -> VfsResult<()>;

    async fn read_meta(&self, ctx: &Context, key: &str) -> VfsResult<FileMetadata>;

    async fn update_meta(
        &self,
        ctx: &Context,
        key: &str,
        update: &MetadataUpdate,
    ) -> VfsResult<()>;

    async fn delete_meta(&self, ctx: &Context, key: &str) -> VfsResult<()>;

    async fn exists_meta(&self, ctx: &Context, key: &str) -> VfsResult<bool>;

    async fn query_meta(
        &self,
        ctx: &Context,
        query: &MetadataQuery,
    ) -> VfsResult<MetadataQueryResult>;
}

/// Per-entry permission checks layered over the storage mount.
#[async_trait]
pub trait AclBackend: Backend {
    /// Fails with `Permission` when `mode` is not granted on `key`.
    async fn check(&self, ctx: &Context, key: &str, mode: AccessMode) -> VfsResult<()>;

    async fn permissions(&self, ctx: &Context, key: &str) -> VfsResult<FileMode>;

    async fn set_permissions(&self, ctx: &Context, key: &str, mode: FileMode) -> VfsResult<()>;
}

/// Whole-object read cache consulted ahead of the primary backend.
#[async_trait]
pub trait CacheBackend: Backend {
    async fn fetch(&self, ctx: &Context, key: &str) -> VfsResult<Option<Vec<u8>>>;

    async fn store(&self, ctx: &Context, key: &str, data: &[u8]) -> VfsResult<()>;

    async fn evict(&self, ctx: &Context, key: &str) -> VfsResult<()>;
}

/// Transparent data transform applied on the way into and out of the
/// primary backend. Transforms must preserve length.
#[async_trait]
pub trait EncryptBackend: Backend {
    async fn seal(&self, ctx: &Context, key: &str, offset: u64, data: &[u8])
    -> VfsResult<Vec<u8>>;

    async fn unseal(
        &self,
        ctx: &Context,
        key: &str,
        offset: u64,
        data: &[u8],
    ) -> VfsResult<Vec<u8>>;
}

/// Chunked-upload sessions for backends with large-object protocols.
#[async_trait]
pub trait MultipartBackend: Backend {
    /// Starts an upload session, returning its id.
    async fn begin(&self, ctx: &Context, key: &str) -> VfsResult<String>;

    /// Uploads one part, returning its receipt tag.
    async fn put_part(
        &self,
        ctx: &Context,
        upload: &str,
        part: u32,
        data: &[u8],
    ) -> VfsResult<String>;

    async fn commit(&self, ctx: &Context, upload: &str) -> VfsResult<FileStat>;

    async fn abort(&self, ctx: &Context, upload: &str) -> VfsResult<()>;
}

/// Point-in-time snapshots of a whole mount.
#[async_trait]
pub trait SnapshotBackend: Backend {
    async fn snapshot(&self, ctx: &Context, name: &str) -> VfsResult<()>;

    async fn restore(&self, ctx: &Context, name: &str) -> VfsResult<()>;

    async fn snapshots(&self, ctx: &Context) -> VfsResult<Vec<String>>;
}

/// Per-object version history.
#[async_trait]
pub trait VersioningBackend: Backend {
    async fn versions(&self, ctx: &Context, key: &str) -> VfsResult<Vec<FileStat>>;

    async fn restore_version(&self, ctx: &Context, key: &str, etag: &str) -> VfsResult<()>;
}

/// Soft-delete: unlink moves entries here instead of destroying them.
#[async_trait]
pub trait RubbishBackend: Backend {
    async fn discard(&self, ctx: &Context, key: &str) -> VfsResult<()>;

    async fn restore(&self, ctx: &Context, key: &str) -> VfsResult<()>;

    async fn purge(&self, ctx: &Context) -> VfsResult<()>;
}

/// A typed handle to a backend bound in an extension role.
#[derive(Clone)]
pub enum ExtensionHandle {
    Acl(Arc<dyn AclBackend>),
    Cache(Arc<dyn CacheBackend>),
    Encrypt(Arc<dyn EncryptBackend>),
    Multipart(Arc<dyn MultipartBackend>),
    Rubbish(Arc<dyn RubbishBackend>),
    Snapshot(Arc<dyn SnapshotBackend>),
    Versioning(Arc<dyn VersioningBackend>),
}
impl ExtensionHandle {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            ExtensionHandle::Acl(_) => CapabilityKind::Acl,
            ExtensionHandle::Cache(_) => CapabilityKind::Cache,
            ExtensionHandle::Encrypt(_) => CapabilityKind::Encrypt,
            ExtensionHandle::Multipart(_) => CapabilityKind::Multipart,
            ExtensionHandle::Rubbish(_) => CapabilityKind::Rubbish,
            ExtensionHandle::Snapshot(_) => CapabilityKind::Snapshot,
            ExtensionHandle::Versioning(_) => CapabilityKind::Versioning,
        }
    }

    /// The lifecycle view of the bound backend.
    pub fn backend(&self) -> Arc<dyn Backend> {
        match self {
            ExtensionHandle::Acl(b) => b.clone(),
            ExtensionHandle::Cache(b) => b.clone(),
            ExtensionHandle::Encrypt(b) => b.clone(),
            ExtensionHandle::Multipart(b) => b.clone(),
            ExtensionHandle::Rubbish(b) => b.clone(),
            ExtensionHandle::Snapshot(b) => b.clone(),
            ExtensionHandle::Versioning(b) => b.clone(),
        }
    }

    pub fn name(&self) -> String {
        self.backend().name().to_string()
    }
}
impl Debug for ExtensionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtensionHandle::{}({})", self.kind(), self.backend().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_set_kinds() {
        let caps = CapabilitySet::new()
            .with_kind(CapabilityKind::Metadata)
            .with_kind(CapabilityKind::Cache);
        assert!(caps.contains(CapabilityKind::Metadata));
        assert!(caps.contains(CapabilityKind::Cache));
        assert!(!caps.contains(CapabilityKind::Acl));
    }

    #[test]
    fn extension_order_excludes_metadata() {
        assert!(!CapabilityKind::EXTENSIONS.contains(&CapabilityKind::Metadata));
        assert_eq!(CapabilityKind::EXTENSIONS.len(), 7);
    }
}

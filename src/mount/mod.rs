//! Mount composition: one primary storage backend, optional metadata and
//! extension roles, composed behind a single mount point.

pub mod io;
pub mod registry;

use crate::backend::{
    AclBackend, Backend, CacheBackend, CapabilityKind, EncryptBackend, ExtensionHandle,
    MetadataStore, MultipartBackend, ObjectStorage, RubbishBackend, SnapshotBackend,
    VersioningBackend,
};
use crate::context::Context;
use crate::error::{ErrorKind, VfsResult};
use crate::metadata::FileMetadata;
use crate::path;
use crate::streamer::Streamer;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::warn;

/// Configuration accepted when composing a mount.
#[derive(Clone)]
pub struct MountOptions {
    /// Refuse every mutating operation through this mount.
    pub read_only: bool,
    /// Permit child mounts below this mount point.
    pub allow_nesting: bool,
    /// Bind roles the primary claims in its capability set without being
    /// told to.
    pub auto_detect_extensions: bool,
    /// Consult a bound cache extension on reads.
    pub cache_reads: bool,
    /// Populate a bound cache extension on whole-object writes.
    pub cache_writes: bool,
    /// Prefix applied to every key handed to the metadata store, so several
    /// mounts can share one index instance.
    pub metadata_namespace: Option<String>,
    /// Explicit metadata role; wins over auto-detection.
    pub metadata: Option<Arc<dyn MetadataStore>>,
    /// Explicit extension roles, keyed by the slot they fill.
    pub extensions: HashMap<CapabilityKind, ExtensionHandle>,
}
impl MountOptions {
    pub fn new() -> Self {
        Self {
            read_only: false,
            allow_nesting: true,
            auto_detect_extensions: true,
            cache_reads: true,
            cache_writes: true,
            metadata_namespace: None,
            metadata: None,
            extensions: HashMap::new(),
        }
    }
}
impl Default for MountOptions {
    fn default() -> Self {
        Self::new()
    }
}
impl Debug for MountOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountOptions")
            .field("read_only", &self.read_only)
            .field("allow_nesting", &self.allow_nesting)
            .field("auto_detect_extensions", &self.auto_detect_extensions)
            .field("cache_reads", &self.cache_reads)
            .field("cache_writes", &self.cache_writes)
            .field("metadata_namespace", &self.metadata_namespace)
            .field("metadata", &self.metadata.as_ref().map(|m| m.name().to_string()))
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A composed mount: the primary backend plus every optional role bound to
/// it, the open-streamer table, and the lifecycle of all unique backend
/// instances behind them.
pub struct Mount {
    mount_point: String,
    primary: Arc<dyn ObjectStorage>,
    metadata: Option<Arc<dyn MetadataStore>>,
    extensions: HashMap<CapabilityKind, ExtensionHandle>,
    options: MountOptions,
    dual_mount: bool,
    unique: Vec<Arc<dyn Backend>>,
    mount_time: SystemTime,
    streamers: DashMap<String, Arc<Streamer>>,
}
impl Mount {
    /// Composes a mount without opening any backend yet.
    ///
    /// Every explicitly supplied extension is type-checked against the slot
    /// it was given; with `auto_detect_extensions`, roles the primary claims
    /// in its capability set are bound through its cast hooks. A claim the
    /// cast does not honour is a composition error, reported eagerly.
    pub fn compose(
        mount_point: &str,
        primary: Arc<dyn ObjectStorage>,
        mut options: MountOptions,
    ) -> VfsResult<Arc<Self>> {
        let mount_point = path::normalize(&path::to_absolute(mount_point)?);
        let caps = primary.capabilities();

        let metadata = match options.metadata.take() {
            Some(explicit) => Some(explicit),
            None if options.auto_detect_extensions && caps.contains(CapabilityKind::Metadata) => {
                let cast = primary.clone().as_metadata().ok_or_else(|| {
                    ErrorKind::BackendUnsupported {
                        name: primary.name().to_string(),
                    }
                })?;
                Some(cast)
            }
            None => None,
        };
        let dual_mount = metadata
            .as_ref()
            .is_some_and(|m| thin_ptr_meta(m) == thin_ptr_storage(&primary));

        let mut extensions = std::mem::take(&mut options.extensions);
        for (slot, handle) in &extensions {
            if handle.kind() != *slot {
                return Err(ErrorKind::BackendIncompatible {
                    name: handle.name(),
                }
                .into());
            }
        }
        if options.auto_detect_extensions {
            for kind in CapabilityKind::EXTENSIONS {
                if extensions.contains_key(&kind) || !caps.contains(kind) {
                    continue;
                }
                let handle = primary.clone().as_extension(kind).ok_or_else(|| {
                    ErrorKind::BackendUnsupported {
                        name: primary.name().to_string(),
                    }
                })?;
                if handle.kind() != kind {
                    return Err(ErrorKind::BackendIncompatible {
                        name: handle.name(),
                    }
                    .into());
                }
                extensions.insert(kind, handle);
            }
        }

        let mut unique: Vec<Arc<dyn Backend>> = Vec::new();
        let mut push_unique = |backend: Arc<dyn Backend>| {
            let addr = Arc::as_ptr(&backend) as *const ();
            if !unique
                .iter()
                .any(|seen| Arc::as_ptr(seen) as *const () == addr)
            {
                unique.push(backend);
            }
        };
        push_unique(primary.clone());
        if let Some(meta) = &metadata {
            push_unique(meta.clone());
        }
        for handle in extensions.values() {
            push_unique(handle.backend());
        }

        Ok(Arc::new(Self {
            mount_point,
            primary,
            metadata,
            extensions,
            options,
            dual_mount,
            unique,
            mount_time: SystemTime::now(),
            streamers: DashMap::new(),
        }))
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    pub fn mount_time(&self) -> SystemTime {
        self.mount_time
    }

    /// True when the metadata role is the primary instance itself; the core
    /// then suppresses its own metadata writes.
    pub fn is_dual_mount(&self) -> bool {
        self.dual_mount
    }

    /// The mount refuses mutation, by option or by backend capability.
    pub fn is_read_only(&self) -> bool {
        self.options.read_only || self.primary.capabilities().read_only
    }

    pub fn primary(&self) -> &Arc<dyn ObjectStorage> {
        &self.primary
    }

    pub fn metadata(&self) -> Option<&Arc<dyn MetadataStore>> {
        self.metadata.as_ref()
    }

    /// The metadata store, but only when it is a distinct instance from the
    /// primary. All core-driven index writes go through this.
    pub(crate) fn distinct_metadata(&self) -> Option<Arc<dyn MetadataStore>> {
        if self.dual_mount {
            None
        } else {
            self.metadata.clone()
        }
    }

    pub fn extension(&self, kind: CapabilityKind) -> Option<&ExtensionHandle> {
        self.extensions.get(&kind)
    }

    pub fn acl(&self) -> Option<&Arc<dyn AclBackend>> {
        match self.extensions.get(&CapabilityKind::Acl) {
            Some(ExtensionHandle::Acl(b)) => Some(b),
            _ => None,
        }
    }

    pub fn cache(&self) -> Option<&Arc<dyn CacheBackend>> {
        match self.extensions.get(&CapabilityKind::Cache) {
            Some(ExtensionHandle::Cache(b)) => Some(b),
            _ => None,
        }
    }

    pub fn encrypt(&self) -> Option<&Arc<dyn EncryptBackend>> {
        match self.extensions.get(&CapabilityKind::Encrypt) {
            Some(ExtensionHandle::Encrypt(b)) => Some(b),
            _ => None,
        }
    }

    pub fn multipart(&self) -> Option<&Arc<dyn MultipartBackend>> {
        match self.extensions.get(&CapabilityKind::Multipart) {
            Some(ExtensionHandle::Multipart(b)) => Some(b),
            _ => None,
        }
    }

    pub fn rubbish(&self) -> Option<&Arc<dyn RubbishBackend>> {
        match self.extensions.get(&CapabilityKind::Rubbish) {
            Some(ExtensionHandle::Rubbish(b)) => Some(b),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Option<&Arc<dyn SnapshotBackend>> {
        match self.extensions.get(&CapabilityKind::Snapshot) {
            Some(ExtensionHandle::Snapshot(b)) => Some(b),
            _ => None,
        }
    }

    pub fn versioning(&self) -> Option<&Arc<dyn VersioningBackend>> {
        match self.extensions.get(&CapabilityKind::Versioning) {
            Some(ExtensionHandle::Versioning(b)) => Some(b),
            _ => None,
        }
    }

    /// The key the metadata store sees for a mount-relative key. A dual
    /// mount's backend keys its own index, so no namespace applies there.
    pub(crate) fn meta_key(&self, key: &str) -> String {
        match &self.options.metadata_namespace {
            Some(ns) if !self.dual_mount => format!("{ns}{key}"),
            _ => key.to_string(),
        }
    }

    /// Undoes [`Mount::meta_key`] on a record read back from the store.
    pub(crate) fn strip_namespace(&self, mut meta: FileMetadata) -> FileMetadata {
        if self.dual_mount {
            return meta;
        }
        if let Some(ns) = &self.options.metadata_namespace {
            if let Some(rest) = meta.key.strip_prefix(ns.as_str()) {
                meta.key = rest.to_string();
            }
        }
        meta
    }

    /// Opens every unique backend instance. On failure the instances already
    /// opened are closed again and the whole mount fails.
    pub(crate) async fn open_backends(&self, ctx: &Context) -> VfsResult<()> {
        let mut opened: Vec<&Arc<dyn Backend>> = Vec::new();
        for backend in &self.unique {
            if let Err(err) = backend.open(ctx).await {
                for prior in opened {
                    if let Err(close_err) = prior.close(ctx).await {
                        warn!(
                            backend = prior.name(),
                            error = %close_err,
                            "rollback close failed while aborting mount"
                        );
                    }
                }
                return Err(ErrorKind::MountFailed(format!(
                    "backend {}: {}",
                    backend.name(),
                    err.kind()
                ))
                .into());
            }
            opened.push(backend);
        }
        Ok(())
    }

    /// Closes every streamer, then every unique backend instance.
    ///
    /// With `force` unset a busy streamer aborts the teardown; otherwise
    /// close failures are aggregated while the teardown keeps going.
    pub(crate) async fn teardown(&self, ctx: &Context, force: bool) -> VfsResult<()> {
        if !force && self.has_busy_streamer() {
            return Err(ErrorKind::Busy.into());
        }

        let handles: Vec<Arc<Streamer>> = self
            .streamers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for streamer in handles {
            if let Err(err) = streamer.close().await {
                if !err.is(&ErrorKind::Closed) {
                    warn!(key = streamer.key(), error = %err, "streamer close failed during unmount");
                }
            }
        }

        let mut failures: Vec<String> = Vec::new();
        for backend in &self.unique {
            if let Err(err) = backend.close(ctx).await {
                failures.push(format!("backend {}: {}", backend.name(), err.kind()));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ErrorKind::UnmountFailed(failures.join("; ")).into())
        }
    }

    pub fn open_streamer_count(&self) -> usize {
        self.streamers.len()
    }

    /// True if any open streamer is mid-operation.
    pub fn has_busy_streamer(&self) -> bool {
        self.streamers.iter().any(|entry| entry.value().is_busy())
    }

    pub(crate) fn streamer_for(&self, key: &str) -> Option<Arc<Streamer>> {
        self.streamers.get(key).map(|entry| entry.value().clone())
    }

    pub(crate) fn adopt_streamer(&self, key: &str, streamer: Arc<Streamer>) {
        self.streamers.insert(key.to_string(), streamer);
    }

    pub(crate) fn forget_streamer(&self, key: &str) {
        self.streamers.remove(key);
    }
}
impl Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("mount_point", &self.mount_point)
            .field("primary", &self.primary.name())
            .field("dual_mount", &self.dual_mount)
            .field("open_streamers", &self.streamers.len())
            .finish_non_exhaustive()
    }
}

fn thin_ptr_storage(backend: &Arc<dyn ObjectStorage>) -> *const () {
    Arc::as_ptr(backend) as *const ()
}

fn thin_ptr_meta(backend: &Arc<dyn MetadataStore>) -> *const () {
    Arc::as_ptr(backend) as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    #[test]
    fn dual_mount_detected_by_instance_identity() {
        let primary = MemoryBackend::new("mem");
        let mount = Mount::compose("/", primary, MountOptions::new()).unwrap();
        assert!(mount.is_dual_mount());
        assert!(mount.metadata().is_some());
        assert!(mount.distinct_metadata().is_none());
        assert_eq!(mount.unique.len(), 1);
    }

    #[test]
    fn split_mount_keeps_roles_distinct() {
        let primary = MemoryBackend::new("objects");
        let index = MemoryBackend::new("index");
        let mut options = MountOptions::new();
        options.metadata = Some(index as Arc<dyn MetadataStore>);
        let mount = Mount::compose("/", primary, options).unwrap();
        assert!(!mount.is_dual_mount());
        assert!(mount.distinct_metadata().is_some());
        assert_eq!(mount.unique.len(), 2);
    }

    #[test]
    fn auto_detection_can_be_disabled() {
        let primary = MemoryBackend::new("mem");
        let mut options = MountOptions::new();
        options.auto_detect_extensions = false;
        let mount = Mount::compose("/", primary, options).unwrap();
        assert!(mount.metadata().is_none());
    }

    #[test]
    fn mount_point_is_normalized() {
        let mount = Mount::compose(
            "data//sub/",
            MemoryBackend::new("mem"),
            MountOptions::new(),
        )
        .unwrap();
        assert_eq!(mount.mount_point(), "/data/sub");
    }

    #[tokio::test]
    async fn unique_backends_open_once() {
        let primary = MemoryBackend::new("mem");
        let mount = Mount::compose("/", primary.clone(), MountOptions::new()).unwrap();
        let ctx = Context::background();
        mount.open_backends(&ctx).await.unwrap();
        assert_eq!(primary.open_count(), 1);
        mount.teardown(&ctx, false).await.unwrap();
        assert_eq!(primary.close_count(), 1);
    }

    #[test]
    fn namespaced_meta_keys() {
        let mut options = MountOptions::new();
        options.metadata_namespace = Some("tenant-a/".to_string());
        options.metadata = Some(MemoryBackend::new("index") as Arc<dyn MetadataStore>);
        let mount = Mount::compose("/", MemoryBackend::new("mem"), options).unwrap();
        assert_eq!(mount.meta_key("d/f.txt"), "tenant-a/d/f.txt");
        let meta = FileMetadata::new("tenant-a/d/f.txt", crate::metadata::FileMode::regular(0o644));
        assert_eq!(mount.strip_namespace(meta).key, "d/f.txt");
    }

    #[test]
    fn namespace_is_inert_on_dual_mounts() {
        let mut options = MountOptions::new();
        options.metadata_namespace = Some("tenant-a/".to_string());
        let mount = Mount::compose("/", MemoryBackend::new("mem"), options).unwrap();
        assert!(mount.is_dual_mount());
        assert_eq!(mount.meta_key("d/f.txt"), "d/f.txt");
    }
}

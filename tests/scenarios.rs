//! End-to-end scenarios over the full facade: mount composition, file
//! lifecycle, listing order, nesting, and the extension capabilities.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use stratafs::backend::memory::MemoryBackend;
use stratafs::backend::{
    AclBackend, Backend, CacheBackend, CapabilityKind, CapabilitySet, EncryptBackend,
    ExtensionHandle, MetadataStore, ObjectStorage, RubbishBackend,
};
use stratafs::streamer::Streamer;
use stratafs::{AccessMode, Context, ErrorKind, MountOptions, Vfs, VfsResult};

fn ctx() -> Context {
    Context::background()
}

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

async fn rooted() -> Vfs {
    init_tracing();
    let vfs = Vfs::new();
    vfs.mount(&ctx(), "/", MemoryBackend::new("root"), MountOptions::new())
        .await
        .unwrap();
    vfs
}

async fn read_all(handle: &Arc<Streamer>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 16];
    loop {
        let n = handle.read(&ctx(), &mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

const RW: AccessMode = AccessMode::READ.union(AccessMode::WRITE);

#[tokio::test]
async fn s1_file_lifecycle() {
    let vfs = rooted().await;

    let file = vfs
        .open_file(&ctx(), "/test.txt", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap();
    assert_eq!(file.write(&ctx(), b"hello world").await.unwrap(), 11);
    file.close().await.unwrap();

    let file = vfs.open_file(&ctx(), "/test.txt", AccessMode::READ).await.unwrap();
    assert_eq!(read_all(&file).await, b"hello world");
    file.close().await.unwrap();

    vfs.unlink(&ctx(), "/test.txt").await.unwrap();
    let err = vfs.stat(&ctx(), "/test.txt").await.unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::NotExist);
}

#[tokio::test]
async fn s2_directory_listing_order() {
    let vfs = rooted().await;
    vfs.create_directory(&ctx(), "/data").await.unwrap();

    for i in 0..3u8 {
        let path = format!("/data/file{i}.txt");
        let file = vfs
            .open_file(&ctx(), &path, AccessMode::WRITE | AccessMode::CREATE)
            .await
            .unwrap();
        file.write(&ctx(), &[i]).await.unwrap();
        file.close().await.unwrap();
    }

    let entries = vfs.read_directory(&ctx(), "/data").await.unwrap();
    let mut keys: Vec<_> = entries.iter().map(|e| e.key.clone()).collect();
    keys.sort();
    assert_eq!(keys, ["file0.txt", "file1.txt", "file2.txt"]);
    assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn s3_non_empty_rmdir() {
    let vfs = rooted().await;
    vfs.create_directory(&ctx(), "/d").await.unwrap();
    let file = vfs
        .open_file(&ctx(), "/d/f.txt", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap();
    file.write(&ctx(), b"x").await.unwrap();
    file.close().await.unwrap();

    let err = vfs.remove_directory(&ctx(), "/d", false).await.unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::DirectoryNotEmpty);
    assert!(vfs.stat(&ctx(), "/d").await.unwrap().is_dir());
}

#[tokio::test]
async fn s4_append_semantics() {
    let vfs = rooted().await;

    let file = vfs
        .open_file(&ctx(), "/a.txt", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap();
    file.write(&ctx(), b"first ").await.unwrap();
    file.close().await.unwrap();

    let file = vfs
        .open_file(&ctx(), "/a.txt", AccessMode::WRITE | AccessMode::APPEND)
        .await
        .unwrap();
    file.write(&ctx(), b"second").await.unwrap();
    file.close().await.unwrap();

    let file = vfs.open_file(&ctx(), "/a.txt", AccessMode::READ).await.unwrap();
    assert_eq!(read_all(&file).await, b"first second");
    file.close().await.unwrap();
}

#[tokio::test]
async fn s5_truncate_on_open() {
    let vfs = rooted().await;

    let file = vfs
        .open_file(&ctx(), "/t.txt", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap();
    file.write(&ctx(), b"original content").await.unwrap();
    file.close().await.unwrap();

    let file = vfs
        .open_file(&ctx(), "/t.txt", AccessMode::WRITE | AccessMode::TRUNC)
        .await
        .unwrap();
    file.write(&ctx(), b"new").await.unwrap();
    file.close().await.unwrap();

    let file = vfs.open_file(&ctx(), "/t.txt", AccessMode::READ).await.unwrap();
    assert_eq!(read_all(&file).await, b"new");
    file.close().await.unwrap();
}

#[tokio::test]
async fn s6_nested_mounts_route_by_longest_prefix() {
    init_tracing();
    let vfs = Vfs::new();
    let a = MemoryBackend::new("a");
    let b = MemoryBackend::new("b");
    let c = MemoryBackend::new("c");
    vfs.mount(&ctx(), "/", a.clone(), MountOptions::new()).await.unwrap();
    vfs.mount(&ctx(), "/data", b.clone(), MountOptions::new()).await.unwrap();
    vfs.mount(&ctx(), "/data/cache", c.clone(), MountOptions::new())
        .await
        .unwrap();

    for path in ["/data/cache/file.txt", "/data/file.txt", "/other"] {
        let file = vfs
            .open_file(&ctx(), path, AccessMode::WRITE | AccessMode::CREATE)
            .await
            .unwrap();
        file.write(&ctx(), b"!").await.unwrap();
        file.close().await.unwrap();
    }

    // Each write landed in the backend owning the longest matching prefix,
    // under the mount-relative key.
    assert_eq!(c.head(&ctx(), "file.txt").await.unwrap().size, 1);
    assert_eq!(b.head(&ctx(), "file.txt").await.unwrap().size, 1);
    assert_eq!(a.head(&ctx(), "other").await.unwrap().size, 1);
    assert!(a.head(&ctx(), "data/file.txt").await.is_err());
}

#[tokio::test]
async fn create_on_root_yields_a_regular_file() {
    let vfs = rooted().await;
    let file = vfs
        .open_file(&ctx(), "/x", AccessMode::CREATE | AccessMode::WRITE)
        .await
        .unwrap();
    file.close().await.unwrap();
    let meta = vfs.stat(&ctx(), "/x").await.unwrap();
    assert!(meta.mode.is_regular());
    assert_eq!(meta.size, 0);
}

#[tokio::test]
async fn read_create_of_unknown_path_leaves_an_empty_file() {
    let vfs = rooted().await;
    let file = vfs
        .open_file(&ctx(), "/fresh.txt", AccessMode::READ | AccessMode::CREATE)
        .await
        .unwrap();
    file.close().await.unwrap();
    assert_eq!(vfs.stat(&ctx(), "/fresh.txt").await.unwrap().size, 0);
}

#[tokio::test]
async fn stat_size_covers_every_write() {
    let vfs = rooted().await;
    vfs.open_file(&ctx(), "/w.bin", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap()
        .close()
        .await
        .unwrap();

    for (offset, data) in [(0u64, &b"abcd"[..]), (10, b"xyz"), (2, b"q")] {
        vfs.write_file(&ctx(), "/w.bin", offset, data).await.unwrap();
        let size = vfs.stat(&ctx(), "/w.bin").await.unwrap().size;
        assert!(size >= offset + data.len() as u64);
    }
}

#[tokio::test]
async fn gapped_write_zero_extends() {
    let vfs = rooted().await;
    vfs.open_file(&ctx(), "/gap.bin", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap()
        .close()
        .await
        .unwrap();
    vfs.write_file(&ctx(), "/gap.bin", 4, b"data").await.unwrap();

    let content = vfs.read_file(&ctx(), "/gap.bin", 0, 64).await.unwrap();
    assert_eq!(content, b"\0\0\0\0data");
}

#[tokio::test]
async fn reads_past_the_end_are_empty_not_errors() {
    let vfs = rooted().await;
    let file = vfs
        .open_file(&ctx(), "/eof.txt", RW | AccessMode::CREATE)
        .await
        .unwrap();
    file.write(&ctx(), b"abc").await.unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(file.read(&ctx(), &mut buf).await.unwrap(), 0);
    file.seek(&ctx(), SeekFrom::Start(100)).await.unwrap();
    assert_eq!(file.read(&ctx(), &mut buf).await.unwrap(), 0);
    file.close().await.unwrap();

    assert!(vfs.read_file(&ctx(), "/eof.txt", 50, 8).await.unwrap().is_empty());
}

#[tokio::test]
async fn mkdir_rmdir_roundtrip_restores_prior_state() {
    let vfs = rooted().await;
    assert!(!vfs.lookup(&ctx(), "/tmp").await.unwrap());
    vfs.create_directory(&ctx(), "/tmp").await.unwrap();
    assert!(vfs.stat(&ctx(), "/tmp").await.unwrap().is_dir());
    let err = vfs.create_directory(&ctx(), "/tmp").await.unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::Exist);
    vfs.remove_directory(&ctx(), "/tmp", false).await.unwrap();
    assert!(!vfs.lookup(&ctx(), "/tmp").await.unwrap());
}

#[tokio::test]
async fn listing_names_entries_by_basename() {
    let vfs = rooted().await;
    vfs.create_directory(&ctx(), "/nest").await.unwrap();
    vfs.create_directory(&ctx(), "/nest/inner").await.unwrap();
    vfs.open_file(&ctx(), "/nest/inner/leaf.txt", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap()
        .close()
        .await
        .unwrap();

    let entries = vfs.read_directory(&ctx(), "/nest/inner").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, "leaf.txt");
}

#[tokio::test]
async fn close_file_by_path() {
    let vfs = rooted().await;
    let handle = vfs
        .open_file(&ctx(), "/c.txt", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap();
    vfs.close_file(&ctx(), "/c.txt", false).await.unwrap();
    assert_eq!(handle.close().await.unwrap_err(), ErrorKind::Closed);

    let err = vfs.close_file(&ctx(), "/c.txt", false).await.unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::NotExist);
}

#[tokio::test]
async fn cancelled_context_cancels_facade_operations() {
    let vfs = rooted().await;
    let cancelled = Context::background();
    cancelled.cancel();
    let err = vfs.stat(&cancelled, "/whatever").await.unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::Cancelled);
}

#[tokio::test]
async fn shutdown_with_open_handles_forces_them_closed() {
    let vfs = rooted().await;
    let _handle = vfs
        .open_file(&ctx(), "/open.txt", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap();
    vfs.shutdown(&ctx()).await.unwrap();
    assert!(vfs.registry().is_empty());
}

#[tokio::test]
async fn split_metadata_self_heals_behind_the_scenes() {
    init_tracing();
    let vfs = Vfs::new();
    let primary = MemoryBackend::new("objects");
    let index = MemoryBackend::new("index");
    let mut options = MountOptions::new();
    options.metadata = Some(index.clone() as Arc<dyn MetadataStore>);
    vfs.mount(&ctx(), "/", primary.clone(), options).await.unwrap();

    // Objects created behind the index's back appear after a probe.
    primary
        .create(&ctx(), "ghost.txt", stratafs::FileMode::regular(0o644))
        .await
        .unwrap();
    primary.write(&ctx(), "ghost.txt", 0, b"boo").await.unwrap();
    assert!(!index.exists_meta(&ctx(), "ghost.txt").await.unwrap());

    assert_eq!(vfs.stat(&ctx(), "/ghost.txt").await.unwrap().size, 3);
    assert!(index.exists_meta(&ctx(), "ghost.txt").await.unwrap());

    let listed = vfs.read_directory(&ctx(), "/").await.unwrap();
    assert!(listed.iter().any(|e| e.key == "ghost.txt"));
}

#[tokio::test]
async fn namespaces_partition_a_shared_index() {
    init_tracing();
    let vfs = Vfs::new();
    let index = MemoryBackend::new("shared-index");

    for (point, ns) in [("/a", "a/"), ("/b", "b/")] {
        let mut options = MountOptions::new();
        options.metadata = Some(index.clone() as Arc<dyn MetadataStore>);
        options.metadata_namespace = Some(ns.to_string());
        vfs.mount(&ctx(), point, MemoryBackend::new(point), options)
            .await
            .unwrap();
    }

    vfs.open_file(&ctx(), "/a/f.txt", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap()
        .close()
        .await
        .unwrap();

    assert!(index.exists_meta(&ctx(), "a/f.txt").await.unwrap());
    assert!(vfs.lookup(&ctx(), "/a/f.txt").await.unwrap());
    assert!(!vfs.lookup(&ctx(), "/b/f.txt").await.unwrap());
}

// ---------------------------------------------------------------------------
// Extension doubles
// ---------------------------------------------------------------------------

fn caps(kind: CapabilityKind) -> CapabilitySet {
    CapabilitySet::new().with_kind(kind)
}

struct DenyListAcl {
    denied: Vec<String>,
}
#[async_trait]
impl Backend for DenyListAcl {
    fn name(&self) -> &str {
        "denylist-acl"
    }
    async fn open(&self, _ctx: &Context) -> VfsResult<()> {
        Ok(())
    }
    async fn close(&self, _ctx: &Context) -> VfsResult<()> {
        Ok(())
    }
    fn capabilities(&self) -> CapabilitySet {
        caps(CapabilityKind::Acl)
    }
}
#[async_trait]
impl AclBackend for DenyListAcl {
    async fn check(&self, _ctx: &Context, key: &str, _mode: AccessMode) -> VfsResult<()> {
        if self.denied.iter().any(|d| d == key) {
            Err(ErrorKind::Permission.into())
        } else {
            Ok(())
        }
    }
    async fn permissions(&self, _ctx: &Context, _key: &str) -> VfsResult<stratafs::FileMode> {
        Ok(stratafs::FileMode::regular(0o644))
    }
    async fn set_permissions(
        &self,
        _ctx: &Context,
        _key: &str,
        _mode: stratafs::FileMode,
    ) -> VfsResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MapCache {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    hits: AtomicUsize,
}
#[async_trait]
impl Backend for MapCache {
    fn name(&self) -> &str {
        "map-cache"
    }
    async fn open(&self, _ctx: &Context) -> VfsResult<()> {
        Ok(())
    }
    async fn close(&self, _ctx: &Context) -> VfsResult<()> {
        Ok(())
    }
    fn capabilities(&self) -> CapabilitySet {
        caps(CapabilityKind::Cache)
    }
}
#[async_trait]
impl CacheBackend for MapCache {
    async fn fetch(&self, _ctx: &Context, key: &str) -> VfsResult<Option<Vec<u8>>> {
        let hit = self.blobs.lock().unwrap().get(key).cloned();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(hit)
    }
    async fn store(&self, _ctx: &Context, key: &str, data: &[u8]) -> VfsResult<()> {
        self.blobs.lock().unwrap().insert(key.to_string(), data.to_vec());
        Ok(())
    }
    async fn evict(&self, _ctx: &Context, key: &str) -> VfsResult<()> {
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}

struct XorVault;
impl XorVault {
    fn transform(data: &[u8]) -> Vec<u8> {
        data.iter().map(|b| b ^ 0xAA).collect()
    }
}
#[async_trait]
impl Backend for XorVault {
    fn name(&self) -> &str {
        "xor-vault"
    }
    async fn open(&self, _ctx: &Context) -> VfsResult<()> {
        Ok(())
    }
    async fn close(&self, _ctx: &Context) -> VfsResult<()> {
        Ok(())
    }
    fn capabilities(&self) -> CapabilitySet {
        caps(CapabilityKind::Encrypt)
    }
}
#[async_trait]
impl EncryptBackend for XorVault {
    async fn seal(
        &self,
        _ctx: &Context,
        _key: &str,
        _offset: u64,
        data: &[u8],
    ) -> VfsResult<Vec<u8>> {
        Ok(Self::transform(data))
    }
    async fn unseal(
        &self,
        _ctx: &Context,
        _key: &str,
        _offset: u64,
        data: &[u8],
    ) -> VfsResult<Vec<u8>> {
        Ok(Self::transform(data))
    }
}

struct TrashBin {
    primary: Arc<MemoryBackend>,
    trashed: Mutex<Vec<String>>,
}
#[async_trait]
impl Backend for TrashBin {
    fn name(&self) -> &str {
        "trash-bin"
    }
    async fn open(&self, _ctx: &Context) -> VfsResult<()> {
        Ok(())
    }
    async fn close(&self, _ctx: &Context) -> VfsResult<()> {
        Ok(())
    }
    fn capabilities(&self) -> CapabilitySet {
        caps(CapabilityKind::Rubbish)
    }
}
#[async_trait]
impl RubbishBackend for TrashBin {
    async fn discard(&self, ctx: &Context, key: &str) -> VfsResult<()> {
        self.primary.delete(ctx, key, false).await?;
        self.trashed.lock().unwrap().push(key.to_string());
        Ok(())
    }
    async fn restore(&self, _ctx: &Context, _key: &str) -> VfsResult<()> {
        Err(ErrorKind::NotImplemented.into())
    }
    async fn purge(&self, _ctx: &Context) -> VfsResult<()> {
        self.trashed.lock().unwrap().clear();
        Ok(())
    }
}

#[tokio::test]
async fn acl_extension_gates_opens() {
    init_tracing();
    let vfs = Vfs::new();
    let mut options = MountOptions::new();
    options.extensions.insert(
        CapabilityKind::Acl,
        ExtensionHandle::Acl(Arc::new(DenyListAcl {
            denied: vec!["secret.txt".to_string()],
        })),
    );
    vfs.mount(&ctx(), "/", MemoryBackend::new("mem"), options).await.unwrap();

    let err = vfs
        .open_file(&ctx(), "/secret.txt", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::Permission);
    // A denied open never creates the entry.
    assert!(!vfs.lookup(&ctx(), "/secret.txt").await.unwrap());

    vfs.open_file(&ctx(), "/public.txt", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap()
        .close()
        .await
        .unwrap();
}

#[tokio::test]
async fn cache_extension_serves_repeat_reads() {
    init_tracing();
    let vfs = Vfs::new();
    let primary = MemoryBackend::new("mem");
    let cache = Arc::new(MapCache::default());
    let mut options = MountOptions::new();
    options
        .extensions
        .insert(CapabilityKind::Cache, ExtensionHandle::Cache(cache.clone()));
    vfs.mount(&ctx(), "/", primary.clone(), options).await.unwrap();

    vfs.open_file(&ctx(), "/hot.txt", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap()
        .close()
        .await
        .unwrap();
    vfs.write_file(&ctx(), "/hot.txt", 0, b"cached payload").await.unwrap();

    // The whole-object write populated the cache; a direct storage mutation
    // is invisible until something evicts.
    primary.write(&ctx(), "hot.txt", 0, b"STALE!").await.unwrap();
    assert_eq!(
        vfs.read_file(&ctx(), "/hot.txt", 0, 64).await.unwrap(),
        b"cached payload"
    );
    assert!(cache.hits.load(Ordering::Relaxed) >= 1);

    // Writing through the mount evicts and repopulates.
    vfs.write_file(&ctx(), "/hot.txt", 0, b"fresh payload!").await.unwrap();
    assert_eq!(
        vfs.read_file(&ctx(), "/hot.txt", 0, 64).await.unwrap(),
        b"fresh payload!"
    );
}

#[tokio::test]
async fn encrypt_extension_transforms_data_at_rest() {
    init_tracing();
    let vfs = Vfs::new();
    let primary = MemoryBackend::new("mem");
    let mut options = MountOptions::new();
    options.extensions.insert(
        CapabilityKind::Encrypt,
        ExtensionHandle::Encrypt(Arc::new(XorVault)),
    );
    vfs.mount(&ctx(), "/", primary.clone(), options).await.unwrap();

    vfs.open_file(&ctx(), "/vault.bin", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap()
        .close()
        .await
        .unwrap();
    vfs.write_file(&ctx(), "/vault.bin", 0, b"plaintext").await.unwrap();

    // At rest the bytes are transformed.
    let mut raw = vec![0u8; 9];
    primary.read(&ctx(), "vault.bin", 0, &mut raw).await.unwrap();
    assert_eq!(raw, XorVault::transform(b"plaintext"));

    // Both read paths agree on the plaintext.
    assert_eq!(
        vfs.read_file(&ctx(), "/vault.bin", 0, 64).await.unwrap(),
        b"plaintext"
    );
    let handle = vfs.open_file(&ctx(), "/vault.bin", AccessMode::READ).await.unwrap();
    assert_eq!(read_all(&handle).await, b"plaintext");
    handle.close().await.unwrap();

    // Handle writes seal the same way.
    let handle = vfs.open_file(&ctx(), "/vault.bin", RW).await.unwrap();
    handle.write(&ctx(), b"handle up").await.unwrap();
    handle.close().await.unwrap();
    let mut raw = vec![0u8; 9];
    primary.read(&ctx(), "vault.bin", 0, &mut raw).await.unwrap();
    assert_eq!(raw, XorVault::transform(b"handle up"));
}

#[tokio::test]
async fn rubbish_extension_soft_deletes_on_unlink() {
    init_tracing();
    let vfs = Vfs::new();
    let primary = MemoryBackend::new("mem");
    let trash = Arc::new(TrashBin {
        primary: primary.clone(),
        trashed: Mutex::new(Vec::new()),
    });
    let mut options = MountOptions::new();
    options
        .extensions
        .insert(CapabilityKind::Rubbish, ExtensionHandle::Rubbish(trash.clone()));
    vfs.mount(&ctx(), "/", primary, options).await.unwrap();

    vfs.open_file(&ctx(), "/doomed.txt", AccessMode::WRITE | AccessMode::CREATE)
        .await
        .unwrap()
        .close()
        .await
        .unwrap();
    vfs.unlink(&ctx(), "/doomed.txt").await.unwrap();

    assert_eq!(*trash.trashed.lock().unwrap(), ["doomed.txt"]);
    assert!(!vfs.lookup(&ctx(), "/doomed.txt").await.unwrap());
}

#[tokio::test]
async fn extension_slot_mismatch_is_a_composition_error() {
    init_tracing();
    let vfs = Vfs::new();
    let mut options = MountOptions::new();
    // An ACL handle stuffed into the cache slot.
    options.extensions.insert(
        CapabilityKind::Cache,
        ExtensionHandle::Acl(Arc::new(DenyListAcl { denied: vec![] })),
    );
    let err = vfs
        .mount(&ctx(), "/", MemoryBackend::new("mem"), options)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::BackendIncompatible { name } if name == "denylist-acl"));
}

//! The VFS facade: one Unix-like namespace routed over every mount.

use crate::backend::ObjectStorage;
use crate::context::Context;
use crate::error::{ErrorKind, VfsResult};
use crate::metadata::{AccessMode, FileMetadata};
use crate::mount::registry::MountRegistry;
use crate::mount::{Mount, MountOptions};
use crate::path;
use crate::streamer::Streamer;
use std::sync::Arc;
use tracing::{debug, warn};

/// The top-level entry point. Every public method normalizes its path,
/// resolves the owning mount, and delegates to the mount's coordinator;
/// failures carry the operation and path they happened under.
pub struct Vfs {
    registry: MountRegistry,
}
impl Vfs {
    pub fn new() -> Self {
        Self {
            registry: MountRegistry::new(),
        }
    }

    pub fn registry(&self) -> &MountRegistry {
        &self.registry
    }

    /// Composes and publishes a mount at `mount_point`.
    pub async fn mount(
        &self,
        ctx: &Context,
        mount_point: &str,
        primary: Arc<dyn ObjectStorage>,
        options: MountOptions,
    ) -> VfsResult<()> {
        let mnt = Mount::compose(mount_point, primary, options)
            .map_err(|err| err.with_op("mount", mount_point))?;
        self.registry
            .mount(ctx, mnt)
            .await
            .map_err(|err| err.with_op("mount", mount_point))
    }

    pub async fn unmount(&self, ctx: &Context, mount_point: &str, force: bool) -> VfsResult<()> {
        self.registry
            .unmount(ctx, mount_point, force)
            .await
            .map_err(|err| err.with_op("unmount", mount_point))
    }

    pub async fn open_file(
        &self,
        ctx: &Context,
        file_path: &str,
        flags: AccessMode,
    ) -> VfsResult<Arc<Streamer>> {
        let (mnt, key, abs) = self.route(file_path).map_err(op("open_file", file_path))?;
        mnt.open(ctx, &key, flags).await.map_err(op("open_file", abs))
    }

    /// Closes the open handle at `file_path`. Without `force` a handle that
    /// is mid-operation stays open.
    pub async fn close_file(&self, ctx: &Context, file_path: &str, force: bool) -> VfsResult<()> {
        ctx.check().map_err(op("close_file", file_path))?;
        let (mnt, key, abs) = self.route(file_path).map_err(op("close_file", file_path))?;
        mnt.close_streamer(&key, force)
            .await
            .map_err(op("close_file", abs))
    }

    pub async fn read_file(
        &self,
        ctx: &Context,
        file_path: &str,
        offset: u64,
        size: usize,
    ) -> VfsResult<Vec<u8>> {
        let (mnt, key, abs) = self.route(file_path).map_err(op("read_file", file_path))?;
        mnt.read(ctx, &key, offset, size)
            .await
            .map_err(op("read_file", abs))
    }

    pub async fn write_file(
        &self,
        ctx: &Context,
        file_path: &str,
        offset: u64,
        data: &[u8],
    ) -> VfsResult<usize> {
        let (mnt, key, abs) = self.route(file_path).map_err(op("write_file", file_path))?;
        mnt.write(ctx, &key, offset, data)
            .await
            .map_err(op("write_file", abs))
    }

    pub async fn stat(&self, ctx: &Context, file_path: &str) -> VfsResult<FileMetadata> {
        let (mnt, key, abs) = self.route(file_path).map_err(op("stat", file_path))?;
        mnt.stat(ctx, &key).await.map_err(op("stat", abs))
    }

    /// Existence check; only errors unrelated to existence surface.
    pub async fn lookup(&self, ctx: &Context, file_path: &str) -> VfsResult<bool> {
        let (mnt, key, abs) = self.route(file_path).map_err(op("lookup", file_path))?;
        mnt.lookup(ctx, &key).await.map_err(op("lookup", abs))
    }

    pub async fn read_directory(
        &self,
        ctx: &Context,
        dir_path: &str,
    ) -> VfsResult<Vec<FileMetadata>> {
        let (mnt, key, abs) = self
            .route(dir_path)
            .map_err(op("read_directory", dir_path))?;
        mnt.read_directory(ctx, &key)
            .await
            .map_err(op("read_directory", abs))
    }

    pub async fn create_directory(&self, ctx: &Context, dir_path: &str) -> VfsResult<()> {
        let (mnt, key, abs) = self
            .route(dir_path)
            .map_err(op("create_directory", dir_path))?;
        mnt.create_directory(ctx, &key)
            .await
            .map_err(op("create_directory", abs))
    }

    pub async fn remove_directory(
        &self,
        ctx: &Context,
        dir_path: &str,
        force: bool,
    ) -> VfsResult<()> {
        let (mnt, key, abs) = self
            .route(dir_path)
            .map_err(op("remove_directory", dir_path))?;
        mnt.remove_directory(ctx, &key, force)
            .await
            .map_err(op("remove_directory", abs))
    }

    pub async fn unlink(&self, ctx: &Context, file_path: &str) -> VfsResult<()> {
        let (mnt, key, abs) = self.route(file_path).map_err(op("unlink", file_path))?;
        mnt.unlink(ctx, &key).await.map_err(op("unlink", abs))
    }

    /// Cross- and same-mount renames are out of scope for the core.
    pub async fn rename(&self, ctx: &Context, from: &str, to: &str) -> VfsResult<()> {
        let (mnt, from_key, abs) = self.route(from).map_err(op("rename", from))?;
        let (_, to_key, _) = self.route(to).map_err(op("rename", to))?;
        mnt.rename(ctx, &from_key, &to_key)
            .await
            .map_err(op("rename", abs))
    }

    /// Unmounts everything, deepest mount points first so children never
    /// outlive their parents. Failures are aggregated; the namespace ends up
    /// empty regardless.
    pub async fn shutdown(&self, ctx: &Context) -> VfsResult<()> {
        // A strict child is always the longer path, so length ordering
        // takes children down before their parents.
        let mut points = self.registry.mount_points();
        points.sort_by_key(|point| std::cmp::Reverse(point.len()));

        let mut failures: Vec<String> = Vec::new();
        for point in points {
            if let Err(err) = self.registry.unmount(ctx, &point, true).await {
                warn!(mount_point = %point, error = %err, "unmount failed during shutdown");
                failures.push(format!("{point}: {}", err.kind()));
            }
        }
        debug!("vfs shut down");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ErrorKind::UnmountFailed(failures.join("; ")).into())
        }
    }

    /// Normalizes a user path and resolves its mount and relative key.
    fn route(&self, user_path: &str) -> VfsResult<(Arc<Mount>, String, String)> {
        let abs = path::normalize(&path::to_absolute(user_path)?);
        let mnt = self.registry.resolve(&abs)?;
        let key = path::to_relative(&abs, mnt.mount_point());
        Ok((mnt, key, abs))
    }
}
impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

/// Context-attaching adapter for error paths.
fn op(
    name: &'static str,
    path: impl Into<String>,
) -> impl FnOnce(crate::error::VfsError) -> crate::error::VfsError {
    let path = path.into();
    move |err| err.with_op(name, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    fn ctx() -> Context {
        Context::background()
    }

    async fn rooted() -> Vfs {
        let vfs = Vfs::new();
        vfs.mount(&ctx(), "/", MemoryBackend::new("root"), MountOptions::new())
            .await
            .unwrap();
        vfs
    }

    #[tokio::test]
    async fn paths_are_normalized_before_routing() {
        let vfs = rooted().await;
        vfs.create_directory(&ctx(), "/d").await.unwrap();
        let handle = vfs
            .open_file(&ctx(), "d//.././d/f.txt", AccessMode::WRITE | AccessMode::CREATE)
            .await
            .unwrap();
        handle.close().await.unwrap();
        assert!(vfs.lookup(&ctx(), "/d/f.txt").await.unwrap());
    }

    #[tokio::test]
    async fn errors_carry_operation_and_path() {
        let vfs = rooted().await;
        let err = vfs.stat(&ctx(), "/missing.txt").await.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotExist);
        assert_eq!(err.op(), Some("stat"));
        assert_eq!(err.path(), Some("/missing.txt"));
        assert_eq!(err.to_string(), "stat /missing.txt: no such file or directory");
    }

    #[tokio::test]
    async fn rename_reports_not_implemented() {
        let vfs = rooted().await;
        let err = vfs.rename(&ctx(), "/a", "/b").await.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotImplemented);
    }

    #[tokio::test]
    async fn shutdown_unmounts_deepest_first() {
        let vfs = rooted().await;
        vfs.create_directory(&ctx(), "/data").await.unwrap();
        vfs.mount(&ctx(), "/data", MemoryBackend::new("data"), MountOptions::new())
            .await
            .unwrap();
        vfs.mount(
            &ctx(),
            "/data/cache",
            MemoryBackend::new("cache"),
            MountOptions::new(),
        )
        .await
        .unwrap();

        vfs.shutdown(&ctx()).await.unwrap();
        assert!(vfs.registry().is_empty());
    }

    #[tokio::test]
    async fn lookup_is_false_not_an_error() {
        let vfs = rooted().await;
        assert!(!vfs.lookup(&ctx(), "/nope").await.unwrap());
    }
}

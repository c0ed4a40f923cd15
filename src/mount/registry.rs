//! The process-wide mount table.

use crate::context::Context;
use crate::error::{ErrorKind, VfsResult};
use crate::mount::Mount;
use crate::path;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Ordered set of mount points with longest-prefix resolution.
///
/// Lookups take the read lock; mounting and unmounting take the write lock.
/// Backend `open`/`close` never run under either lock: a mount's backends
/// are opened before the mount is published and closed after it is removed,
/// so a concurrent `resolve` never observes a half-open mount.
pub struct MountRegistry {
    mounts: RwLock<BTreeMap<String, Arc<Mount>>>,
}
impl MountRegistry {
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Opens the mount's backends and publishes it at its mount point.
    pub async fn mount(&self, ctx: &Context, mnt: Arc<Mount>) -> VfsResult<()> {
        ctx.check()?;
        let point = mnt.mount_point().to_string();
        self.admission_check(&point)?;

        mnt.open_backends(ctx).await?;

        {
            let mut mounts = self.mounts.write().unwrap();
            // Re-validate: another task may have raced us while the
            // backends were opening.
            if let Err(err) = Self::admit(&mounts, &point) {
                drop(mounts);
                let _ = mnt.teardown(ctx, true).await;
                return Err(err);
            }
            mounts.insert(point.clone(), mnt);
        }
        debug!(mount_point = %point, "mounted");
        Ok(())
    }

    /// Removes the mount at `path` and tears it down.
    ///
    /// A mounted strict child, or a busy streamer without `force`, keeps the
    /// mount in place. Once removal happens the mount stays removed even if
    /// backend closes fail; those failures are reported as `UnmountFailed`.
    pub async fn unmount(&self, ctx: &Context, path: &str, force: bool) -> VfsResult<()> {
        ctx.check()?;
        let point = path::normalize(&path::to_absolute(path)?);
        let mnt = {
            let mut mounts = self.mounts.write().unwrap();
            let Some(mnt) = mounts.get(&point) else {
                return Err(ErrorKind::NotMounted.into());
            };
            if mounts
                .keys()
                .any(|candidate| path::is_strict_child(candidate, &point))
            {
                return Err(ErrorKind::MountBusy.into());
            }
            if !force && mnt.has_busy_streamer() {
                return Err(ErrorKind::MountBusy.into());
            }
            mounts.remove(&point).unwrap()
        };
        let result = mnt.teardown(ctx, force).await;
        debug!(mount_point = %point, forced = force, "unmounted");
        result
    }

    /// Resolves an absolute path to the mount with the longest matching
    /// mount point. A mount point matches when it is the root, equals the
    /// path, or is followed by a separator inside the path.
    pub fn resolve(&self, path: &str) -> VfsResult<Arc<Mount>> {
        let mounts = self.mounts.read().unwrap();
        let mut best: Option<&Arc<Mount>> = None;
        let mut best_len = 0;
        for (point, mnt) in mounts.iter() {
            let matches =
                point == "/" || path == point || path::is_strict_child(path, point);
            if matches && (best.is_none() || point.len() > best_len) {
                best = Some(mnt);
                best_len = point.len();
            }
        }
        best.cloned().ok_or_else(|| ErrorKind::NotMounted.into())
    }

    /// All mount points, shallowest first.
    pub fn mount_points(&self) -> Vec<String> {
        self.mounts.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.mounts.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.read().unwrap().is_empty()
    }

    /// Fast admission pre-check before backend opening starts.
    fn admission_check(&self, point: &str) -> VfsResult<()> {
        let mounts = self.mounts.read().unwrap();
        Self::admit(&mounts, point)
    }

    fn admit(mounts: &BTreeMap<String, Arc<Mount>>, point: &str) -> VfsResult<()> {
        if mounts.contains_key(point) {
            return Err(ErrorKind::AlreadyMounted.into());
        }
        let parent = mounts
            .iter()
            .filter(|(candidate, _)| path::is_strict_child(point, candidate))
            .max_by_key(|(candidate, _)| candidate.len());
        if let Some((_, parent_mount)) = parent {
            if !parent_mount.options().allow_nesting {
                return Err(ErrorKind::NestingDenied.into());
            }
        }
        Ok(())
    }
}
impl Default for MountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! The per-mount I/O coordinator.
//!
//! Every operation here works on a mount-relative key, enforces read-only
//! policy, and keeps the object store and the metadata index coherent:
//! storage is written first, metadata second, and a metadata entry lost
//! mid-flight is re-materialized by the probe on the next access.

use crate::context::Context;
use crate::error::{ErrorKind, VfsResult};
use crate::metadata::{AccessMode, FileMetadata, FileMode, MetadataUpdate};
use crate::mount::Mount;
use crate::query::MetadataQuery;
use crate::streamer::Streamer;
use std::sync::Arc;
use tracing::warn;

impl Mount {
    /// The probe-and-sync pattern: prefer the metadata index, fall back to a
    /// head on storage, and lazily materialize the missing index entry when
    /// the index is a distinct instance.
    pub(crate) async fn probe(&self, ctx: &Context, key: &str) -> VfsResult<FileMetadata> {
        ctx.check()?;
        if let Some(store) = self.metadata() {
            match store.read_meta(ctx, &self.meta_key(key)).await {
                Ok(found) => return Ok(self.strip_namespace(found)),
                Err(err) if err.is(&ErrorKind::NotExist) => {}
                Err(err) => return Err(err),
            }
        }
        let stat = self.primary().head(ctx, key).await?;
        let meta = stat.into_metadata();
        if let Some(store) = self.distinct_metadata() {
            let mut record = meta.clone();
            record.key = self.meta_key(key);
            match store.create_meta(ctx, &record).await {
                Ok(()) => {}
                Err(err) if err.is(&ErrorKind::Exist) => {}
                Err(err) => {
                    warn!(key, error = %err, "failed to materialize metadata from storage");
                }
            }
        }
        Ok(meta)
    }

    /// Opens `key`, honouring the full flag set, and returns the handle.
    /// Opens that share a key share one handle.
    pub async fn open(
        self: Arc<Self>,
        ctx: &Context,
        key: &str,
        flags: AccessMode,
    ) -> VfsResult<Arc<Streamer>> {
        if self.is_read_only() && flags.wants_mutation() {
            return Err(ErrorKind::ReadOnly.into());
        }
        // The gate runs before the probe so a denied open cannot leave a
        // freshly created entry behind.
        if let Some(acl) = self.acl() {
            acl.check(ctx, key, flags).await?;
        }
        let meta = match self.probe(ctx, key).await {
            Ok(found) => {
                if flags.contains(AccessMode::CREATE | AccessMode::EXCL) {
                    return Err(ErrorKind::Exist.into());
                }
                found
            }
            Err(err) if err.is(&ErrorKind::NotExist) && flags.contains(AccessMode::CREATE) => {
                self.create_entry(ctx, key, FileMode::regular(0o777)).await?
            }
            Err(err) => return Err(err),
        };
        if meta.is_dir() {
            return Err(ErrorKind::IsDirectory.into());
        }
        let offset = if flags.contains(AccessMode::APPEND) {
            meta.size
        } else {
            0
        };
        if flags.contains(AccessMode::TRUNC) && flags.is_writable() && meta.size > 0 {
            self.truncate_entry(ctx, key, 0, meta.size).await?;
        }
        if let Some(existing) = self.streamer_for(key) {
            return Ok(existing);
        }
        let streamer = Streamer::new(&self, key, flags, offset);
        self.adopt_streamer(key, streamer.clone());
        Ok(streamer)
    }

    /// Closes the open handle for `key`. Without `force`, a handle that is
    /// mid-operation is left alone.
    pub(crate) async fn close_streamer(&self, key: &str, force: bool) -> VfsResult<()> {
        let Some(streamer) = self.streamer_for(key) else {
            return Err(ErrorKind::NotExist.into());
        };
        if !force && streamer.is_busy() {
            return Err(ErrorKind::Busy.into());
        }
        streamer.close().await
    }

    pub(crate) async fn stat(&self, ctx: &Context, key: &str) -> VfsResult<FileMetadata> {
        self.probe(ctx, key).await
    }

    pub(crate) async fn lookup(&self, ctx: &Context, key: &str) -> VfsResult<bool> {
        match self.probe(ctx, key).await {
            Ok(_) => Ok(true),
            Err(err) if err.is(&ErrorKind::NotExist) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Reads up to `size` bytes at `offset`. The window is clamped to the
    /// current file size; a read at or past the end returns an empty buffer.
    pub(crate) async fn read(
        &self,
        ctx: &Context,
        key: &str,
        offset: u64,
        size: usize,
    ) -> VfsResult<Vec<u8>> {
        let meta = self.probe(ctx, key).await?;
        if meta.is_dir() {
            return Err(ErrorKind::IsDirectory.into());
        }
        let avail = meta.size.saturating_sub(offset).min(size as u64) as usize;
        if avail == 0 {
            return Ok(Vec::new());
        }

        if self.options().cache_reads {
            if let Some(cache) = self.cache() {
                if let Some(blob) = cache.fetch(ctx, key).await? {
                    let start = (offset as usize).min(blob.len());
                    let end = (start + avail).min(blob.len());
                    return Ok(blob[start..end].to_vec());
                }
            }
        }

        let mut buf = vec![0u8; avail];
        let outcome = self.primary().read(ctx, key, offset, &mut buf).await?;
        buf.truncate(outcome.bytes);
        if let Some(enc) = self.encrypt() {
            buf = enc.unseal(ctx, key, offset, &buf).await?;
        }
        if self.options().cache_reads && offset == 0 && buf.len() as u64 == meta.size {
            if let Some(cache) = self.cache() {
                if let Err(err) = cache.store(ctx, key, &buf).await {
                    warn!(key, error = %err, "cache population failed");
                }
            }
        }
        Ok(buf)
    }

    /// Writes `data` at `offset`, validating the resulting size against the
    /// backend's accepted object-size window, then refreshes the index.
    pub(crate) async fn write(
        &self,
        ctx: &Context,
        key: &str,
        offset: u64,
        data: &[u8],
    ) -> VfsResult<usize> {
        if self.is_read_only() {
            return Err(ErrorKind::ReadOnly.into());
        }
        let meta = self.probe(ctx, key).await?;
        if meta.is_dir() {
            return Err(ErrorKind::IsDirectory.into());
        }

        let end = offset + data.len() as u64;
        let new_size = meta.size.max(end);
        let caps = self.primary().capabilities();
        if let Some(min) = caps.min_object_size {
            if new_size < min {
                return Err(ErrorKind::ObjectTooSmall {
                    size: new_size,
                    min,
                }
                .into());
            }
        }
        if let Some(max) = caps.max_object_size {
            if new_size > max {
                return Err(ErrorKind::ObjectTooLarge {
                    size: new_size,
                    max,
                }
                .into());
            }
        }

        let sealed;
        let payload = match self.encrypt() {
            Some(enc) => {
                sealed = enc.seal(ctx, key, offset, data).await?;
                sealed.as_slice()
            }
            None => data,
        };
        let n = self.primary().write(ctx, key, offset, payload).await?;

        if let Some(cache) = self.cache() {
            if let Err(err) = cache.evict(ctx, key).await {
                warn!(key, error = %err, "cache eviction failed");
            }
            if self.options().cache_writes && offset == 0 && n as u64 == new_size {
                if let Err(err) = cache.store(ctx, key, &data[..n]).await {
                    warn!(key, error = %err, "cache population failed");
                }
            }
        }

        if let Some(store) = self.distinct_metadata() {
            let target = meta.size.max(offset + n as u64);
            if let Err(err) = store
                .update_meta(ctx, &self.meta_key(key), &MetadataUpdate::size(target))
                .await
            {
                // The index lost the write; callers must learn about it even
                // though the bytes are already down.
                warn!(key, error = %err, "metadata size update failed after write");
                return Err(err);
            }
        }
        Ok(n)
    }

    /// Lists the direct children of a directory, preferring the metadata
    /// index over a storage listing.
    pub(crate) async fn read_directory(
        &self,
        ctx: &Context,
        key: &str,
    ) -> VfsResult<Vec<FileMetadata>> {
        let meta = self.probe(ctx, key).await?;
        if !meta.is_dir() {
            return Err(ErrorKind::NotDirectory.into());
        }
        let mut entries = if let Some(store) = self.metadata() {
            let prefix = if key.is_empty() {
                self.meta_key("")
            } else {
                format!("{}/", self.meta_key(key))
            };
            let result = store
                .query_meta(ctx, &MetadataQuery::children_of(prefix))
                .await?;
            result
                .entries
                .into_iter()
                .map(|entry| self.strip_namespace(entry))
                .collect()
        } else {
            let stats = self.primary().list(ctx, key).await?;
            stats
                .into_iter()
                .map(|stat| stat.into_metadata())
                .collect::<Vec<_>>()
        };
        // Listings name entries by their final component, the way callers
        // render them.
        for entry in &mut entries {
            entry.key = crate::path::key_basename(&entry.key).to_string();
        }
        Ok(entries)
    }

    pub(crate) async fn create_directory(&self, ctx: &Context, key: &str) -> VfsResult<()> {
        if self.is_read_only() {
            return Err(ErrorKind::ReadOnly.into());
        }
        ctx.check()?;
        if key.is_empty() {
            return Err(ErrorKind::Exist.into());
        }
        if let Some(store) = self.metadata() {
            if store.exists_meta(ctx, &self.meta_key(key)).await? {
                return Err(ErrorKind::Exist.into());
            }
        }
        match self.create_entry(ctx, key, FileMode::dir(0o777)).await {
            Ok(_) => Ok(()),
            Err(err) if err.is(&ErrorKind::Exist) => {
                // Lost a creation race; settled as long as the index agrees.
                if let Some(store) = self.metadata() {
                    if store.exists_meta(ctx, &self.meta_key(key)).await? {
                        return Ok(());
                    }
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub(crate) async fn remove_directory(
        &self,
        ctx: &Context,
        key: &str,
        force: bool,
    ) -> VfsResult<()> {
        if self.is_read_only() {
            return Err(ErrorKind::ReadOnly.into());
        }
        if key.is_empty() {
            return Err(ErrorKind::Invalid.into());
        }
        let meta = self.probe(ctx, key).await?;
        if !meta.is_dir() {
            return Err(ErrorKind::NotDirectory.into());
        }

        if !force {
            let empty = if let Some(store) = self.metadata() {
                let query = MetadataQuery::children_of(format!("{}/", self.meta_key(key)))
                    .with_limit(1);
                store.query_meta(ctx, &query).await?.total_count == 0
            } else {
                self.primary().list(ctx, key).await?.is_empty()
            };
            if !empty {
                return Err(ErrorKind::DirectoryNotEmpty.into());
            }
        }

        // Storage requires the force flag to take a directory down at all.
        self.primary().delete(ctx, key, true).await?;

        if let Some(store) = self.distinct_metadata() {
            let mut failure: Option<crate::error::VfsError> = None;
            match store.delete_meta(ctx, &self.meta_key(key)).await {
                Ok(()) => {}
                Err(err) if err.is(&ErrorKind::NotExist) => {}
                Err(err) => failure = Some(err),
            }
            let subtree = MetadataQuery::subtree_of(format!("{}/", self.meta_key(key)));
            match store.query_meta(ctx, &subtree).await {
                Ok(result) => {
                    for entry in result.entries {
                        match store.delete_meta(ctx, &entry.key).await {
                            Ok(()) => {}
                            Err(err) if err.is(&ErrorKind::NotExist) => {}
                            Err(err) => {
                                warn!(key = %entry.key, error = %err, "metadata cascade delete failed");
                                failure.get_or_insert(err);
                            }
                        }
                    }
                }
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
            if let Some(err) = failure {
                return Err(err);
            }
        }
        Ok(())
    }

    pub(crate) async fn unlink(&self, ctx: &Context, key: &str) -> VfsResult<()> {
        if self.is_read_only() {
            return Err(ErrorKind::ReadOnly.into());
        }
        let meta = self.probe(ctx, key).await?;
        if meta.is_dir() {
            return Err(ErrorKind::IsDirectory.into());
        }

        match self.rubbish() {
            Some(rubbish) => rubbish.discard(ctx, key).await?,
            None => self.primary().delete(ctx, key, false).await?,
        }

        if let Some(store) = self.distinct_metadata() {
            match store.delete_meta(ctx, &self.meta_key(key)).await {
                Ok(()) => {}
                Err(err) if err.is(&ErrorKind::NotExist) => {}
                Err(err) => {
                    warn!(key, error = %err, "metadata delete failed after unlink");
                    return Err(err);
                }
            }
        }
        if let Some(cache) = self.cache() {
            if let Err(err) = cache.evict(ctx, key).await {
                warn!(key, error = %err, "cache eviction failed");
            }
        }
        Ok(())
    }

    pub(crate) async fn truncate(&self, ctx: &Context, key: &str, size: u64) -> VfsResult<()> {
        if self.is_read_only() {
            return Err(ErrorKind::ReadOnly.into());
        }
        let meta = self.probe(ctx, key).await?;
        if meta.is_dir() {
            return Err(ErrorKind::IsDirectory.into());
        }
        if size == meta.size {
            return Ok(());
        }
        self.truncate_entry(ctx, key, size, meta.size).await
    }

    /// Rename stays unimplemented in the core; same-mount copy+delete can be
    /// layered above without an atomicity promise.
    pub(crate) async fn rename(&self, _ctx: &Context, _from: &str, _to: &str) -> VfsResult<()> {
        Err(ErrorKind::NotImplemented.into())
    }

    /// Creates a storage entry and materializes its index record.
    async fn create_entry(
        &self,
        ctx: &Context,
        key: &str,
        mode: FileMode,
    ) -> VfsResult<FileMetadata> {
        let stat = self.primary().create(ctx, key, mode).await?;
        let meta = stat.into_metadata();
        if let Some(store) = self.distinct_metadata() {
            let mut record = meta.clone();
            record.key = self.meta_key(key);
            match store.create_meta(ctx, &record).await {
                Ok(()) => {}
                Err(err) if err.is(&ErrorKind::Exist) => {}
                Err(err) => {
                    warn!(key, error = %err, "metadata create failed after storage create");
                    return Err(err);
                }
            }
        }
        Ok(meta)
    }

    /// Truncates storage and keeps the index size in step.
    async fn truncate_entry(
        &self,
        ctx: &Context,
        key: &str,
        size: u64,
        old_size: u64,
    ) -> VfsResult<()> {
        self.primary().truncate(ctx, key, size).await?;
        if size != old_size {
            if let Some(store) = self.distinct_metadata() {
                if let Err(err) = store
                    .update_meta(ctx, &self.meta_key(key), &MetadataUpdate::size(size))
                    .await
                {
                    warn!(key, error = %err, "metadata size update failed after truncate");
                    return Err(err);
                }
            }
        }
        if let Some(cache) = self.cache() {
            if let Err(err) = cache.evict(ctx, key).await {
                warn!(key, error = %err, "cache eviction failed");
            }
        }
        Ok(())
    }
}

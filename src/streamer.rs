//! Per-open file handles.

use crate::backend::{EncryptBackend, MetadataStore, ObjectStorage};
use crate::context::Context;
use crate::error::{ErrorKind, VfsResult};
use crate::metadata::{AccessMode, MetadataUpdate};
use crate::mount::Mount;
use std::fmt::{self, Debug};
use std::io::SeekFrom;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::warn;

/// A per-open file handle bound to one mount-relative key.
///
/// The handle owns its position and flags; opens that share a key share the
/// one handle. The mount is reached through a weak back-reference used only
/// for deregistration, so a mount torn down under an outstanding handle is
/// never kept alive by it.
pub struct Streamer {
    mount: Weak<Mount>,
    key: String,
    meta_key: String,
    flags: AccessMode,
    storage: Arc<dyn ObjectStorage>,
    /// Distinct-instance metadata only; dual mounts keep their own index.
    metadata: Option<Arc<dyn MetadataStore>>,
    /// Shares the mount's transparent transform so handle I/O and path I/O
    /// agree on what is stored.
    encrypt: Option<Arc<dyn EncryptBackend>>,
    state: Mutex<StreamerState>,
}

#[derive(Debug)]
struct StreamerState {
    offset: u64,
    closed: bool,
}

impl Streamer {
    pub(crate) fn new(
        mount: &Arc<Mount>,
        key: &str,
        flags: AccessMode,
        offset: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            mount: Arc::downgrade(mount),
            key: key.to_string(),
            meta_key: mount.meta_key(key),
            flags,
            storage: mount.primary().clone(),
            metadata: mount.distinct_metadata(),
            encrypt: mount.encrypt().cloned(),
            state: Mutex::new(StreamerState {
                offset,
                closed: false,
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn flags(&self) -> AccessMode {
        self.flags
    }

    /// True while another task holds this handle mid-operation.
    pub fn is_busy(&self) -> bool {
        self.state.try_lock().is_err()
    }

    pub async fn offset(&self) -> u64 {
        self.state.lock().await.offset
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Reads from the current position, advancing it by the bytes read.
    /// Exhaustion reads as `Ok(0)`, never as an error.
    pub async fn read(&self, ctx: &Context, buf: &mut [u8]) -> VfsResult<usize> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(ErrorKind::Closed.into());
        }
        if !self.flags.is_readable() {
            return Err(ErrorKind::Permission.into());
        }
        ctx.check()?;
        let offset = state.offset;
        let outcome = self.storage.read(ctx, &self.key, offset, buf).await?;
        if let Some(enc) = &self.encrypt {
            let plain = enc
                .unseal(ctx, &self.key, offset, &buf[..outcome.bytes])
                .await?;
            buf[..outcome.bytes].copy_from_slice(&plain);
        }
        state.offset = offset + outcome.bytes as u64;
        Ok(outcome.bytes)
    }

    /// Writes at the current position, advancing it by the bytes written and
    /// refreshing the metadata size so concurrent readers observe the new
    /// logical size.
    pub async fn write(&self, ctx: &Context, data: &[u8]) -> VfsResult<usize> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(ErrorKind::Closed.into());
        }
        if !self.flags.is_writable() {
            return Err(ErrorKind::Permission.into());
        }
        ctx.check()?;
        let offset = state.offset;
        let sealed;
        let payload = match &self.encrypt {
            Some(enc) => {
                sealed = enc.seal(ctx, &self.key, offset, data).await?;
                sealed.as_slice()
            }
            None => data,
        };
        let n = self.storage.write(ctx, &self.key, offset, payload).await?;
        state.offset = offset + n as u64;

        if let Some(mount) = self.mount.upgrade() {
            if let Some(cache) = mount.cache() {
                if let Err(err) = cache.evict(ctx, &self.key).await {
                    warn!(key = %self.key, error = %err, "cache eviction failed");
                }
            }
        }

        if let Some(meta) = &self.metadata {
            let end = offset + n as u64;
            match meta.read_meta(ctx, &self.meta_key).await {
                Ok(current) if current.size < end => {
                    meta.update_meta(ctx, &self.meta_key, &MetadataUpdate::size(end))
                        .await?;
                }
                Ok(_) => {}
                Err(err) if err.is(&ErrorKind::NotExist) => {
                    // A lost index entry is re-materialized by the next
                    // probe; nothing to refresh here.
                    warn!(key = %self.key, "metadata entry missing during write");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(n)
    }

    /// Repositions the handle. `SeekFrom::End` resolves the current size
    /// from metadata when the mount has a distinct index, falling back to a
    /// fresh head. Seeking before the start is refused.
    pub async fn seek(&self, ctx: &Context, pos: SeekFrom) -> VfsResult<u64> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(ErrorKind::Closed.into());
        }
        ctx.check()?;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => state.offset as i64 + delta,
            SeekFrom::End(delta) => {
                let size = match &self.metadata {
                    Some(meta) => match meta.read_meta(ctx, &self.meta_key).await {
                        Ok(current) => current.size,
                        Err(err) if err.is(&ErrorKind::NotExist) => {
                            self.storage.head(ctx, &self.key).await?.size
                        }
                        Err(err) => return Err(err),
                    },
                    None => self.storage.head(ctx, &self.key).await?.size,
                };
                size as i64 + delta
            }
        };
        if target < 0 {
            return Err(ErrorKind::Invalid.into());
        }
        state.offset = target as u64;
        Ok(state.offset)
    }

    /// Closes the handle and removes it from the mount's open table.
    /// Closing twice fails with `Closed`.
    pub async fn close(&self) -> VfsResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(ErrorKind::Closed.into());
        }
        state.closed = true;
        if let Some(mount) = self.mount.upgrade() {
            mount.forget_streamer(&self.key);
        }
        Ok(())
    }
}
impl Debug for Streamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Streamer")
            .field("key", &self.key)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

//! A generic in-memory storage backend.
//!
//! Objects live under flat `/`-separated keys in a sorted map, so listings
//! come out ordered for free. The backend fills both the [`ObjectStorage`]
//! and [`MetadataStore`] roles and is the reference target for the backend
//! contracts as well as the test suite's primary.

use crate::backend::{
    Backend, CapabilityKind, CapabilitySet, MetadataStore, ObjectStorage, ReadOutcome,
};
use crate::context::Context;
use crate::error::{ErrorKind, VfsResult};
use crate::metadata::{FileMetadata, FileMode, FileStat, MetadataUpdate};
use crate::path::key_parent;
use crate::query::{self, MetadataQuery, MetadataQueryResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

pub struct MemoryBackend {
    name: String,
    read_only: bool,
    min_object_size: Option<u64>,
    max_object_size: Option<u64>,
    birth: SystemTime,
    objects: RwLock<BTreeMap<String, Object>>,
    meta: RwLock<BTreeMap<String, FileMetadata>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
}
impl MemoryBackend {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::bare(name, false, None, None))
    }

    /// A backend that refuses all mutation.
    pub fn new_read_only(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::bare(name, true, None, None))
    }

    /// A backend advertising an accepted object-size window.
    pub fn with_limits(
        name: impl Into<String>,
        min_object_size: Option<u64>,
        max_object_size: Option<u64>,
    ) -> Arc<Self> {
        Arc::new(Self::bare(name, false, min_object_size, max_object_size))
    }

    fn bare(
        name: impl Into<String>,
        read_only: bool,
        min_object_size: Option<u64>,
        max_object_size: Option<u64>,
    ) -> Self {
        Self {
            name: name.into(),
            read_only,
            min_object_size,
            max_object_size,
            birth: SystemTime::now(),
            objects: RwLock::new(BTreeMap::new()),
            meta: RwLock::new(BTreeMap::new()),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// How many times `open` ran. The composer promises exactly one per
    /// unique instance per mount.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::Relaxed)
    }

    /// The synthesized entry for the implicit mount root.
    fn root_stat(&self) -> FileStat {
        FileStat {
            key: String::new(),
            hash: String::new(),
            mode: FileMode::dir(0o755),
            size: 0,
            modify_time: self.birth,
            create_time: self.birth,
            content_type: DIRECTORY_CONTENT_TYPE.to_string(),
            etag: String::new(),
        }
    }

    fn guard_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(ErrorKind::ReadOnly.into())
        } else {
            Ok(())
        }
    }

    // The backend is dual-capable: its object mutations keep the metadata
    // table in step so a dual mount never needs core-driven index writes.

    fn meta_insert(&self, stat: &FileStat) {
        let mut table = self.meta.write().unwrap();
        table
            .entry(stat.key.clone())
            .or_insert_with(|| stat.clone().into_metadata());
    }

    fn meta_resize(&self, key: &str, size: u64, etag: String) {
        let mut table = self.meta.write().unwrap();
        if let Some(meta) = table.get_mut(key) {
            meta.size = size;
            meta.etag = etag;
            meta.modify_time = SystemTime::now();
        }
    }

    fn meta_remove(&self, key: &str, cascade: bool) {
        let mut table = self.meta.write().unwrap();
        table.remove(key);
        if cascade {
            let prefix = format!("{key}/");
            let doomed: Vec<String> = table
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, _)| k.clone())
                .collect();
            for k in doomed {
                table.remove(&k);
            }
        }
    }
}

struct Object {
    mode: FileMode,
    data: Vec<u8>,
    create_time: SystemTime,
    modify_time: SystemTime,
    content_type: String,
}
impl Object {
    fn new(mode: FileMode, content_type: String) -> Self {
        let now = SystemTime::now();
        Self {
            mode,
            data: Vec::new(),
            create_time: now,
            modify_time: now,
            content_type,
        }
    }

    fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }

    fn stat(&self, key: &str) -> FileStat {
        let hash = if self.is_dir() {
            String::new()
        } else {
            hex::encode(Sha256::digest(&self.data))
        };
        let etag = hash.get(..16).unwrap_or("").to_string();
        FileStat {
            key: key.to_string(),
            hash,
            mode: self.mode,
            size: self.data.len() as u64,
            modify_time: self.modify_time,
            create_time: self.create_time,
            content_type: self.content_type.clone(),
            etag,
        }
    }
}

fn guess_content_type(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext) {
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("html") => "text/html",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, ctx: &Context) -> VfsResult<()> {
        ctx.check()?;
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self, ctx: &Context) -> VfsResult<()> {
        ctx.check()?;
        self.closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn capabilities(&self) -> CapabilitySet {
        let mut caps = CapabilitySet::new().with_kind(CapabilityKind::Metadata);
        caps.read_only = self.read_only;
        caps.min_object_size = self.min_object_size;
        caps.max_object_size = self.max_object_size;
        caps
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn head(&self, ctx: &Context, key: &str) -> VfsResult<FileStat> {
        ctx.check()?;
        if key.is_empty() {
            return Ok(self.root_stat());
        }
        let objects = self.objects.read().unwrap();
        objects
            .get(key)
            .map(|obj| obj.stat(key))
            .ok_or_else(|| ErrorKind::NotExist.into())
    }

    async fn list(&self, ctx: &Context, key: &str) -> VfsResult<Vec<FileStat>> {
        ctx.check()?;
        let objects = self.objects.read().unwrap();
        if key.is_empty() {
            return Ok(objects
                .iter()
                .filter(|(k, _)| !k.contains('/'))
                .map(|(k, obj)| obj.stat(k))
                .collect());
        }
        let Some(target) = objects.get(key) else {
            return Err(ErrorKind::NotExist.into());
        };
        if !target.is_dir() {
            return Ok(vec![target.stat(key)]);
        }
        let prefix = format!("{key}/");
        Ok(objects
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k[prefix.len()..].contains('/'))
            .map(|(k, obj)| obj.stat(k))
            .collect())
    }

    async fn create(&self, ctx: &Context, key: &str, mode: FileMode) -> VfsResult<FileStat> {
        ctx.check()?;
        self.guard_writable()?;
        if key.is_empty() {
            return Err(ErrorKind::Exist.into());
        }
        let mut objects = self.objects.write().unwrap();
        if objects.contains_key(key) {
            return Err(ErrorKind::Exist.into());
        }
        if let Some(parent) = key_parent(key) {
            match objects.get(parent) {
                Some(p) if p.is_dir() => {}
                Some(_) => return Err(ErrorKind::NotDirectory.into()),
                None => return Err(ErrorKind::NotExist.into()),
            }
        }
        let content_type = if mode.is_dir() {
            DIRECTORY_CONTENT_TYPE.to_string()
        } else {
            guess_content_type(key).to_string()
        };
        let obj = Object::new(mode, content_type);
        let stat = obj.stat(key);
        objects.insert(key.to_string(), obj);
        drop(objects);
        self.meta_insert(&stat);
        Ok(stat)
    }

    async fn read(
        &self,
        ctx: &Context,
        key: &str,
        offset: u64,
        buf: &mut [u8],
    ) -> VfsResult<ReadOutcome> {
        ctx.check()?;
        let objects = self.objects.read().unwrap();
        let obj = if key.is_empty() {
            return Err(ErrorKind::IsDirectory.into());
        } else {
            objects.get(key).ok_or(ErrorKind::NotExist)?
        };
        if obj.is_dir() {
            return Err(ErrorKind::IsDirectory.into());
        }
        let len = obj.data.len() as u64;
        if offset >= len {
            return Ok(ReadOutcome {
                bytes: 0,
                eof: true,
            });
        }
        let avail = (len - offset) as usize;
        let n = buf.len().min(avail);
        let start = offset as usize;
        buf[..n].copy_from_slice(&obj.data[start..start + n]);
        Ok(ReadOutcome {
            bytes: n,
            eof: n == avail,
        })
    }

    async fn write(&self, ctx: &Context, key: &str, offset: u64, data: &[u8]) -> VfsResult<usize> {
        ctx.check()?;
        self.guard_writable()?;
        let mut objects = self.objects.write().unwrap();
        let obj = objects.get_mut(key).ok_or(ErrorKind::NotExist)?;
        if obj.is_dir() {
            return Err(ErrorKind::IsDirectory.into());
        }
        let start = offset as usize;
        let end = start + data.len();
        if obj.data.len() < start {
            // Writes past the end zero-fill the gap.
            obj.data.resize(start, 0);
        }
        if obj.data.len() < end {
            obj.data.resize(end, 0);
        }
        obj.data[start..end].copy_from_slice(data);
        obj.modify_time = SystemTime::now();
        let (size, etag) = {
            let stat = obj.stat(key);
            (stat.size, stat.etag)
        };
        drop(objects);
        self.meta_resize(key, size, etag);
        Ok(data.len())
    }

    async fn truncate(&self, ctx: &Context, key: &str, size: u64) -> VfsResult<()> {
        ctx.check()?;
        self.guard_writable()?;
        let mut objects = self.objects.write().unwrap();
        let obj = objects.get_mut(key).ok_or(ErrorKind::NotExist)?;
        if obj.is_dir() {
            return Err(ErrorKind::IsDirectory.into());
        }
        obj.data.resize(size as usize, 0);
        obj.modify_time = SystemTime::now();
        let etag = obj.stat(key).etag;
        drop(objects);
        self.meta_resize(key, size, etag);
        Ok(())
    }

    async fn delete(&self, ctx: &Context, key: &str, force: bool) -> VfsResult<()> {
        ctx.check()?;
        self.guard_writable()?;
        if key.is_empty() {
            return Err(ErrorKind::Invalid.into());
        }
        let mut objects = self.objects.write().unwrap();
        let obj = objects.get(key).ok_or(ErrorKind::NotExist)?;
        if obj.is_dir() {
            if !force {
                return Err(ErrorKind::IsDirectory.into());
            }
            let prefix = format!("{key}/");
            let doomed: Vec<String> = objects
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, _)| k.clone())
                .collect();
            for k in doomed {
                objects.remove(&k);
            }
        }
        let was_dir = objects.get(key).is_some_and(|o| o.is_dir());
        objects.remove(key);
        drop(objects);
        self.meta_remove(key, was_dir);
        Ok(())
    }

    fn as_metadata(self: Arc<Self>) -> Option<Arc<dyn MetadataStore>> {
        Some(self)
    }
}

#[async_trait]
impl MetadataStore for MemoryBackend {
    async fn create_meta(&self, ctx: &Context, meta: &FileMetadata) -> VfsResult<()> {
        ctx.check()?;
        self.guard_writable()?;
        let mut table = self.meta.write().unwrap();
        if table.contains_key(&meta.key) {
            return Err(ErrorKind::Exist.into());
        }
        table.insert(meta.key.clone(), meta.clone());
        Ok(())
    }

    async fn read_meta(&self, ctx: &Context, key: &str) -> VfsResult<FileMetadata> {
        ctx.check()?;
        self.meta
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ErrorKind::NotExist.into())
    }

    async fn update_meta(
        &self,
        ctx: &Context,
        key: &str,
        update: &MetadataUpdate,
    ) -> VfsResult<()> {
        ctx.check()?;
        self.guard_writable()?;
        let mut table = self.meta.write().unwrap();
        let meta = table.get_mut(key).ok_or(ErrorKind::NotExist)?;
        update.apply(meta);
        Ok(())
    }

    async fn delete_meta(&self, ctx: &Context, key: &str) -> VfsResult<()> {
        ctx.check()?;
        self.guard_writable()?;
        self.meta
            .write()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ErrorKind::NotExist.into())
    }

    async fn exists_meta(&self, ctx: &Context, key: &str) -> VfsResult<bool> {
        ctx.check()?;
        Ok(self.meta.read().unwrap().contains_key(key))
    }

    async fn query_meta(
        &self,
        ctx: &Context,
        query: &MetadataQuery,
    ) -> VfsResult<MetadataQueryResult> {
        ctx.check()?;
        let entries: Vec<FileMetadata> = self.meta.read().unwrap().values().cloned().collect();
        Ok(query::run_query(entries, query))
    }
}

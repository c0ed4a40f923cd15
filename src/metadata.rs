//! The VFS data model: modes, access flags, stats, metadata records and
//! partial updates.

use bitflags::bitflags;
use std::collections::HashMap;
use std::time::SystemTime;
use uuid::Uuid;

bitflags! {
    /// Mode word of a filesystem entry: type bits in the high word, nine
    /// Unix permission bits in the low word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileMode: u32 {
        const DIR         = 1 << 31;
        const SYMLINK     = 1 << 30;
        const NAMED_PIPE  = 1 << 29;
        const SOCKET      = 1 << 28;
        const DEVICE      = 1 << 27;
        const CHAR_DEVICE = 1 << 26;
        const IRREGULAR   = 1 << 25;
        const MOUNT_POINT = 1 << 24;

        const PERM = 0o777;
        const TYPE_MASK = Self::DIR.bits()
            | Self::SYMLINK.bits()
            | Self::NAMED_PIPE.bits()
            | Self::SOCKET.bits()
            | Self::DEVICE.bits()
            | Self::CHAR_DEVICE.bits()
            | Self::IRREGULAR.bits()
            | Self::MOUNT_POINT.bits();
    }
}
impl FileMode {
    /// A regular file with the given permission bits.
    pub fn regular(perm: u32) -> Self {
        Self::from_bits_retain(perm & 0o777)
    }

    /// A directory with the given permission bits.
    pub fn dir(perm: u32) -> Self {
        Self::DIR | Self::from_bits_retain(perm & 0o777)
    }

    pub fn file_type(self) -> FileType {
        let typed = self & Self::TYPE_MASK;
        if typed.contains(Self::DIR) {
            FileType::Directory
        } else if typed.contains(Self::SYMLINK) {
            FileType::Symlink
        } else if typed.contains(Self::NAMED_PIPE) {
            FileType::NamedPipe
        } else if typed.contains(Self::SOCKET) {
            FileType::Socket
        } else if typed.contains(Self::CHAR_DEVICE) {
            FileType::CharDevice
        } else if typed.contains(Self::DEVICE) {
            FileType::Device
        } else if typed.contains(Self::IRREGULAR) {
            FileType::Irregular
        } else if typed.contains(Self::MOUNT_POINT) {
            FileType::MountPoint
        } else {
            FileType::Regular
        }
    }

    pub fn is_dir(self) -> bool {
        self.contains(Self::DIR)
    }

    pub fn is_regular(self) -> bool {
        (self & Self::TYPE_MASK).is_empty()
    }

    pub fn permbits(self) -> u32 {
        self.bits() & 0o777
    }
}

/// The type carried in a [`FileMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    NamedPipe,
    Socket,
    Device,
    CharDevice,
    Irregular,
    MountPoint,
}

bitflags! {
    /// Open-mode bits accepted by `open_file`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMode: u32 {
        const READ   = 1 << 0;
        const WRITE  = 1 << 1;
        const APPEND = 1 << 2;
        const CREATE = 1 << 3;
        const TRUNC  = 1 << 4;
        const EXCL   = 1 << 5;
        const SYNC   = 1 << 6;
    }
}
impl AccessMode {
    pub fn is_readable(self) -> bool {
        self.contains(Self::READ)
    }

    pub fn is_writable(self) -> bool {
        self.intersects(Self::WRITE | Self::APPEND)
    }

    /// True if the open would mutate the namespace or file content, which a
    /// read-only mount refuses outright.
    pub fn wants_mutation(self) -> bool {
        self.intersects(Self::WRITE | Self::APPEND | Self::CREATE | Self::TRUNC | Self::EXCL)
    }
}

/// Lightweight stat projection returned by object storage.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub key: String,
    pub hash: String,
    pub mode: FileMode,
    pub size: u64,
    pub modify_time: SystemTime,
    pub create_time: SystemTime,
    pub content_type: String,
    pub etag: String,
}
impl FileStat {
    /// Projects the stat into a full metadata record, assigning a fresh id.
    pub fn into_metadata(self) -> FileMetadata {
        FileMetadata {
            id: Uuid::new_v4(),
            key: self.key,
            mode: self.mode,
            size: self.size,
            uid: 0,
            gid: 0,
            create_time: self.create_time,
            modify_time: self.modify_time,
            access_time: self.modify_time,
            content_type: self.content_type,
            etag: self.etag,
            attributes: HashMap::new(),
        }
    }
}

/// The metadata record kept per entry by a metadata index.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub id: Uuid,
    pub key: String,
    pub mode: FileMode,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub create_time: SystemTime,
    pub modify_time: SystemTime,
    pub access_time: SystemTime,
    pub content_type: String,
    pub etag: String,
    pub attributes: HashMap<String, String>,
}
impl FileMetadata {
    pub fn new(key: impl Into<String>, mode: FileMode) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            mode,
            size: 0,
            uid: 0,
            gid: 0,
            create_time: now,
            modify_time: now,
            access_time: now,
            content_type: String::new(),
            etag: String::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }
}

bitflags! {
    /// Selects which fields of a [`MetadataUpdate`] apply.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UpdateMask: u32 {
        const MODE         = 1 << 0;
        const SIZE         = 1 << 1;
        const UID          = 1 << 2;
        const GID          = 1 << 3;
        const ACCESS_TIME  = 1 << 4;
        const CONTENT_TYPE = 1 << 5;
        const ETAG         = 1 << 6;
        const ATTRIBUTES   = 1 << 7;
    }
}

/// A partial metadata update: `mask` selects the fields of the delta to
/// apply. Applying an update with any bit set refreshes `modify_time`.
#[derive(Debug, Clone)]
pub struct MetadataUpdate {
    pub mask: UpdateMask,
    pub mode: FileMode,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub access_time: SystemTime,
    pub content_type: String,
    pub etag: String,
    pub attributes: HashMap<String, String>,
}
impl MetadataUpdate {
    pub fn size(size: u64) -> Self {
        Self {
            mask: UpdateMask::SIZE,
            size,
            ..Self::default()
        }
    }

    pub fn mode(mode: FileMode) -> Self {
        Self {
            mask: UpdateMask::MODE,
            mode,
            ..Self::default()
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.mask |= UpdateMask::ETAG;
        self.etag = etag.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.mask |= UpdateMask::CONTENT_TYPE;
        self.content_type = content_type.into();
        self
    }

    /// Applies the masked fields to `meta`, refreshing `modify_time` when
    /// anything was selected.
    pub fn apply(&self, meta: &mut FileMetadata) {
        if self.mask.is_empty() {
            return;
        }
        if self.mask.contains(UpdateMask::MODE) {
            meta.mode = self.mode;
        }
        if self.mask.contains(UpdateMask::SIZE) {
            meta.size = self.size;
        }
        if self.mask.contains(UpdateMask::UID) {
            meta.uid = self.uid;
        }
        if self.mask.contains(UpdateMask::GID) {
            meta.gid = self.gid;
        }
        if self.mask.contains(UpdateMask::ACCESS_TIME) {
            meta.access_time = self.access_time;
        }
        if self.mask.contains(UpdateMask::CONTENT_TYPE) {
            meta.content_type = self.content_type.clone();
        }
        if self.mask.contains(UpdateMask::ETAG) {
            meta.etag = self.etag.clone();
        }
        if self.mask.contains(UpdateMask::ATTRIBUTES) {
            meta.attributes = self.attributes.clone();
        }
        meta.modify_time = SystemTime::now();
    }
}
impl Default for MetadataUpdate {
    fn default() -> Self {
        Self {
            mask: UpdateMask::empty(),
            mode: FileMode::empty(),
            size: 0,
            uid: 0,
            gid: 0,
            access_time: SystemTime::UNIX_EPOCH,
            content_type: String::new(),
            etag: String::new(),
            attributes: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_types() {
        assert!(FileMode::dir(0o755).is_dir());
        assert_eq!(FileMode::dir(0o755).file_type(), FileType::Directory);
        assert_eq!(FileMode::dir(0o755).permbits(), 0o755);
        assert!(FileMode::regular(0o644).is_regular());
        assert_eq!(FileMode::regular(0o644).file_type(), FileType::Regular);
    }

    #[test]
    fn access_mode_classes() {
        assert!(AccessMode::READ.is_readable());
        assert!(!AccessMode::READ.is_writable());
        assert!(AccessMode::APPEND.is_writable());
        assert!(AccessMode::TRUNC.wants_mutation());
        assert!(!AccessMode::READ.wants_mutation());
    }

    #[test]
    fn update_applies_masked_fields_only() {
        let mut meta = FileMetadata::new("a.txt", FileMode::regular(0o644));
        let before = meta.modify_time;
        let update = MetadataUpdate::size(42).with_etag("abc");
        update.apply(&mut meta);
        assert_eq!(meta.size, 42);
        assert_eq!(meta.etag, "abc");
        assert_eq!(meta.mode, FileMode::regular(0o644));
        assert!(meta.modify_time >= before);
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let mut meta = FileMetadata::new("a.txt", FileMode::regular(0o644));
        let stamp = meta.modify_time;
        MetadataUpdate::default().apply(&mut meta);
        assert_eq!(meta.modify_time, stamp);
    }

    #[test]
    fn stat_projection_assigns_fresh_ids() {
        let stat = FileStat {
            key: "a".into(),
            hash: String::new(),
            mode: FileMode::regular(0o644),
            size: 3,
            modify_time: SystemTime::now(),
            create_time: SystemTime::now(),
            content_type: "text/plain".into(),
            etag: String::new(),
        };
        let a = stat.clone().into_metadata();
        let b = stat.into_metadata();
        assert_ne!(a.id, b.id);
        assert_eq!(a.size, 3);
    }
}

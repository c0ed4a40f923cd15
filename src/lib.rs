//! stratafs: a mount-based virtual filesystem core.
//!
//! The crate presents one Unix-like namespace over heterogeneous storage
//! backends. A [`Vfs`] routes absolute paths through a mount table with
//! longest-prefix resolution; each [`Mount`](mount::Mount) composes a
//! primary [`ObjectStorage`](backend::ObjectStorage) backend with an
//! optional metadata index and optional extension capabilities, and keeps
//! the two storage layers coherent through every operation. Open files are
//! [`Streamer`] handles with POSIX-flavoured read/write/seek semantics over
//! the offset-based backend primitives.
//!
//! ```
//! use std::sync::Arc;
//! use stratafs::backend::memory::MemoryBackend;
//! use stratafs::{AccessMode, Context, MountOptions, Vfs};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> stratafs::VfsResult<()> {
//! let vfs = Vfs::new();
//! let ctx = Context::background();
//! vfs.mount(&ctx, "/", MemoryBackend::new("mem"), MountOptions::default())
//!     .await?;
//!
//! let file = vfs
//!     .open_file(&ctx, "/hello.txt", AccessMode::WRITE | AccessMode::CREATE)
//!     .await?;
//! file.write(&ctx, b"hello world").await?;
//! file.close().await?;
//!
//! assert_eq!(vfs.read_file(&ctx, "/hello.txt", 0, 64).await?, b"hello world");
//! vfs.shutdown(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod context;
pub mod error;
pub mod metadata;
pub mod mount;
pub mod path;
pub mod query;
pub mod streamer;
pub mod vfs;

pub use context::Context;
pub use error::{ErrorKind, VfsError, VfsResult};
pub use metadata::{
    AccessMode, FileMetadata, FileMode, FileStat, FileType, MetadataUpdate, UpdateMask,
};
pub use mount::registry::MountRegistry;
pub use mount::{Mount, MountOptions};
pub use query::{MetadataQuery, MetadataQueryResult, SortBy, SortOrder};
pub use streamer::Streamer;
pub use vfs::Vfs;

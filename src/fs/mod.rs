//! the on-disk structures of a MiniVSFS image
pub mod bitmap;
pub(crate) mod codec;
pub mod directory;
pub mod error;
pub mod image;
pub mod inode;
pub mod superblock;

pub use bitmap::*;
pub use directory::*;
pub use error::*;
pub use image::*;
pub use inode::*;
pub use superblock::*;

pub const FS_MAGIC: u32 = 0x4D56_5346;
pub const FS_VERSION: u32 = 1;
pub const BLOCK_SIZE: usize = 4096;
pub const INODE_SIZE: usize = 128;
pub const ROOT_INO: u32 = 1;
pub const DIRECT_MAX: usize = 12;
pub const DIRENT_SIZE: usize = 64;
pub const DIRENTS_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;
/// a file is capped at what the direct pointers can address
pub const MAX_FILE_SIZE: u64 = (DIRECT_MAX * BLOCK_SIZE) as u64;

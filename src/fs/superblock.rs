use crate::fs::codec::{get_u32, get_u64, put_u32, put_u64};
use crate::fs::{FsError, Result, BLOCK_SIZE, FS_MAGIC, FS_VERSION, ROOT_INO};
use crate::utils::checksum::crc32;
use crate::utils::geometry::{
    Geometry, DATA_BITMAP_START, INODE_BITMAP_START, INODE_TABLE_START,
};
use crate::utils::traits::ChecksumInSelf;

// field offsets within block 0; the structure occupies the first
// SUPERBLOCK_SIZE bytes and the rest of the block stays zero
const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_BLOCK_SIZE: usize = 8;
const OFF_TOTAL_BLOCKS: usize = 12;
const OFF_INODE_COUNT: usize = 20;
const OFF_INODE_BITMAP_START: usize = 28;
const OFF_INODE_BITMAP_BLOCKS: usize = 36;
const OFF_DATA_BITMAP_START: usize = 44;
const OFF_DATA_BITMAP_BLOCKS: usize = 52;
const OFF_INODE_TABLE_START: usize = 60;
const OFF_INODE_TABLE_BLOCKS: usize = 68;
const OFF_DATA_REGION_START: usize = 76;
const OFF_DATA_REGION_BLOCKS: usize = 84;
const OFF_ROOT_INODE: usize = 92;
const OFF_MTIME_EPOCH: usize = 100;
const OFF_FLAGS: usize = 108;
const OFF_CHECKSUM: usize = 112;

pub const SUPERBLOCK_SIZE: usize = 116;

/// The superblock of one image, block 0. Single source of truth for all
/// geometry: every other region's position is read from here and never
/// recomputed once written.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperBlock {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub total_blocks: u64,
    pub inode_count: u64,
    pub inode_bitmap_start: u64,
    pub inode_bitmap_blocks: u64,
    pub data_bitmap_start: u64,
    pub data_bitmap_blocks: u64,
    pub inode_table_start: u64,
    pub inode_table_blocks: u64,
    pub data_region_start: u64,
    pub data_region_blocks: u64,
    pub root_inode: u64,
    pub mtime_epoch: u64,
    pub flags: u32,
    /// CRC-32 over the first `BLOCK_SIZE - 4` bytes of block 0 with this
    /// field zeroed; always the last four bytes of the structure
    pub checksum: u32,
}

impl SuperBlock {
    pub fn new(geo: &Geometry, mtime_epoch: u64) -> Self {
        let mut sb = SuperBlock {
            magic: FS_MAGIC,
            version: FS_VERSION,
            block_size: BLOCK_SIZE as u32,
            total_blocks: geo.total_blocks,
            inode_count: geo.inode_count,
            inode_bitmap_start: INODE_BITMAP_START,
            inode_bitmap_blocks: 1,
            data_bitmap_start: DATA_BITMAP_START,
            data_bitmap_blocks: 1,
            inode_table_start: INODE_TABLE_START,
            inode_table_blocks: geo.inode_table_blocks,
            data_region_start: geo.data_region_start,
            data_region_blocks: geo.data_region_blocks,
            root_inode: ROOT_INO as u64,
            mtime_epoch,
            flags: 0,
            checksum: 0,
        };
        sb.finalize_checksum();
        sb
    }

    /// the layout this superblock describes
    pub fn geometry(&self) -> Geometry {
        Geometry {
            total_blocks: self.total_blocks,
            inode_count: self.inode_count,
            inode_table_blocks: self.inode_table_blocks,
            data_region_start: self.data_region_start,
            data_region_blocks: self.data_region_blocks,
        }
    }

    fn put_fields(&self, block: &mut [u8]) {
        put_u32(block, OFF_MAGIC, self.magic);
        put_u32(block, OFF_VERSION, self.version);
        put_u32(block, OFF_BLOCK_SIZE, self.block_size);
        put_u64(block, OFF_TOTAL_BLOCKS, self.total_blocks);
        put_u64(block, OFF_INODE_COUNT, self.inode_count);
        put_u64(block, OFF_INODE_BITMAP_START, self.inode_bitmap_start);
        put_u64(block, OFF_INODE_BITMAP_BLOCKS, self.inode_bitmap_blocks);
        put_u64(block, OFF_DATA_BITMAP_START, self.data_bitmap_start);
        put_u64(block, OFF_DATA_BITMAP_BLOCKS, self.data_bitmap_blocks);
        put_u64(block, OFF_INODE_TABLE_START, self.inode_table_start);
        put_u64(block, OFF_INODE_TABLE_BLOCKS, self.inode_table_blocks);
        put_u64(block, OFF_DATA_REGION_START, self.data_region_start);
        put_u64(block, OFF_DATA_REGION_BLOCKS, self.data_region_blocks);
        put_u64(block, OFF_ROOT_INODE, self.root_inode);
        put_u64(block, OFF_MTIME_EPOCH, self.mtime_epoch);
        put_u32(block, OFF_FLAGS, self.flags);
    }

    /// encode into block 0 of an image and refresh the checksum.
    ///
    /// The checksum covers the whole block minus its last four bytes, so it
    /// is computed over the actual block content; bytes beyond
    /// [SUPERBLOCK_SIZE] are left as they are (all zero in a valid image).
    pub fn serialize_into(&mut self, block: &mut [u8]) {
        assert_eq!(block.len(), BLOCK_SIZE);
        self.put_fields(block);
        put_u32(block, OFF_CHECKSUM, 0);
        self.checksum = crc32(&block[..BLOCK_SIZE - 4]);
        put_u32(block, OFF_CHECKSUM, self.checksum);
    }

    /// decode block 0 of an image, verifying identity and checksum
    pub fn deserialize_from(block: &[u8]) -> Result<Self> {
        if block.len() < BLOCK_SIZE {
            return Err(FsError::Corrupted(
                "image smaller than one block".into(),
            ));
        }
        let sb = SuperBlock {
            magic: get_u32(block, OFF_MAGIC),
            version: get_u32(block, OFF_VERSION),
            block_size: get_u32(block, OFF_BLOCK_SIZE),
            total_blocks: get_u64(block, OFF_TOTAL_BLOCKS),
            inode_count: get_u64(block, OFF_INODE_COUNT),
            inode_bitmap_start: get_u64(block, OFF_INODE_BITMAP_START),
            inode_bitmap_blocks: get_u64(block, OFF_INODE_BITMAP_BLOCKS),
            data_bitmap_start: get_u64(block, OFF_DATA_BITMAP_START),
            data_bitmap_blocks: get_u64(block, OFF_DATA_BITMAP_BLOCKS),
            inode_table_start: get_u64(block, OFF_INODE_TABLE_START),
            inode_table_blocks: get_u64(block, OFF_INODE_TABLE_BLOCKS),
            data_region_start: get_u64(block, OFF_DATA_REGION_START),
            data_region_blocks: get_u64(block, OFF_DATA_REGION_BLOCKS),
            root_inode: get_u64(block, OFF_ROOT_INODE),
            mtime_epoch: get_u64(block, OFF_MTIME_EPOCH),
            flags: get_u32(block, OFF_FLAGS),
            checksum: get_u32(block, OFF_CHECKSUM),
        };
        if sb.magic != FS_MAGIC {
            return Err(FsError::Corrupted(format!(
                "bad magic 0x{:08X}, expected 0x{FS_MAGIC:08X}",
                sb.magic
            )));
        }
        if sb.version != FS_VERSION {
            return Err(FsError::Corrupted(format!(
                "unsupported version {}",
                sb.version
            )));
        }
        if sb.block_size != BLOCK_SIZE as u32 {
            return Err(FsError::Corrupted(format!(
                "unsupported block size {}",
                sb.block_size
            )));
        }
        let mut scratch = block[..BLOCK_SIZE].to_vec();
        put_u32(&mut scratch, OFF_CHECKSUM, 0);
        let computed = crc32(&scratch[..BLOCK_SIZE - 4]);
        if computed != sb.checksum {
            return Err(FsError::Corrupted(format!(
                "superblock checksum mismatch: stored 0x{:08X}, computed 0x{computed:08X}",
                sb.checksum
            )));
        }
        Ok(sb)
    }
}

impl ChecksumInSelf for SuperBlock {
    fn finalize_checksum(&mut self) {
        // the coverage includes the zero padding after the structure, so a
        // scratch block is equivalent to the real block 0 of a fresh image
        let mut scratch = vec![0u8; BLOCK_SIZE];
        self.put_fields(&mut scratch);
        self.checksum = crc32(&scratch[..BLOCK_SIZE - 4]);
    }

    fn verify_checksum(&self) -> bool {
        let mut scratch = vec![0u8; BLOCK_SIZE];
        self.put_fields(&mut scratch);
        crc32(&scratch[..BLOCK_SIZE - 4]) == self.checksum
    }
}

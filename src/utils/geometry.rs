//! This module computes the sizes and positions of the fs components.

use byte_unit::Byte;

use crate::fs::{FsError, Result, BLOCK_SIZE, INODE_SIZE};

/// supported image size range, in KiB
pub const MIN_SIZE_KIB: u64 = 180;
pub const MAX_SIZE_KIB: u64 = 4096;
/// supported inode count range
pub const MIN_INODES: u64 = 128;
pub const MAX_INODES: u64 = 512;

/// fixed positions of the header regions
pub const INODE_BITMAP_START: u64 = 1;
pub const DATA_BITMAP_START: u64 = 2;
pub const INODE_TABLE_START: u64 = 3;

/// The block layout of one image, derived once from the requested size and
/// inode count and afterwards read back solely from the superblock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub total_blocks: u64,
    pub inode_count: u64,
    pub inode_table_blocks: u64,
    pub data_region_start: u64,
    pub data_region_blocks: u64,
}

/// calculate how many blocks the inode table occupies
/// # Params
/// - `inode_count`: the number of inodes
pub fn inode_table_blocks(inode_count: u64) -> u64 {
    (inode_count * INODE_SIZE as u64).div_ceil(BLOCK_SIZE as u64)
}

/// compute the layout for a new image
/// # Params
/// - `size_kib`: total image size in KiB, must be in
///   [[MIN_SIZE_KIB], [MAX_SIZE_KIB]] and a multiple of 4
/// - `inode_count`: must be in [[MIN_INODES], [MAX_INODES]]
/// # Return
/// the [Geometry], or [FsError::Validation] if a parameter is out of range
pub fn compute(size_kib: u64, inode_count: u64) -> Result<Geometry> {
    if !(MIN_SIZE_KIB..=MAX_SIZE_KIB).contains(&size_kib) || size_kib % 4 != 0 {
        return Err(FsError::Validation(format!(
            "image size must be a multiple of 4 KiB between {} and {}, got {} KiB",
            Byte::from_bytes((MIN_SIZE_KIB * 1024) as _).get_appropriate_unit(true),
            Byte::from_bytes((MAX_SIZE_KIB * 1024) as _).get_appropriate_unit(true),
            size_kib
        )));
    }
    if !(MIN_INODES..=MAX_INODES).contains(&inode_count) {
        return Err(FsError::Validation(format!(
            "inode count must be between {MIN_INODES} and {MAX_INODES}, got {inode_count}"
        )));
    }

    let total_blocks = size_kib * 1024 / BLOCK_SIZE as u64;
    let inode_table_blocks = inode_table_blocks(inode_count);
    let data_region_start = INODE_TABLE_START + inode_table_blocks;
    Ok(Geometry {
        total_blocks,
        inode_count,
        inode_table_blocks,
        data_region_start,
        data_region_blocks: total_blocks - data_region_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_geometry() {
        // 180 KiB / 128 inodes is the smallest supported image
        let geo = compute(180, 128).unwrap();
        assert_eq!(geo.total_blocks, 45);
        assert_eq!(geo.inode_table_blocks, 4);
        assert_eq!(geo.data_region_start, 7);
        assert_eq!(geo.data_region_blocks, 38);
    }

    #[test]
    fn test_largest_geometry() {
        let geo = compute(4096, 512).unwrap();
        assert_eq!(geo.total_blocks, 1024);
        assert_eq!(geo.inode_table_blocks, 16);
        assert_eq!(geo.data_region_start, 19);
        assert_eq!(geo.data_region_blocks, 1005);
    }

    #[test]
    fn test_size_out_of_range() {
        assert!(matches!(compute(176, 128), Err(FsError::Validation(_))));
        assert!(matches!(compute(4100, 128), Err(FsError::Validation(_))));
        // in range but not a multiple of 4
        assert!(matches!(compute(181, 128), Err(FsError::Validation(_))));
    }

    #[test]
    fn test_inodes_out_of_range() {
        assert!(matches!(compute(180, 127), Err(FsError::Validation(_))));
        assert!(matches!(compute(180, 513), Err(FsError::Validation(_))));
    }

    #[test]
    fn test_inode_table_blocks_rounds_up() {
        assert_eq!(inode_table_blocks(128), 4);
        // 129 inodes no longer fit in 4 blocks
        assert_eq!(inode_table_blocks(129), 5);
        assert_eq!(inode_table_blocks(512), 16);
    }
}

//! read-only consistency check of an existing image
use std::path::Path;

use log::info;

use crate::fs::{
    FsError, Image, Result, BLOCK_SIZE, DIRENTS_PER_BLOCK, DIRENT_SIZE, DIRENT_TYPE_DIR,
    DIRENT_TYPE_FILE, ROOT_INO,
};

/// verify every checksum and the allocation bookkeeping of an image
///
/// Loading already validates the superblock (magic, version, block size,
/// geometry, CRC); this walks the rest: every allocated inode's CRC, every
/// occupied root entry's checksum and inode reference, every direct pointer
/// against the data bitmap, and the unused bitmap tails.
/// # Return
/// [Ok] if the image is consistent, [FsError::Corrupted] at the first
/// violation
pub fn check<P>(image_path: P) -> Result<()>
where
    P: AsRef<Path>,
{
    let image_path = image_path.as_ref();
    let img = Image::load(image_path)?;
    let geo = img.geometry();

    // bits past the meaningful range must read as zero, they are outside
    // every allocation scan
    let capacity = BLOCK_SIZE * 8;
    if img.inode_bitmap().count_allocated(capacity)
        != img.inode_bitmap().count_allocated(geo.inode_count as usize)
    {
        return Err(FsError::Corrupted(
            "inode bitmap has bits set beyond the inode count".into(),
        ));
    }
    if img.data_bitmap().count_allocated(capacity)
        != img
            .data_bitmap()
            .count_allocated(geo.data_region_blocks as usize)
    {
        return Err(FsError::Corrupted(
            "data bitmap has bits set beyond the data region".into(),
        ));
    }
    if !img.inode_bitmap().test(0) {
        return Err(FsError::Corrupted("root inode not allocated".into()));
    }
    if !img.data_bitmap().test(0) {
        return Err(FsError::Corrupted(
            "root directory block not allocated".into(),
        ));
    }

    let mut used_inodes = 0u64;
    for index in 0..geo.inode_count as usize {
        if !img.inode_bitmap().test(index) {
            continue;
        }
        used_inodes += 1;
        let ino = index as u32 + 1;
        let inode = img.read_inode(ino)?;
        if ino == ROOT_INO {
            if !inode.is_dir() {
                return Err(FsError::Corrupted("root inode is not a directory".into()));
            }
        } else if !inode.is_regular_file() {
            return Err(FsError::Corrupted(format!(
                "inode {ino} is neither the root directory nor a regular file"
            )));
        }
        for block in inode.direct_blocks() {
            let block = block as u64;
            if block < geo.data_region_start || block >= geo.total_blocks {
                return Err(FsError::Corrupted(format!(
                    "inode {ino} points at block {block} outside the data region"
                )));
            }
            if !img
                .data_bitmap()
                .test((block - geo.data_region_start) as usize)
            {
                return Err(FsError::Corrupted(format!(
                    "inode {ino} points at unallocated block {block}"
                )));
            }
        }
    }

    let root = img.read_inode(ROOT_INO)?;
    let dir_block = root.direct[0];
    let mut occupied = 0u64;
    for slot in 0..DIRENTS_PER_BLOCK {
        let entry = img.read_dirent(dir_block, slot)?;
        if entry.is_free() {
            continue;
        }
        occupied += 1;
        if entry.entry_type != DIRENT_TYPE_FILE && entry.entry_type != DIRENT_TYPE_DIR {
            return Err(FsError::Corrupted(format!(
                "directory entry '{}' has unknown type {}",
                String::from_utf8_lossy(entry.name_bytes()),
                entry.entry_type
            )));
        }
        if entry.inode_no as u64 > geo.inode_count
            || !img.inode_bitmap().test(entry.inode_no as usize - 1)
        {
            return Err(FsError::Corrupted(format!(
                "directory entry '{}' references unallocated inode {}",
                String::from_utf8_lossy(entry.name_bytes()),
                entry.inode_no
            )));
        }
        let target = img.read_inode(entry.inode_no)?;
        let type_matches = match entry.entry_type {
            DIRENT_TYPE_DIR => target.is_dir(),
            _ => target.is_regular_file(),
        };
        if !type_matches {
            return Err(FsError::Corrupted(format!(
                "directory entry '{}' type disagrees with inode {}",
                String::from_utf8_lossy(entry.name_bytes()),
                entry.inode_no
            )));
        }
    }
    if root.size_bytes != occupied * DIRENT_SIZE as u64 {
        return Err(FsError::Corrupted(format!(
            "root directory size {} does not match {occupied} occupied entries",
            root.size_bytes
        )));
    }

    let used_blocks = img
        .data_bitmap()
        .count_allocated(geo.data_region_blocks as usize);
    info!("checked '{}': all checksums valid", image_path.display());
    println!(
        "image '{}' OK: {used_inodes}/{} inodes used, {used_blocks}/{} data blocks used, {} root entries",
        image_path.display(),
        geo.inode_count,
        geo.data_region_blocks,
        occupied
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::add::add;
    use crate::build::build;
    use std::path::PathBuf;

    #[test]
    fn test_check_fresh_image() {
        let tmp_file = PathBuf::from("/tmp/minivsfs_check_fresh.img");
        build(&tmp_file, 180, 128).unwrap();
        check(&tmp_file).unwrap();
        std::fs::remove_file(&tmp_file).unwrap();
    }

    #[test]
    fn test_check_after_inserts() {
        let img = PathBuf::from("/tmp/minivsfs_check_inserts.img");
        let file = PathBuf::from("/tmp/minivsfs_check_inserts.dat");
        build(&img, 360, 256).unwrap();
        std::fs::write(&file, vec![7u8; 9000]).unwrap();
        add(&img, &img, &file).unwrap();
        add(&img, &img, &file).unwrap();
        check(&img).unwrap();
        std::fs::remove_file(&img).unwrap();
        std::fs::remove_file(&file).unwrap();
    }

    #[test]
    fn test_check_detects_corrupted_inode() {
        let img = PathBuf::from("/tmp/minivsfs_check_bad_inode.img");
        build(&img, 180, 128).unwrap();
        let mut bytes = std::fs::read(&img).unwrap();
        // flip one bit in the root inode's size field (block 3, offset 12)
        bytes[3 * 4096 + 12] ^= 0x01;
        std::fs::write(&img, &bytes).unwrap();

        assert!(matches!(check(&img), Err(FsError::Corrupted(_))));
        std::fs::remove_file(&img).unwrap();
    }

    #[test]
    fn test_check_detects_corrupted_dirent() {
        let img = PathBuf::from("/tmp/minivsfs_check_bad_dirent.img");
        build(&img, 180, 128).unwrap();
        let mut bytes = std::fs::read(&img).unwrap();
        // first name byte of "." in the root directory block (block 7)
        bytes[7 * 4096 + 5] = b'x';
        std::fs::write(&img, &bytes).unwrap();

        assert!(matches!(check(&img), Err(FsError::Corrupted(_))));
        std::fs::remove_file(&img).unwrap();
    }

    #[test]
    fn test_check_detects_stray_bitmap_bit() {
        let img = PathBuf::from("/tmp/minivsfs_check_stray_bit.img");
        build(&img, 180, 128).unwrap();
        let mut bytes = std::fs::read(&img).unwrap();
        // a bit far past inode_count = 128 in the inode bitmap (block 1)
        bytes[4096 + 100] |= 0x01;
        std::fs::write(&img, &bytes).unwrap();

        assert!(matches!(check(&img), Err(FsError::Corrupted(_))));
        std::fs::remove_file(&img).unwrap();
    }
}

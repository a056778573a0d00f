//! insert one host file into the root directory of an existing image
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use log::{info, warn};

use crate::fs::{
    DirEntry, FsError, Image, Inode, Result, BLOCK_SIZE, DIRENTS_PER_BLOCK, DIRENT_NAME_LEN,
    DIRENT_SIZE, DIRENT_TYPE_FILE, MAX_FILE_SIZE, ROOT_INO,
};
use crate::utils::time_util;

/// copy a host file into an image, giving it the next free inode and the
/// lowest-numbered free data blocks
/// # Params
/// - `input_path`: the image to start from, never modified
/// - `output_path`: where the mutated image is written; may equal
///   `input_path`, in which case the input is replaced only after every
///   step succeeded
/// - `file_path`: the host file; its name (as supplied, truncated to 58
///   bytes) becomes the directory entry name
/// # Return
/// a [Result] to indicate whether the operation is successful
pub fn add<P>(input_path: P, output_path: P, file_path: P) -> Result<()>
where
    P: AsRef<Path>,
{
    let input_path = input_path.as_ref();
    let output_path = output_path.as_ref();
    let file_path = file_path.as_ref();

    let mut img = Image::load(input_path)?;
    let data = std::fs::read(file_path)?;
    if data.len() as u64 > MAX_FILE_SIZE {
        return Err(FsError::FileTooLarge {
            size: data.len() as u64,
            max: MAX_FILE_SIZE,
        });
    }

    let now = time_util::now_epoch();
    let uid = users::get_effective_uid();
    let gid = users::get_effective_gid();

    // all allocation happens in the in-memory copy, so a capacity failure
    // below leaves nothing half-written on disk
    let ino = img.allocate_inode()?;
    let mut inode = Inode::new_regular(uid, gid, data.len() as u64, now);
    for (index, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
        let block = img.allocate_data_block()?;
        inode.add_block(block, index)?;
        img.write_file_block(block, chunk);
    }

    let root = img.read_inode(ROOT_INO)?;
    let dir_block = root.direct[0];
    let name = file_path.as_os_str().as_bytes();
    let name = &name[..name.len().min(DIRENT_NAME_LEN)];
    let slot = find_free_slot(&img, dir_block, name)?;

    let mut entry = DirEntry::new(ino, DIRENT_TYPE_FILE, name);
    img.write_dirent(dir_block, slot, &mut entry);
    img.write_inode(ino, &mut inode);

    let mut root = root;
    root.size_bytes += DIRENT_SIZE as u64;
    img.write_inode(ROOT_INO, &mut root);

    img.touch(now);
    img.save(output_path)?;

    info!(
        "inode {ino} now owns blocks {:?}, root entry slot {slot}",
        inode.direct_blocks()
    );
    println!(
        "added '{}' ({} bytes) as inode {} -> {}",
        file_path.display(),
        data.len(),
        ino,
        output_path.display()
    );
    Ok(())
}

/// first free slot of the root directory block, scanning in order
fn find_free_slot(img: &Image, dir_block: u32, name: &[u8]) -> Result<usize> {
    let mut free = None;
    for slot in 0..DIRENTS_PER_BLOCK {
        let entry = img.read_dirent(dir_block, slot)?;
        if entry.is_free() {
            if free.is_none() {
                free = Some(slot);
            }
        } else if entry.name_bytes() == name {
            // duplicates are legal in this format, but rarely intended
            warn!(
                "root directory already contains an entry named '{}'",
                String::from_utf8_lossy(name)
            );
        }
    }
    free.ok_or(FsError::RootDirFull)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build;
    use std::path::PathBuf;

    fn setup(tag: &str) -> (PathBuf, PathBuf) {
        let img = PathBuf::from(format!("/tmp/minivsfs_add_{tag}.img"));
        let file = PathBuf::from(format!("/tmp/minivsfs_add_{tag}.dat"));
        build(&img, 180, 128).unwrap();
        (img, file)
    }

    fn teardown(img: &PathBuf, file: &PathBuf) {
        std::fs::remove_file(img).unwrap();
        std::fs::remove_file(file).unwrap();
    }

    #[test]
    fn test_add_round_trip() {
        let (img_path, file_path) = setup("round_trip");
        let content: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        std::fs::write(&file_path, &content).unwrap();

        add(&img_path, &img_path, &file_path).unwrap();

        let img = Image::load(&img_path).unwrap();
        let inode = img.read_inode(2).unwrap();
        assert!(inode.is_regular_file());
        assert_eq!(inode.links, 1);
        assert_eq!(inode.size_bytes, 5000);
        // a 5000-byte file needs two blocks; block 7 is the root directory
        assert_eq!(inode.direct_blocks(), vec![8, 9]);

        assert_eq!(&img.block(8)[..], &content[..4096]);
        assert_eq!(&img.block(9)[..5000 - 4096], &content[4096..]);
        // the tail of the last block is zero-filled
        assert!(img.block(9)[5000 - 4096..].iter().all(|&b| b == 0));

        let root = img.read_inode(ROOT_INO).unwrap();
        assert_eq!(root.size_bytes, 3 * DIRENT_SIZE as u64);
        let entry = img.read_dirent(root.direct[0], 2).unwrap();
        assert_eq!(entry.inode_no, 2);
        assert_eq!(entry.entry_type, DIRENT_TYPE_FILE);
        assert_eq!(entry.name_bytes(), file_path.as_os_str().as_bytes());

        teardown(&img_path, &file_path);
    }

    #[test]
    fn test_add_into_separate_output() {
        let (input, file_path) = setup("separate_output");
        let output = PathBuf::from("/tmp/minivsfs_add_separate_output.out.img");
        std::fs::write(&file_path, b"hello").unwrap();
        let before = std::fs::read(&input).unwrap();

        add(&input, &output, &file_path).unwrap();

        // the input image is never modified
        assert_eq!(std::fs::read(&input).unwrap(), before);
        let img = Image::load(&output).unwrap();
        assert_eq!(img.read_inode(2).unwrap().size_bytes, 5);

        std::fs::remove_file(&output).unwrap();
        teardown(&input, &file_path);
    }

    #[test]
    fn test_add_empty_file() {
        let (img_path, file_path) = setup("empty_file");
        std::fs::write(&file_path, b"").unwrap();

        add(&img_path, &img_path, &file_path).unwrap();

        let img = Image::load(&img_path).unwrap();
        let inode = img.read_inode(2).unwrap();
        assert_eq!(inode.size_bytes, 0);
        assert!(inode.direct_blocks().is_empty());
        // no data block was consumed
        assert_eq!(img.data_bitmap().count_allocated(38), 1);

        teardown(&img_path, &file_path);
    }

    #[test]
    fn test_add_max_size_boundary() {
        let (img_path, file_path) = setup("max_size");
        std::fs::write(&file_path, vec![0x5A; 12 * 4096]).unwrap();
        add(&img_path, &img_path, &file_path).unwrap();
        let img = Image::load(&img_path).unwrap();
        let inode = img.read_inode(2).unwrap();
        assert_eq!(inode.size_bytes, 12 * 4096);
        assert_eq!(inode.direct_blocks().len(), 12);

        // one byte over the direct-pointer cap is rejected up front
        let before = std::fs::read(&img_path).unwrap();
        std::fs::write(&file_path, vec![0x5A; 12 * 4096 + 1]).unwrap();
        assert!(matches!(
            add(&img_path, &img_path, &file_path),
            Err(FsError::FileTooLarge { .. })
        ));
        assert_eq!(std::fs::read(&img_path).unwrap(), before);

        teardown(&img_path, &file_path);
    }

    #[test]
    fn test_add_until_root_directory_full() {
        let (img_path, file_path) = setup("root_full");
        std::fs::write(&file_path, b"").unwrap();

        // "." and ".." occupy two of the 64 slots
        for _ in 0..62 {
            add(&img_path, &img_path, &file_path).unwrap();
        }
        let before = std::fs::read(&img_path).unwrap();
        assert!(matches!(
            add(&img_path, &img_path, &file_path),
            Err(FsError::RootDirFull)
        ));
        assert_eq!(std::fs::read(&img_path).unwrap(), before);

        teardown(&img_path, &file_path);
    }

    #[test]
    fn test_add_until_data_blocks_exhausted() {
        let (img_path, file_path) = setup("blocks_exhausted");
        // 38 data blocks, 1 taken by the root directory; three 12-block
        // files leave a single free block
        std::fs::write(&file_path, vec![1u8; 12 * 4096]).unwrap();
        for _ in 0..3 {
            add(&img_path, &img_path, &file_path).unwrap();
        }
        let before = std::fs::read(&img_path).unwrap();
        std::fs::write(&file_path, vec![1u8; 2 * 4096]).unwrap();
        assert!(matches!(
            add(&img_path, &img_path, &file_path),
            Err(FsError::NoFreeDataBlock)
        ));
        // the failed insertion rolled back entirely
        assert_eq!(std::fs::read(&img_path).unwrap(), before);

        teardown(&img_path, &file_path);
    }

    #[test]
    fn test_add_assigns_lowest_free_numbers() {
        let (img_path, file_path) = setup("determinism");
        std::fs::write(&file_path, vec![2u8; 4096 + 1]).unwrap();

        add(&img_path, &img_path, &file_path).unwrap();
        add(&img_path, &img_path, &file_path).unwrap();

        let img = Image::load(&img_path).unwrap();
        assert_eq!(img.read_inode(2).unwrap().direct_blocks(), vec![8, 9]);
        assert_eq!(img.read_inode(3).unwrap().direct_blocks(), vec![10, 11]);

        teardown(&img_path, &file_path);
    }

    #[test]
    fn test_add_truncates_long_name() {
        let (img_path, _) = setup("long_name");
        let file_path = PathBuf::from(format!("/tmp/minivsfs_{}", "n".repeat(80)));
        std::fs::write(&file_path, b"x").unwrap();

        add(&img_path, &img_path, &file_path).unwrap();

        let img = Image::load(&img_path).unwrap();
        let entry = img.read_dirent(7, 2).unwrap();
        let expected = &file_path.as_os_str().as_bytes()[..DIRENT_NAME_LEN];
        assert_eq!(entry.name_bytes(), expected);

        std::fs::remove_file(&img_path).unwrap();
        std::fs::remove_file(&file_path).unwrap();
    }
}

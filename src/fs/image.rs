//! what a MiniVSFS image looks like in memory

use std::fs::OpenOptions;
use std::path::Path;

use log::debug;
use memmap2::Mmap;

use crate::fs::{
    Bitmap, DirEntry, FsError, Inode, Result, SuperBlock, BLOCK_SIZE, DIRENTS_PER_BLOCK,
    DIRENT_SIZE, DIRENT_TYPE_DIR, INODE_SIZE, ROOT_INO,
};
use crate::utils::geometry::Geometry;

/// One whole image held in memory.
///
/// The buffer is exclusively owned for the duration of an operation; every
/// structure access goes through offset-based decode/encode, never through
/// reinterpretation of the buffer as typed views. Mutations stay in memory
/// until [save](Image::save), so a failed operation leaves the on-disk
/// input untouched.
#[derive(Debug)]
pub struct Image {
    superblock: SuperBlock,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    buf: Vec<u8>,
}

impl Image {
    /// lay out a fresh, empty filesystem: superblock, bitmaps with the root
    /// allocations, root inode, and a root directory holding "." and ".."
    pub fn format(geo: &Geometry, uid: u32, gid: u32, now: u64) -> Image {
        let superblock = SuperBlock::new(geo, now);
        let mut inode_bitmap = Bitmap::new();
        inode_bitmap.set(0); // root inode
        let mut data_bitmap = Bitmap::new();
        data_bitmap.set(0); // root directory block

        let mut img = Image {
            superblock,
            inode_bitmap,
            data_bitmap,
            buf: vec![0u8; geo.total_blocks as usize * BLOCK_SIZE],
        };

        let mut root = Inode::new_directory(uid, gid, now);
        root.size_bytes = 2 * DIRENT_SIZE as u64;
        root.direct[0] = geo.data_region_start as u32;
        img.write_inode(ROOT_INO, &mut root);

        let root_block = root.direct[0];
        let mut dot = DirEntry::new(ROOT_INO, DIRENT_TYPE_DIR, b".");
        let mut dotdot = DirEntry::new(ROOT_INO, DIRENT_TYPE_DIR, b"..");
        img.write_dirent(root_block, 0, &mut dot);
        img.write_dirent(root_block, 1, &mut dotdot);
        img
    }

    /// read an existing image into memory, validating the superblock and
    /// its geometry against the file before trusting anything else
    pub fn load<P>(path: P) -> Result<Image>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new().read(true).open(path.as_ref())?;
        // Safety
        // This method returns an error when the underlying system call fails.
        // The map is read-only and dropped as soon as the buffer is copied.
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < BLOCK_SIZE {
            return Err(FsError::Corrupted("image smaller than one block".into()));
        }
        let superblock = SuperBlock::deserialize_from(&mmap[..BLOCK_SIZE])?;

        let expected_len = superblock.total_blocks.checked_mul(BLOCK_SIZE as u64);
        if expected_len != Some(mmap.len() as u64) {
            return Err(FsError::Corrupted(format!(
                "file is {} bytes but the superblock describes {} blocks",
                mmap.len(),
                superblock.total_blocks
            )));
        }
        if superblock.root_inode != ROOT_INO as u64 {
            return Err(FsError::Corrupted(format!(
                "root inode must be {ROOT_INO}, found {}",
                superblock.root_inode
            )));
        }
        // every other region position comes from the superblock, so its
        // fields are validated before any of them is used as an offset
        if superblock
            .inode_table_start
            .checked_add(superblock.inode_table_blocks)
            != Some(superblock.data_region_start)
            || superblock
                .data_region_start
                .checked_add(superblock.data_region_blocks)
                != Some(superblock.total_blocks)
        {
            return Err(FsError::Corrupted("inconsistent region geometry".into()));
        }
        if superblock.inode_bitmap_start >= superblock.total_blocks
            || superblock.data_bitmap_start >= superblock.total_blocks
        {
            return Err(FsError::Corrupted("bitmap block out of bounds".into()));
        }
        // each bitmap is a single block, so its bit capacity bounds the counts
        if superblock.inode_bitmap_blocks != 1
            || superblock.data_bitmap_blocks != 1
            || superblock.inode_count > (BLOCK_SIZE * 8) as u64
            || superblock.data_region_blocks > (BLOCK_SIZE * 8) as u64
        {
            return Err(FsError::Corrupted("bitmap capacity exceeded".into()));
        }
        if superblock.inode_count * INODE_SIZE as u64
            > superblock.inode_table_blocks * BLOCK_SIZE as u64
        {
            return Err(FsError::Corrupted(
                "inode table too small for inode count".into(),
            ));
        }

        let buf = mmap.to_vec();
        let inode_bitmap = Bitmap::from_block(block_of(&buf, superblock.inode_bitmap_start));
        let data_bitmap = Bitmap::from_block(block_of(&buf, superblock.data_bitmap_start));
        Ok(Image {
            superblock,
            inode_bitmap,
            data_bitmap,
            buf,
        })
    }

    /// flush the in-memory metadata into the buffer and write the whole
    /// image to `path` in one pass
    pub fn save<P>(&mut self, path: P) -> Result<()>
    where
        P: AsRef<Path>,
    {
        let ibm_offset = self.superblock.inode_bitmap_start as usize * BLOCK_SIZE;
        self.buf[ibm_offset..ibm_offset + BLOCK_SIZE]
            .copy_from_slice(self.inode_bitmap.as_raw_slice());
        let dbm_offset = self.superblock.data_bitmap_start as usize * BLOCK_SIZE;
        self.buf[dbm_offset..dbm_offset + BLOCK_SIZE]
            .copy_from_slice(self.data_bitmap.as_raw_slice());
        self.superblock
            .serialize_into(&mut self.buf[..BLOCK_SIZE]);
        std::fs::write(path, &self.buf)?;
        Ok(())
    }

    #[inline]
    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    #[inline]
    pub fn inode_bitmap(&self) -> &Bitmap {
        &self.inode_bitmap
    }

    #[inline]
    pub fn data_bitmap(&self) -> &Bitmap {
        &self.data_bitmap
    }

    #[inline]
    pub fn geometry(&self) -> Geometry {
        self.superblock.geometry()
    }

    /// the raw image bytes as they would be written, metadata flushes aside
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// bump the superblock modify timestamp; the checksum is refreshed when
    /// the block is encoded at save time
    pub fn touch(&mut self, now: u64) {
        self.superblock.mtime_epoch = now;
    }
}

/// inode and data block allocation
impl Image {
    /// first-fit scan of the inode bitmap over `[0, inode_count)`
    /// # Return
    /// the allocated inode number (1-based)
    pub fn allocate_inode(&mut self) -> Result<u32> {
        let index = self
            .inode_bitmap
            .first_free(self.superblock.inode_count as usize)
            .ok_or(FsError::NoFreeInode)?;
        self.inode_bitmap.set(index);
        debug!("allocated inode {}", index + 1);
        Ok(index as u32 + 1)
    }

    /// first-fit scan of the data bitmap over `[0, data_region_blocks)`
    /// # Return
    /// the allocated absolute block number
    pub fn allocate_data_block(&mut self) -> Result<u32> {
        let relative = self
            .data_bitmap
            .first_free(self.superblock.data_region_blocks as usize)
            .ok_or(FsError::NoFreeDataBlock)?;
        self.data_bitmap.set(relative);
        let absolute = self.superblock.data_region_start as u32 + relative as u32;
        debug!("allocated data block {absolute} (relative {relative})");
        Ok(absolute)
    }
}

/// inode table access, 1-based inode numbers
impl Image {
    fn inode_slot(&self, ino: u32) -> Result<usize> {
        if ino < 1 || ino as u64 > self.superblock.inode_count {
            return Err(FsError::Corrupted(format!(
                "inode number {ino} out of range"
            )));
        }
        let offset = self.superblock.inode_table_start as usize * BLOCK_SIZE
            + (ino as usize - 1) * INODE_SIZE;
        Ok(offset)
    }

    /// decode one occupied inode, verifying its CRC
    pub fn read_inode(&self, ino: u32) -> Result<Inode> {
        let offset = self.inode_slot(ino)?;
        Inode::deserialize_from(&self.buf[offset..offset + INODE_SIZE])
    }

    /// encode `inode` into its table slot, refreshing its CRC
    pub fn write_inode(&mut self, ino: u32, inode: &mut Inode) {
        let offset = self
            .inode_slot(ino)
            .expect("inode number validated by the caller");
        inode.serialize_into(&mut self.buf[offset..offset + INODE_SIZE]);
    }
}

/// directory block access
impl Image {
    fn dirent_offset(&self, block: u32, slot: usize) -> Result<usize> {
        assert!(slot < DIRENTS_PER_BLOCK);
        if (block as u64) < self.superblock.data_region_start
            || block as u64 >= self.superblock.total_blocks
        {
            return Err(FsError::Corrupted(format!(
                "directory block {block} outside the data region"
            )));
        }
        Ok(block as usize * BLOCK_SIZE + slot * DIRENT_SIZE)
    }

    pub fn read_dirent(&self, block: u32, slot: usize) -> Result<DirEntry> {
        let offset = self.dirent_offset(block, slot)?;
        DirEntry::deserialize_from(&self.buf[offset..offset + DIRENT_SIZE])
    }

    pub fn write_dirent(&mut self, block: u32, slot: usize, entry: &mut DirEntry) {
        let offset = self
            .dirent_offset(block, slot)
            .expect("directory block validated by the caller");
        entry.serialize_into(&mut self.buf[offset..offset + DIRENT_SIZE]);
    }
}

/// data block access
impl Image {
    /// zero `block` and copy `data` into its head; the unused tail of a
    /// partially-filled block never leaks prior content
    pub fn write_file_block(&mut self, block: u32, data: &[u8]) {
        assert!(data.len() <= BLOCK_SIZE);
        let slice = self.block_mut(block as u64);
        slice.fill(0);
        slice[..data.len()].copy_from_slice(data);
    }

    pub fn block(&self, number: u64) -> &[u8] {
        assert!(number < self.superblock.total_blocks);
        let offset = number as usize * BLOCK_SIZE;
        &self.buf[offset..offset + BLOCK_SIZE]
    }

    fn block_mut(&mut self, number: u64) -> &mut [u8] {
        assert!(number < self.superblock.total_blocks);
        let offset = number as usize * BLOCK_SIZE;
        &mut self.buf[offset..offset + BLOCK_SIZE]
    }
}

fn block_of(buf: &[u8], number: u64) -> &[u8] {
    let offset = number as usize * BLOCK_SIZE;
    &buf[offset..offset + BLOCK_SIZE]
}

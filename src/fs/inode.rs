use crate::fs::codec::{get_u16, get_u32, get_u64, put_u16, put_u32, put_u64};
use crate::fs::{FsError, Result, DIRECT_MAX, INODE_SIZE, MAX_FILE_SIZE};
use crate::utils::checksum::crc32;
use crate::utils::traits::ChecksumInSelf;

const OFF_MODE: usize = 0;
const OFF_LINKS: usize = 2;
const OFF_UID: usize = 4;
const OFF_GID: usize = 8;
const OFF_SIZE_BYTES: usize = 12;
const OFF_ATIME: usize = 20;
const OFF_MTIME: usize = 28;
const OFF_CTIME: usize = 36;
const OFF_DIRECT: usize = 44;
const OFF_RESERVED: usize = 92;
const OFF_PROJ_ID: usize = 104;
const OFF_UID16_GID16: usize = 108;
const OFF_XATTR_PTR: usize = 112;
const OFF_INODE_CRC: usize = 120;

/// bytes covered by the inode CRC; the trailing 8-byte CRC field is outside
const CRC_COVERAGE: usize = 120;

pub const MODE_DIR: u16 = libc::S_IFDIR as u16;
pub const MODE_FILE: u16 = libc::S_IFREG as u16;

/// One fixed 128-byte inode table entry. Table slot `i` holds inode number
/// `i + 1`; slot 0 is permanently the root directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inode {
    pub mode: u16,
    pub links: u16,
    pub uid: u32,
    pub gid: u32,
    pub size_bytes: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    /// absolute block numbers in allocation order, 0 = unused slot
    pub direct: [u32; DIRECT_MAX],
    pub reserved: [u32; 3],
    pub proj_id: u32,
    pub uid16_gid16: u32,
    pub xattr_ptr: u64,
    /// CRC-32 of the first 120 encoded bytes, zero-extended to 64 bits
    pub inode_crc: u64,
}

impl Inode {
    pub fn new_directory(uid: u32, gid: u32, now: u64) -> Self {
        let mut inode = Inode {
            mode: MODE_DIR,
            links: 2,
            uid,
            gid,
            atime: now,
            mtime: now,
            ctime: now,
            ..Inode::default()
        };
        inode.finalize_checksum();
        inode
    }

    pub fn new_regular(uid: u32, gid: u32, size_bytes: u64, now: u64) -> Self {
        let mut inode = Inode {
            mode: MODE_FILE,
            links: 1,
            uid,
            gid,
            size_bytes,
            atime: now,
            mtime: now,
            ctime: now,
            ..Inode::default()
        };
        inode.finalize_checksum();
        inode
    }

    pub fn is_dir(&self) -> bool {
        self.mode & libc::S_IFMT as u16 == MODE_DIR
    }

    pub fn is_regular_file(&self) -> bool {
        self.mode & libc::S_IFMT as u16 == MODE_FILE
    }

    /// the occupied direct pointers, in allocation order
    pub fn direct_blocks(&self) -> Vec<u32> {
        self.direct.iter().copied().filter(|&b| b != 0).collect()
    }

    /// record `block` as the `index`-th data block of this file
    pub fn add_block(&mut self, block: u32, index: usize) -> Result<()> {
        if index >= self.direct.len() {
            return Err(FsError::FileTooLarge {
                size: self.size_bytes,
                max: MAX_FILE_SIZE,
            });
        }
        self.direct[index] = block;
        Ok(())
    }

    fn encode(&self) -> [u8; INODE_SIZE] {
        let mut buf = [0u8; INODE_SIZE];
        put_u16(&mut buf, OFF_MODE, self.mode);
        put_u16(&mut buf, OFF_LINKS, self.links);
        put_u32(&mut buf, OFF_UID, self.uid);
        put_u32(&mut buf, OFF_GID, self.gid);
        put_u64(&mut buf, OFF_SIZE_BYTES, self.size_bytes);
        put_u64(&mut buf, OFF_ATIME, self.atime);
        put_u64(&mut buf, OFF_MTIME, self.mtime);
        put_u64(&mut buf, OFF_CTIME, self.ctime);
        for (i, &block) in self.direct.iter().enumerate() {
            put_u32(&mut buf, OFF_DIRECT + 4 * i, block);
        }
        for (i, &r) in self.reserved.iter().enumerate() {
            put_u32(&mut buf, OFF_RESERVED + 4 * i, r);
        }
        put_u32(&mut buf, OFF_PROJ_ID, self.proj_id);
        put_u32(&mut buf, OFF_UID16_GID16, self.uid16_gid16);
        put_u64(&mut buf, OFF_XATTR_PTR, self.xattr_ptr);
        put_u64(&mut buf, OFF_INODE_CRC, self.inode_crc);
        buf
    }

    /// encode into one inode table slot, refreshing the CRC first
    pub fn serialize_into(&mut self, buf: &mut [u8]) {
        assert_eq!(buf.len(), INODE_SIZE);
        self.finalize_checksum();
        buf.copy_from_slice(&self.encode());
    }

    /// decode one occupied inode table slot, verifying the CRC.
    ///
    /// Free slots are all zero and do not carry a valid CRC; callers must
    /// consult the inode bitmap before decoding.
    pub fn deserialize_from(buf: &[u8]) -> Result<Self> {
        assert_eq!(buf.len(), INODE_SIZE);
        let mut direct = [0u32; DIRECT_MAX];
        for (i, slot) in direct.iter_mut().enumerate() {
            *slot = get_u32(buf, OFF_DIRECT + 4 * i);
        }
        let inode = Inode {
            mode: get_u16(buf, OFF_MODE),
            links: get_u16(buf, OFF_LINKS),
            uid: get_u32(buf, OFF_UID),
            gid: get_u32(buf, OFF_GID),
            size_bytes: get_u64(buf, OFF_SIZE_BYTES),
            atime: get_u64(buf, OFF_ATIME),
            mtime: get_u64(buf, OFF_MTIME),
            ctime: get_u64(buf, OFF_CTIME),
            direct,
            reserved: [
                get_u32(buf, OFF_RESERVED),
                get_u32(buf, OFF_RESERVED + 4),
                get_u32(buf, OFF_RESERVED + 8),
            ],
            proj_id: get_u32(buf, OFF_PROJ_ID),
            uid16_gid16: get_u32(buf, OFF_UID16_GID16),
            xattr_ptr: get_u64(buf, OFF_XATTR_PTR),
            inode_crc: get_u64(buf, OFF_INODE_CRC),
        };
        let computed = crc32(&buf[..CRC_COVERAGE]) as u64;
        if computed != inode.inode_crc {
            return Err(FsError::Corrupted(format!(
                "inode checksum mismatch: stored 0x{:016X}, computed 0x{computed:016X}",
                inode.inode_crc
            )));
        }
        Ok(inode)
    }
}

impl ChecksumInSelf for Inode {
    fn finalize_checksum(&mut self) {
        let raw = self.encode();
        self.inode_crc = crc32(&raw[..CRC_COVERAGE]) as u64;
    }

    fn verify_checksum(&self) -> bool {
        let raw = self.encode();
        crc32(&raw[..CRC_COVERAGE]) as u64 == self.inode_crc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_directory_inode() {
        let inode = Inode::new_directory(1000, 1000, 1_700_000_000);
        assert!(inode.is_dir());
        assert!(!inode.is_regular_file());
        assert_eq!(inode.mode, 0o040000);
        assert_eq!(inode.links, 2);
        assert!(inode.verify_checksum());
    }

    #[test]
    fn test_new_regular_inode() {
        let inode = Inode::new_regular(0, 0, 5000, 1_700_000_000);
        assert!(inode.is_regular_file());
        assert_eq!(inode.mode, 0o100000);
        assert_eq!(inode.links, 1);
        assert_eq!(inode.size_bytes, 5000);
    }

    #[test]
    fn test_field_offsets() {
        let mut inode = Inode::new_regular(7, 8, 0x0102_0304, 0xAABB_CCDD);
        inode.direct[0] = 9;
        inode.direct[11] = 10;
        let mut buf = [0u8; INODE_SIZE];
        inode.serialize_into(&mut buf);
        assert_eq!(get_u16(&buf, 0), 0o100000);
        assert_eq!(get_u16(&buf, 2), 1);
        assert_eq!(get_u32(&buf, 4), 7);
        assert_eq!(get_u32(&buf, 8), 8);
        assert_eq!(get_u64(&buf, 12), 0x0102_0304);
        assert_eq!(get_u64(&buf, 20), 0xAABB_CCDD);
        assert_eq!(get_u32(&buf, 44), 9);
        assert_eq!(get_u32(&buf, 44 + 4 * 11), 10);
        assert_eq!(get_u64(&buf, 120), inode.inode_crc);
        // the CRC is a 32-bit value zero-extended into the u64 field
        assert_eq!(inode.inode_crc >> 32, 0);
    }

    #[test]
    fn test_round_trip() {
        let mut inode = Inode::new_regular(1000, 100, 12345, 1_700_000_000);
        inode.direct[0] = 7;
        inode.direct[1] = 8;
        let mut buf = [0u8; INODE_SIZE];
        inode.serialize_into(&mut buf);
        let reread = Inode::deserialize_from(&buf).unwrap();
        assert_eq!(reread, inode);
        assert_eq!(reread.direct_blocks(), vec![7, 8]);
    }

    #[test]
    fn test_decode_rejects_corrupted() {
        let mut inode = Inode::new_regular(0, 0, 1, 1);
        let mut buf = [0u8; INODE_SIZE];
        inode.serialize_into(&mut buf);
        buf[12] ^= 0x01; // size_bytes
        assert!(matches!(
            Inode::deserialize_from(&buf),
            Err(FsError::Corrupted(_))
        ));
    }

    #[test]
    fn test_add_block_bounds() {
        let mut inode = Inode::new_regular(0, 0, 0, 0);
        for i in 0..DIRECT_MAX {
            inode.add_block(100 + i as u32, i).unwrap();
        }
        assert!(matches!(
            inode.add_block(200, DIRECT_MAX),
            Err(FsError::FileTooLarge { .. })
        ));
    }
}

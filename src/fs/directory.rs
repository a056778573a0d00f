use crate::fs::codec::{get_u32, put_u32};
use crate::fs::{FsError, Result, DIRENT_SIZE};
use crate::utils::checksum::xor8;
use crate::utils::traits::ChecksumInSelf;

pub const DIRENT_NAME_LEN: usize = 58;
pub const DIRENT_TYPE_FILE: u8 = 1;
pub const DIRENT_TYPE_DIR: u8 = 2;

/// One fixed 64-byte directory entry. `inode_no == 0` marks a free slot;
/// valid inode numbers start at 1 and are stored explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub inode_no: u32,
    pub entry_type: u8,
    /// fixed-length byte field, null-padded, not necessarily
    /// null-terminated when the name fills all 58 bytes
    pub name: [u8; DIRENT_NAME_LEN],
    /// XOR of the first 63 encoded bytes
    pub checksum: u8,
}

impl Default for DirEntry {
    fn default() -> Self {
        DirEntry {
            inode_no: 0,
            entry_type: 0,
            name: [0; DIRENT_NAME_LEN],
            checksum: 0,
        }
    }
}

impl DirEntry {
    /// build a checksummed entry; `name` is truncated to 58 bytes
    pub fn new(inode_no: u32, entry_type: u8, name: &[u8]) -> Self {
        let mut entry = DirEntry {
            inode_no,
            entry_type,
            ..DirEntry::default()
        };
        let len = name.len().min(DIRENT_NAME_LEN);
        entry.name[..len].copy_from_slice(&name[..len]);
        entry.finalize_checksum();
        entry
    }

    pub fn is_free(&self) -> bool {
        self.inode_no == 0
    }

    /// the stored name bytes, up to the first null or the full 58 bytes
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DIRENT_NAME_LEN);
        &self.name[..len]
    }

    fn encode(&self) -> [u8; DIRENT_SIZE] {
        let mut buf = [0u8; DIRENT_SIZE];
        put_u32(&mut buf, 0, self.inode_no);
        buf[4] = self.entry_type;
        buf[5..5 + DIRENT_NAME_LEN].copy_from_slice(&self.name);
        buf[DIRENT_SIZE - 1] = self.checksum;
        buf
    }

    /// encode into one directory slot, refreshing the checksum first
    pub fn serialize_into(&mut self, buf: &mut [u8]) {
        assert_eq!(buf.len(), DIRENT_SIZE);
        self.finalize_checksum();
        buf.copy_from_slice(&self.encode());
    }

    /// decode one directory slot.
    ///
    /// Free slots (inode number 0) are returned as-is without checksum
    /// verification; occupied slots must verify.
    pub fn deserialize_from(buf: &[u8]) -> Result<Self> {
        assert_eq!(buf.len(), DIRENT_SIZE);
        let mut name = [0u8; DIRENT_NAME_LEN];
        name.copy_from_slice(&buf[5..5 + DIRENT_NAME_LEN]);
        let entry = DirEntry {
            inode_no: get_u32(buf, 0),
            entry_type: buf[4],
            name,
            checksum: buf[DIRENT_SIZE - 1],
        };
        if !entry.is_free() && !entry.verify_checksum() {
            return Err(FsError::Corrupted(format!(
                "directory entry checksum mismatch for inode {}",
                entry.inode_no
            )));
        }
        Ok(entry)
    }
}

impl ChecksumInSelf for DirEntry {
    fn finalize_checksum(&mut self) {
        let raw = self.encode();
        self.checksum = xor8(&raw[..DIRENT_SIZE - 1]);
    }

    fn verify_checksum(&self) -> bool {
        let raw = self.encode();
        xor8(&raw[..DIRENT_SIZE - 1]) == self.checksum
    }
}

use bitvec::prelude::*;

use crate::fs::BLOCK_SIZE;

/// One allocation bitmap, always exactly one block long regardless of how
/// many bits are meaningful. Bit `i` lives at weight `1 << (i & 7)` of byte
/// `i >> 3`, bit set = allocated. Callers bound every scan by the real
/// element count so the unused high bits never get allocated.
#[derive(Debug, Clone)]
pub struct Bitmap {
    bits: BitVec<u8, Lsb0>,
}

impl Bitmap {
    /// a fresh all-free bitmap
    pub fn new() -> Self {
        Bitmap {
            bits: BitVec::repeat(false, BLOCK_SIZE * 8),
        }
    }

    /// rebuild a bitmap from its on-disk block
    pub fn from_block(block: &[u8]) -> Self {
        assert_eq!(block.len(), BLOCK_SIZE);
        Bitmap {
            bits: BitVec::from_slice(block),
        }
    }

    /// mark `index` allocated, idempotent
    pub fn set(&mut self, index: usize) {
        self.bits.set(index, true);
    }

    /// check allocation state of `index`
    pub fn test(&self, index: usize) -> bool {
        self.bits.get(index).as_deref().copied().unwrap_or(false)
    }

    /// first free index in `[0, limit)`, ascending, or [None] if exhausted
    pub fn first_free(&self, limit: usize) -> Option<usize> {
        let limit = limit.min(self.bits.len());
        self.bits[..limit].first_zero()
    }

    /// number of allocated entries in `[0, limit)`
    pub fn count_allocated(&self, limit: usize) -> usize {
        let limit = limit.min(self.bits.len());
        self.bits[..limit].count_ones()
    }

    /// the raw block bytes, for writing back into the image
    pub fn as_raw_slice(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_bitmap_is_all_free() {
        let bm = Bitmap::new();
        assert_eq!(bm.as_raw_slice().len(), BLOCK_SIZE);
        assert_eq!(bm.first_free(BLOCK_SIZE * 8), Some(0));
        assert_eq!(bm.count_allocated(BLOCK_SIZE * 8), 0);
    }

    #[test]
    fn test_set_and_test() {
        let mut bm = Bitmap::new();
        assert!(!bm.test(0));
        bm.set(0);
        assert!(bm.test(0));
        // idempotent
        bm.set(0);
        assert!(bm.test(0));
        assert!(!bm.test(1));
    }

    #[test]
    fn test_first_free_skips_allocated_prefix() {
        let mut bm = Bitmap::new();
        // test if free space is at the beginning
        assert_eq!(bm.first_free(16), Some(0));
        bm.set(0);
        bm.set(1);
        bm.set(2);
        // test if free space is in the middle
        assert_eq!(bm.first_free(16), Some(3));
        bm.set(3);
        bm.set(4);
        assert_eq!(bm.first_free(16), Some(5));
    }

    #[test]
    fn test_first_free_respects_limit() {
        let mut bm = Bitmap::new();
        for i in 0..8 {
            bm.set(i);
        }
        // bit 8 is free but lies beyond the limit
        assert_eq!(bm.first_free(8), None);
        assert_eq!(bm.first_free(9), Some(8));
    }

    #[test]
    fn test_round_trip_through_block() {
        let mut bm = Bitmap::new();
        bm.set(0);
        bm.set(9);
        let raw = bm.as_raw_slice().to_vec();
        // bit 0 -> byte 0 bit 0, bit 9 -> byte 1 bit 1
        assert_eq!(raw[0], 0b0000_0001);
        assert_eq!(raw[1], 0b0000_0010);
        let reread = Bitmap::from_block(&raw);
        assert!(reread.test(0));
        assert!(reread.test(9));
        assert!(!reread.test(1));
        assert_eq!(reread.first_free(16), Some(1));
    }
}

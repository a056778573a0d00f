//! CRC-32 and the one-byte XOR checksum used by directory entries.

use once_cell::sync::Lazy;

/// reflected form of the standard 0x04C11DB7 polynomial
const CRC32_POLYNOMIAL: u32 = 0xEDB8_8320;

/// lookup table, a pure function of the polynomial
static CRC32_TABLE: Lazy<[u32; 256]> = Lazy::new(|| {
    let mut table = [0u32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut c = i as u32;
        for _ in 0..8 {
            c = if c & 1 != 0 {
                CRC32_POLYNOMIAL ^ (c >> 1)
            } else {
                c >> 1
            };
        }
        *entry = c;
    }
    table
});

/// calculate the CRC-32 of `data`
/// # Params
/// - `data`: the bytes to checksum
/// # Return
/// the reflected CRC-32 with initial and final XOR of all ones
pub fn crc32(data: &[u8]) -> u32 {
    let mut c = 0xFFFF_FFFFu32;
    for &byte in data {
        c = CRC32_TABLE[((c ^ byte as u32) & 0xFF) as usize] ^ (c >> 8);
    }
    c ^ 0xFFFF_FFFF
}

/// XOR of all bytes in `data`, used as the one-byte dirent checksum
pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

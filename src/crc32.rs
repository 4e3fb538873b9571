use crate::crc32_tables::{CRC32_SLICE1_TABLE, CRC32_SLICE8_TABLE};

pub fn crc32_slice1(mut crc: u32, p: &[u8]) -> u32 {
    for &b in p {
        crc = (crc >> 8) ^ CRC32_SLICE1_TABLE[((crc ^ b as u32) & 0xFF) as usize];
    }
    crc
}

pub fn crc32_slice8(mut crc: u32, p: &[u8]) -> u32 {
    let mut chunks = p.chunks_exact(8);
    for chunk in &mut chunks {
        let lo = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ crc;
        let hi = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);

        crc = CRC32_SLICE8_TABLE[0x700 + (lo & 0xFF) as usize]
            ^ CRC32_SLICE8_TABLE[0x600 + ((lo >> 8) & 0xFF) as usize]
            ^ CRC32_SLICE8_TABLE[0x500 + ((lo >> 16) & 0xFF) as usize]
            ^ CRC32_SLICE8_TABLE[0x400 + (lo >> 24) as usize]
            ^ CRC32_SLICE8_TABLE[0x300 + (hi & 0xFF) as usize]
            ^ CRC32_SLICE8_TABLE[0x200 + ((hi >> 8) & 0xFF) as usize]
            ^ CRC32_SLICE8_TABLE[0x100 + ((hi >> 16) & 0xFF) as usize]
            ^ CRC32_SLICE8_TABLE[(hi >> 24) as usize];
    }
    crc32_slice1(crc, chunks.remainder())
}

/// Continuation-style CRC-32: pass 0 to start, the previous return value
/// to extend.
pub fn crc32(crc: u32, p: &[u8]) -> u32 {
    !crc32_slice8(!crc, p)
}

#[cfg(test)]
mod tests {
    use super::{crc32, crc32_slice1};

    #[test]
    fn known_values() {
        assert_eq!(crc32(0, &[]), 0);
        assert_eq!(crc32(0, b"Hello, World!"), 0xEC4AC3D0);
        assert_eq!(crc32(0, b"123456789"), 0xCBF43926);

        let data: Vec<u8> = (0..100u32).map(|i| i as u8).collect();
        assert_eq!(crc32(0, &data), 1489580789);
    }

    #[test]
    fn slice8_matches_slice1() {
        let data: Vec<u8> = (0..4099u32).map(|i| (i * 17 % 253) as u8).collect();
        let a = !crc32_slice1(!0, &data);
        let b = crc32(0, &data);
        assert_eq!(a, b);
    }

    #[test]
    fn chunked_equals_whole() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let whole = crc32(0, &data);
        let mut partial = 0;
        for piece in data.chunks(123) {
            partial = crc32(partial, piece);
        }
        assert_eq!(whole, partial);
    }
}

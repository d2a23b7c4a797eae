use std::sync::OnceLock;

const POLY: u32 = 0xEDB88320;

/// Returns the CRC32 (IEEE) checksum of `buf`.
pub fn crc32(buf: &[u8]) -> u32 {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();

    let tab = TABLE.get_or_init(make_table);

    let mut crc: u32 = !0;
    for &b in buf {
        crc = tab[((crc as u8) ^ b) as usize] ^ (crc >> 8);
    }
    !crc
}

fn make_table() -> [u32; 256] {
    let mut tab = [0; 256];
    for i in 0u32..256u32 {
        let mut crc = i;
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
        tab[i as usize] = crc;
    }
    tab
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_empty() {
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_crc32_check_value() {
        // Standard CRC-32/ISO-HDLC check value.
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_crc32_different_inputs() {
        assert_ne!(crc32(b"input1"), crc32(b"input2"));
    }

    #[test]
    fn test_crc32_deterministic() {
        let input: Vec<u8> = (0u8..32).collect();
        assert_eq!(crc32(&input), crc32(&input));
    }
}

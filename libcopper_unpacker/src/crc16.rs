use crc::{Crc, CRC_16_IBM_3740};

/// CRC-16/CCITT (polynomial 0x1021, initial value 0xFFFF) used by the Belle2Link front-end
pub const B2L_CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// CRC16 of a word slice as computed by the Belle2Link front-end: the bytes of each word are
/// fed most significant first.
pub fn crc16_words(words: &[u32]) -> u16 {
    let mut digest = B2L_CRC16.digest();
    for word in words {
        digest.update(&word.to_be_bytes());
    }
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(B2L_CRC16.checksum(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_words_are_big_endian() {
        let words = [0x3132_3334, 0x3536_3738];
        assert_eq!(crc16_words(&words), B2L_CRC16.checksum(b"12345678"));
        assert_ne!(crc16_words(&words), B2L_CRC16.checksum(b"43218765"));
        assert_eq!(crc16_words(&[]), 0xFFFF);
    }
}

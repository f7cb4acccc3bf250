//! Key derivation and the ciphers used by KIFINT archives.

mod cipher;
mod name;

pub use cipher::KifCipher;
pub use name::{deobfuscate_name, obfuscate_name};

use crate::util::mt;

const TOC_POLYNOMIAL: u32 = 0x04C1_1DB7;

/// Seed for file name deobfuscation, derived from the V_CODE2 string.
///
/// Each UTF-16 code unit is folded in CRC fashion and the accumulator is
/// complemented after every character.
pub fn toc_seed(vcode2: &str) -> u32 {
    vcode2.encode_utf16().fold(u32::MAX, |mut seed, c| {
        seed ^= (c as u32) << 24;
        for _ in 0..8 {
            seed = if seed & 0x8000_0000 != 0 {
                (seed << 1) ^ TOC_POLYNOMIAL
            } else {
                seed << 1
            };
        }
        !seed
    })
}

/// Blowfish key of an archive, derived from the length of its key entry.
pub fn file_key(key_entry_length: u32) -> u32 {
    mt::gen_rand(key_entry_length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toc_seed() {
        assert_eq!(toc_seed(""), 0xFFFF_FFFF);
        assert_eq!(toc_seed("A"), 0x81B0_2D8B);
        assert_eq!(toc_seed("ABC"), 0xA9A6_709C);
        assert_eq!(toc_seed("vcode2key"), 0x14A4_8049);
    }

    #[test]
    fn test_toc_seed_is_order_dependent() {
        assert_ne!(toc_seed("AB"), toc_seed("BA"));
    }

    #[test]
    fn test_file_key() {
        assert_eq!(file_key(4), 0x66A8_5D6B);
        assert_eq!(file_key(4), file_key(4));
    }
}

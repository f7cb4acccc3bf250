use crate::util::mt;

const ALPHABET_LEN: usize = 52;
const FWD: &[u8; ALPHABET_LEN] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const REV: &[u8; ALPHABET_LEN] =
    b"zyxwvutsrqponmlkjihgfedcbaZYXWVUTSRQPONMLKJIHGFEDCBA";

fn initial_shift(seed: u32) -> usize {
    let key = mt::gen_rand(seed);
    key.to_le_bytes()
        .iter()
        .fold(0u8, |shift, b| shift.wrapping_add(*b)) as usize
}

/// Locate `c` in the reversed alphabet, probing four positions per step.
fn probe(c: u8, shift: usize) -> Option<usize> {
    let mut index = 0;
    let mut index2 = shift;
    while REV[index2 % ALPHABET_LEN] != c {
        if REV[(shift + index + 1) % ALPHABET_LEN] == c {
            index += 1;
            break;
        }
        if REV[(shift + index + 2) % ALPHABET_LEN] == c {
            index += 2;
            break;
        }
        if REV[(shift + index + 3) % ALPHABET_LEN] == c {
            index += 3;
            break;
        }
        index += 4;
        index2 += 4;
        if index >= ALPHABET_LEN {
            break;
        }
    }
    if index < ALPHABET_LEN {
        Some(index)
    } else {
        None
    }
}

/// Restore an entry's raw name field in place. `seed` is the TOC seed plus
/// the entry index.
pub fn deobfuscate_name(name: &mut [u8], seed: u32) {
    let mut shift = initial_shift(seed);
    for c in name.iter_mut() {
        if c.is_ascii_alphabetic() {
            if let Some(index) = probe(*c, shift) {
                *c = FWD[index];
            }
        }
        shift += 1;
    }
}

/// Inverse of [`deobfuscate_name`].
pub fn obfuscate_name(name: &mut [u8], seed: u32) {
    let mut shift = initial_shift(seed);
    for c in name.iter_mut() {
        if let Some(index) = FWD.iter().position(|f| f == c) {
            *c = REV[(shift + index) % ALPHABET_LEN];
        }
        shift += 1;
    }
}

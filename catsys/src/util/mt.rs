//! MT19937 with the original 1998 `sgenrand` seeding, which is what the
//! engine keys its archives with.

const N: usize = 624;
const M: usize = 397;
const MATRIX_A: u32 = 0x9908_B0DF;
const UPPER_MASK: u32 = 0x8000_0000;
const LOWER_MASK: u32 = 0x7FFF_FFFF;
const TEMPERING_MASK_B: u32 = 0x9D2C_5680;
const TEMPERING_MASK_C: u32 = 0xEFC6_0000;
const DEFAULT_SEED: u32 = 4357;

#[derive(Clone)]
pub struct Mt19937 {
    mt: [u32; N],
    mti: usize,
}

impl std::fmt::Debug for Mt19937 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mt19937").field("mti", &self.mti).finish()
    }
}

impl Default for Mt19937 {
    fn default() -> Self {
        let mut mt = Self {
            mt: [0; N],
            mti: N,
        };
        mt.seed(DEFAULT_SEED);
        mt
    }
}

impl Mt19937 {
    pub fn new(seed: u32) -> Self {
        let mut mt = Self::default();
        mt.seed(seed);
        mt
    }

    pub fn seed(&mut self, mut seed: u32) {
        for i in 0..N {
            self.mt[i] = seed & 0xFFFF_0000;
            seed = seed.wrapping_mul(69069).wrapping_add(1);
            self.mt[i] |= (seed & 0xFFFF_0000) >> 16;
            seed = seed.wrapping_mul(69069).wrapping_add(1);
        }
        self.mti = N;
    }

    pub fn gen_u32(&mut self) -> u32 {
        if self.mti >= N {
            self.twist();
        }
        let mut y = self.mt[self.mti];
        self.mti += 1;
        y ^= y >> 11;
        y ^= (y << 7) & TEMPERING_MASK_B;
        y ^= (y << 15) & TEMPERING_MASK_C;
        y ^= y >> 18;
        y
    }

    fn twist(&mut self) {
        let mag01 = |y: u32| if y & 1 == 0 { 0 } else { MATRIX_A };
        for kk in 0..N {
            let y = (self.mt[kk] & UPPER_MASK) | (self.mt[(kk + 1) % N] & LOWER_MASK);
            self.mt[kk] = self.mt[(kk + M) % N] ^ (y >> 1) ^ mag01(y);
        }
        self.mti = 0;
    }
}

/// First output of a generator seeded with `seed`.
pub fn gen_rand(seed: u32) -> u32 {
    Mt19937::new(seed).gen_u32()
}

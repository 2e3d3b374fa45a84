//! Deterministic game random number generator.
//!
//! Every random decision in the simulation draws from the single [`GameRng`]
//! owned by the game, strictly in serf-update order. Two games started from
//! the same seed therefore make identical decisions, which is what save/load
//! and lockstep multiplayer rely on.

use rand::{Error, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

const DEFAULT_STATE: [u16; 3] = [0x5a5a, 0xa5a5, 0xc3c3];

/// Three-word 16-bit generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameRng {
    state: [u16; 3],
}

impl Default for GameRng {
    fn default() -> Self {
        Self {
            state: DEFAULT_STATE,
        }
    }
}

impl GameRng {
    pub fn from_words(state: [u16; 3]) -> Self {
        if state == [0, 0, 0] {
            return Self::default();
        }
        Self { state }
    }

    pub fn words(&self) -> [u16; 3] {
        self.state
    }

    /// Next 16-bit value.
    pub fn random_int(&mut self) -> u16 {
        let s = &mut self.state;
        let r = s[0].wrapping_add(s[1]) ^ s[2];
        s[2] = s[2].wrapping_add(s[1]);
        s[1] ^= s[2];
        s[1] = s[1].rotate_right(1);
        s[2] = s[2].rotate_right(1);
        s[0] = r;
        r
    }
}

impl RngCore for GameRng {
    fn next_u32(&mut self) -> u32 {
        let hi = self.random_int() as u32;
        let lo = self.random_int() as u32;
        (hi << 16) | lo
    }

    fn next_u64(&mut self) -> u64 {
        let hi = self.next_u32() as u64;
        let lo = self.next_u32() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(2) {
            let bytes = self.random_int().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for GameRng {
    type Seed = [u8; 6];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::from_words([
            u16::from_le_bytes([seed[0], seed[1]]),
            u16::from_le_bytes([seed[2], seed[3]]),
            u16::from_le_bytes([seed[4], seed[5]]),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_known_sequence_from_default() {
        let mut rng = GameRng::default();
        // (0x5a5a + 0xa5a5) ^ 0xc3c3 = 0xffff ^ 0xc3c3
        assert_eq!(rng.random_int(), 0x3c3c);
        assert_eq!(rng.words()[0], 0x3c3c);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = GameRng::seed_from_u64(42);
        let mut b = GameRng::seed_from_u64(42);
        for _ in 0..1000 {
            assert_eq!(a.random_int(), b.random_int());
        }
    }

    #[test]
    fn test_zero_seed_is_not_degenerate() {
        let mut rng = GameRng::from_words([0, 0, 0]);
        let first = rng.random_int();
        let second = rng.random_int();
        assert!(first != 0 || second != 0);
    }

    #[test]
    fn test_works_with_rand_helpers() {
        let mut rng = GameRng::seed_from_u64(7);
        for _ in 0..100 {
            let v: u8 = rng.gen_range(0..6);
            assert!(v < 6);
        }
    }
}

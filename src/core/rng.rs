//! Board Shuffling
//!
//! A small seeded generator (Xorshift128+) used to deal boards. One seed
//! always deals the same board, which is what the engine tests rely on.

use serde::{Serialize, Deserialize};

/// Seeded Xorshift128+ generator.
///
/// Not cryptographic. Sessions seed it from a random UUID; tests pin a seed.
///
/// ```
/// use eagle_eye::core::rng::DeterministicRng;
///
/// let board = DeterministicRng::new(12345).deal(50);
/// assert_eq!(board, DeterministicRng::new(12345).deal(50));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl DeterministicRng {
    /// Seed the generator. The two state words are expanded from `seed`
    /// with SplitMix64 so small or similar seeds still diverge.
    pub fn new(seed: u64) -> Self {
        let mut cursor = seed;
        let words = [splitmix64(&mut cursor), splitmix64(&mut cursor)];

        // Xorshift never leaves the all-zero state
        let state = if words == [0, 0] { [1, 1] } else { words };
        Self { state }
    }

    /// Seed from the first 8 bytes of a random v4 UUID.
    pub fn from_entropy() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let (high, _) = uuid.as_u64_pair();
        Self::new(high)
    }

    /// Next raw 64-bit output.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let [a, b] = self.state;
        let out = a.wrapping_add(b);

        let mixed = b ^ a;
        self.state = [
            a.rotate_left(24) ^ mixed ^ (mixed << 16),
            mixed.rotate_left(37),
        ];

        out
    }

    /// Uniform-ish integer in `0..bound`; `0` when `bound` is `0`.
    #[inline]
    pub fn next_int(&mut self, bound: u32) -> u32 {
        match bound {
            0 => 0,
            // Modulo bias is irrelevant at board sizes
            n => (self.next_u64() % u64::from(n)) as u32,
        }
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for last in (1..items.len()).rev() {
            let pick = self.next_int(last as u32 + 1) as usize;
            items.swap(last, pick);
        }
    }

    /// Tile values `1..=board_size` in dealt order.
    pub fn deal(&mut self, board_size: u32) -> Vec<u32> {
        let mut values: Vec<u32> = (1..=board_size).collect();
        self.shuffle(&mut values);
        values
    }

    /// Raw generator state.
    pub fn state(&self) -> [u64; 2] {
        self.state
    }
}

fn splitmix64(cursor: &mut u64) -> u64 {
    *cursor = cursor.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *cursor;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

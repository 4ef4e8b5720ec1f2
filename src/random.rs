// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Permuted congruential random number generator, and the seeder that gives
//! each generator instance an independent stream.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Multiplier of the underlying 64-bit linear congruential generator.
const PCG_MULTIPLIER: u64 = 6364136223846793005;

/// Increment applied to the process-wide seed counter on every seeder
/// construction.
const COUNTER_STEP: u32 = 0xEDF19156;

const INIT_A: u32 = 0x43B0D7E5;
const MULT_A: u32 = 0x931E8875;
const INIT_B: u32 = 0x8B51F9DD;
const MULT_B: u32 = 0x58F38DED;
const MIX_MULT_L: u32 = 0xCA01F9DD;
const MIX_MULT_R: u32 = 0x4973F715;

/// Number of entropy words mixed by the seeder.
const POOL_SIZE: usize = 4;

/// Process-wide counter, advanced by every seeder construction.
static GLOBAL_COUNTER: AtomicU32 = AtomicU32::new(0x9E3779B9);

/// A 32-bit output PCG generator (XSH-RR variant) with a 64-bit state.
#[derive(Debug, Clone)]
pub struct Pcg32 {
    /// Current LCG state.
    state: u64,
    /// Stream selector, always odd.
    increment: u64,
}

impl Default for Pcg32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Pcg32 {
    /// Creates a generator with a non-deterministic seed. Two generators
    /// created at the same time (even on different threads) obtain
    /// independent streams.
    pub fn new() -> Self {
        let mut seeds = [0u32; 4];
        Seeder::new().generate(&mut seeds);
        let state = ((seeds[1] as u64) << 32) | seeds[0] as u64;
        let stream = ((seeds[3] as u64) << 32) | seeds[2] as u64;
        Self::with_seed(state, stream)
    }

    /// Creates a generator with the given initial state and stream, yielding
    /// a reproducible sequence.
    pub fn with_seed(initial_state: u64, stream: u64) -> Self {
        let mut rng = Pcg32 {
            state: 0,
            increment: (stream << 1) | 1,
        };
        rng.step();
        rng.state = rng.state.wrapping_add(initial_state);
        rng.step();
        rng
    }

    #[inline(always)]
    fn step(&mut self) {
        self.state = self
            .state
            .wrapping_mul(PCG_MULTIPLIER)
            .wrapping_add(self.increment);
    }

    /// Returns the next uniformly distributed 32-bit value.
    #[inline(always)]
    pub fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.step();

        let xor_shifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rotation = (old_state >> 59) as u32;
        xor_shifted.rotate_right(rotation)
    }

    /// Returns a uniformly distributed value in `[0, bound)`.
    ///
    /// This is Lemire's multiply-and-shift method: a new value is drawn only
    /// when the low half of the product falls below `2^32 mod bound`, which
    /// removes the modulo bias. The division is only computed when the low
    /// half is smaller than `bound`, so it is skipped in the common case.
    ///
    /// A `bound` of zero yields zero.
    #[inline]
    pub fn next_bounded(&mut self, bound: u32) -> u32 {
        let mut m = self.next_u32() as u64 * bound as u64;
        let mut low = m as u32;
        if low < bound {
            let threshold = bound.wrapping_neg() % bound;
            while low < threshold {
                m = self.next_u32() as u64 * bound as u64;
                low = m as u32;
            }
        }
        (m >> 32) as u32
    }

    /// Returns a single random bit, as 0 or 1.
    #[inline(always)]
    pub fn next_bit(&mut self) -> u32 {
        self.next_u32() & 1
    }
}

impl rand::RngCore for Pcg32 {
    fn next_u32(&mut self) -> u32 {
        Pcg32::next_u32(self)
    }

    fn next_u64(&mut self) -> u64 {
        let low = Pcg32::next_u32(self) as u64;
        let high = Pcg32::next_u32(self) as u64;
        (high << 32) | low
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = Pcg32::next_u32(self).to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Derives seeds from a handful of weak entropy sources, by hashing them
/// through several avalanche rounds.
pub struct Seeder {
    /// Mixed entropy words.
    mixer: [u32; POOL_SIZE],
    /// Rolling multiplier of the hash function.
    hash_const: u32,
    /// Next entropy word to hand out.
    index: usize,
}

impl Seeder {
    /// Creates a seeder from the clock, an allocation address, the thread
    /// local generator of the `rand` crate and a process-wide counter.
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let probe = Box::new(0u8);
        let address = &*probe as *const u8 as usize as u64;

        // The load and the store are deliberately not a single atomic
        // read-modify-write: two seeders racing here may read the same counter
        // value, which the other three inputs still tell apart.
        let counter = GLOBAL_COUNTER.load(Ordering::Relaxed);
        GLOBAL_COUNTER.store(counter.wrapping_add(COUNTER_STEP), Ordering::Relaxed);

        Self::with_entropy([
            crush_to_u32(nanos),
            crush_to_u32(address),
            rand::random::<u32>(),
            counter,
        ])
    }

    /// Creates a seeder from explicit entropy words, for reproducible seeds.
    pub fn with_entropy(entropy: [u32; POOL_SIZE]) -> Self {
        let mut seeder = Seeder {
            mixer: entropy,
            hash_const: INIT_A,
            index: 0,
        };
        // Lots of mixing to compensate for low-entropy inputs.
        for _ in 0..POOL_SIZE {
            seeder.mix_entropy();
        }
        seeder.hash_const = INIT_B;
        seeder
    }

    fn hash(&mut self, value: u32) -> u32 {
        let mut x = value ^ self.hash_const;
        self.hash_const = self.hash_const.wrapping_mul(MULT_A);
        x = x.wrapping_mul(self.hash_const);
        x ^ (x >> 16)
    }

    fn mix_entropy(&mut self) {
        for i in 0..POOL_SIZE {
            self.mixer[i] = self.hash(self.mixer[i]);
        }
        for j in 0..POOL_SIZE {
            for i in 0..POOL_SIZE {
                if i != j {
                    let hashed = self.hash(self.mixer[j]);
                    self.mixer[i] = mix(self.mixer[i], hashed);
                }
            }
        }
    }

    /// Fills the given buffer with seeds.
    pub fn generate(&mut self, seeds: &mut [u32]) {
        for seed in seeds.iter_mut() {
            let mut x = self.mixer[self.index];
            self.index = (self.index + 1) % POOL_SIZE;

            x ^= self.hash_const;
            self.hash_const = self.hash_const.wrapping_mul(MULT_B);
            x = x.wrapping_mul(self.hash_const);
            *seed = x ^ (x >> 16);
        }
    }
}

impl Default for Seeder {
    fn default() -> Self {
        Self::new()
    }
}

/// Folds a 64-bit value into 32 bits.
fn crush_to_u32(value: u64) -> u32 {
    let x = value.wrapping_mul(0xBC2AD017D719504D);
    (x ^ (x >> 32)) as u32
}

fn mix(a: u32, b: u32) -> u32 {
    let x = MIX_MULT_L.wrapping_mul(a).wrapping_sub(MIX_MULT_R.wrapping_mul(b));
    x ^ (x >> 16)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;

    #[test]
    fn test_reference_sequence() {
        // Output of the minimal C implementation of PCG for seed 42, stream 54.
        let mut rng = Pcg32::with_seed(42, 54);
        let values: Vec<u32> = (0..6).map(|_| rng.next_u32()).collect();
        assert_eq!(
            values,
            vec![0xa15c02b7, 0x7b47f409, 0xba1d3330, 0x83d2f293, 0xbfa4784b, 0xcbed606e]
        );
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = Pcg32::with_seed(1234, 5678);
        let mut b = Pcg32::with_seed(1234, 5678);
        for _ in 0..1000 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_streams_differ() {
        let mut a = Pcg32::with_seed(1234, 1);
        let mut b = Pcg32::with_seed(1234, 2);
        let same = (0..100).filter(|_| a.next_u32() == b.next_u32()).count();
        assert!(same < 5);
    }

    #[test]
    fn test_bounded_in_range() {
        let mut rng = Pcg32::with_seed(7, 11);
        for bound in [1, 2, 3, 6, 7, 17, 23, 1000, u32::MAX] {
            for _ in 0..10_000 {
                assert!(rng.next_bounded(bound) < bound);
            }
        }
        assert_eq!(rng.next_bounded(0), 0);
    }

    #[test]
    fn test_bounded_is_uniform() {
        let mut rng = Pcg32::with_seed(99, 3);
        let mut counts = [0u32; 6];
        let draws = 600_000;
        for _ in 0..draws {
            counts[rng.next_bounded(6) as usize] += 1;
        }
        for count in counts {
            let ratio = count as f64 / (draws as f64 / 6.0);
            assert!(ratio > 0.98 && ratio < 1.02, "counts = {counts:?}");
        }
    }

    #[test]
    fn test_bits_are_balanced() {
        let mut rng = Pcg32::new();
        let ones: u32 = (0..1_000_000).map(|_| rng.next_bit()).sum();
        assert!((490_000..510_000).contains(&ones), "ones = {ones}");
    }

    #[test]
    fn test_rng_core_adapter() {
        let mut rng = Pcg32::with_seed(42, 54);
        for _ in 0..1000 {
            let x: u32 = rng.gen_range(10..20);
            assert!((10..20).contains(&x));
        }
        let mut bytes = [0u8; 7];
        rand::RngCore::fill_bytes(&mut rng, &mut bytes);
        assert!(bytes.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_explicit_entropy_is_reproducible() {
        let mut a = [0u32; 32];
        let mut b = [0u32; 32];
        Seeder::with_entropy([1, 2, 3, 4]).generate(&mut a);
        Seeder::with_entropy([1, 2, 3, 4]).generate(&mut b);
        assert_eq!(a, b);

        let mut c = [0u32; 32];
        Seeder::with_entropy([1, 2, 3, 5]).generate(&mut c);
        assert_ne!(a, c);
    }

    #[test]
    fn test_concurrent_generators_are_independent() {
        // Racing seeders may read the same counter value; the other entropy
        // inputs still separate their streams.
        let firsts: Vec<Vec<u32>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(|| {
                        let mut rng = Pcg32::new();
                        (0..4).map(|_| rng.next_u32()).collect::<Vec<u32>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let distinct: HashSet<_> = firsts.iter().collect();
        assert_eq!(distinct.len(), firsts.len());
    }
}

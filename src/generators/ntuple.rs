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

use super::Generator;
use crate::random::Pcg32;

/// Enumerates all the `m^n` tuples of length `n` with values in `[0, m)`, as
/// a mixed-radix odometer in lexicographic order.
///
/// The buffers are sized once for the largest tuple length, and
/// [`NTuples::initialize()`] selects the current `(n, m)`. The all-zero tuple
/// is returned last.
#[derive(Debug, Clone)]
pub struct NTuples {
    /// The current tuple, of which the first `n` items are valid.
    tuple: Vec<usize>,
    /// Current tuple length.
    n: usize,
    /// Number of distinct values per position.
    m: usize,
    /// Whether more tuples are available.
    has_next: bool,
}

impl NTuples {
    /// Creates a generator for tuples of length at most `max_len`.
    pub fn new(max_len: usize) -> Self {
        NTuples {
            tuple: vec![0; max_len],
            n: 0,
            m: 0,
            has_next: false,
        }
    }

    /// Starts an enumeration of the tuples of length `n` over `m` values.
    /// Nothing is enumerated if either is zero.
    pub fn initialize(&mut self, n: usize, m: usize) {
        assert!(n <= self.tuple.len());
        self.n = n;
        self.m = m;
        self.has_next = n > 0 && m > 0;
        self.tuple[..n].fill(0);
    }
}

impl Generator for NTuples {
    type Item = usize;

    fn has_next(&self) -> bool {
        self.has_next
    }

    fn next(&mut self) -> &[usize] {
        let last = self.n - 1;
        let max_value = self.m - 1;

        if self.tuple[last] < max_value {
            self.tuple[last] += 1;
            return &self.tuple[..self.n];
        }

        // Carry: zero the trailing digits at their maximum, and increment
        // the first one that can be.
        let mut j = last;
        loop {
            self.tuple[j] = 0;
            if j == 0 {
                // Wrapped around to the initial tuple, which wasn't returned
                // at the start.
                self.has_next = false;
                return &self.tuple[..self.n];
            }
            j -= 1;
            if self.tuple[j] < max_value {
                self.tuple[j] += 1;
                return &self.tuple[..self.n];
            }
        }
    }
}

/// Draws tuples whose positions are independently uniform in `[0, m)`.
#[derive(Debug, Clone)]
pub struct RandomNTuples {
    /// The current tuple, of which the first `n` items are valid.
    tuple: Vec<usize>,
    /// Current tuple length.
    n: usize,
    /// Number of distinct values per position.
    m: u32,
    /// Source of randomness, owned by this generator.
    random: Pcg32,
}

impl RandomNTuples {
    /// Creates a generator for tuples of length at most `max_len`, with a
    /// freshly seeded random source.
    pub fn new(max_len: usize) -> Self {
        Self::with_random(max_len, Pcg32::new())
    }

    /// Creates a generator for tuples of length at most `max_len`, drawing
    /// from the given random source.
    pub fn with_random(max_len: usize, random: Pcg32) -> Self {
        RandomNTuples {
            tuple: vec![0; max_len],
            n: 0,
            m: 0,
            random,
        }
    }

    /// Selects the tuple length `n` and the number of values `m`.
    pub fn initialize(&mut self, n: usize, m: usize) {
        assert!(n <= self.tuple.len());
        self.n = n;
        self.m = m as u32;
    }
}

impl Generator for RandomNTuples {
    type Item = usize;

    fn has_next(&self) -> bool {
        true
    }

    fn next(&mut self) -> &[usize] {
        for x in self.tuple[..self.n].iter_mut() {
            *x = self.random.next_bounded(self.m) as usize;
        }
        &self.tuple[..self.n]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    fn collect_all(generator: &mut NTuples) -> Vec<Vec<usize>> {
        let mut all = Vec::new();
        while generator.has_next() {
            all.push(generator.next().to_vec());
        }
        all
    }

    #[test]
    fn test_counts() {
        let mut generator = NTuples::new(6);
        for n in 1..=4 {
            for m in 1..=4 {
                generator.initialize(n, m);
                let all = collect_all(&mut generator);
                let distinct: HashSet<_> = all.iter().cloned().collect();
                assert_eq!(all.len(), m.pow(n as u32), "n = {n}, m = {m}");
                assert_eq!(distinct.len(), all.len());
                assert!(all.iter().flatten().all(|&x| x < m));
            }
        }
    }

    #[test]
    fn test_lexicographic_order() {
        let mut generator = NTuples::new(3);
        generator.initialize(3, 2);
        let all = collect_all(&mut generator);
        assert_eq!(
            all,
            vec![
                vec![0, 0, 1],
                vec![0, 1, 0],
                vec![0, 1, 1],
                vec![1, 0, 0],
                vec![1, 0, 1],
                vec![1, 1, 0],
                vec![1, 1, 1],
                vec![0, 0, 0],
            ]
        );
    }

    #[test]
    fn test_empty_dimensions() {
        let mut generator = NTuples::new(4);
        generator.initialize(0, 3);
        assert!(!generator.has_next());
        generator.initialize(3, 0);
        assert!(!generator.has_next());
    }

    #[test]
    fn test_reinitialize_after_partial_run() {
        let mut generator = NTuples::new(4);
        generator.initialize(4, 3);
        for _ in 0..10 {
            generator.next();
        }
        generator.initialize(2, 3);
        assert_eq!(collect_all(&mut generator).len(), 9);
    }

    #[test]
    fn test_random_tuples_in_range() {
        let mut generator = RandomNTuples::with_random(8, Pcg32::with_seed(1, 1));
        generator.initialize(5, 3);
        let mut counts = [0u32; 3];
        for _ in 0..30_000 {
            let tuple = generator.next();
            assert_eq!(tuple.len(), 5);
            for &x in tuple {
                counts[x] += 1;
            }
        }
        for count in counts {
            assert!((49_000..51_000).contains(&count), "counts = {counts:?}");
        }
    }
}

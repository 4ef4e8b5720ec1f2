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

/// Enumerates the permutations of `{0, ..., n-1}` with the iterative form of
/// Heap's algorithm (Sedgewick, "Permutation Generation Methods", 1977).
///
/// Each step performs a single transposition. The identity permutation is
/// returned last.
#[derive(Debug, Clone)]
pub struct Permutations {
    /// Number of elements.
    n: usize,
    /// Whether more permutations are available.
    has_next: bool,
    /// The current permutation.
    permutation: Vec<usize>,
    /// Loop counters of Heap's algorithm.
    helper: Vec<usize>,
}

impl Permutations {
    /// Creates a generator for the `n!` permutations of `n` elements.
    pub fn new(n: usize) -> Self {
        Permutations {
            n,
            has_next: n > 0,
            permutation: (0..n).collect(),
            helper: vec![0; n],
        }
    }

    /// Restarts the enumeration.
    pub fn reset(&mut self) {
        self.has_next = self.n > 0;
        self.helper.fill(0);
        for (i, x) in self.permutation.iter_mut().enumerate() {
            *x = i;
        }
    }
}

impl Generator for Permutations {
    type Item = usize;

    fn has_next(&self) -> bool {
        self.has_next
    }

    fn next(&mut self) -> &[usize] {
        for i in 1..self.n {
            if self.helper[i] < i {
                // Swap with the first element if i is even, with the i-th
                // counter otherwise.
                let k = (i & 1) * self.helper[i];
                self.permutation.swap(i, k);
                self.helper[i] += 1;
                return &self.permutation;
            }
            self.helper[i] = 0;
        }

        self.has_next = false;
        for (i, x) in self.permutation.iter_mut().enumerate() {
            *x = i;
        }
        &self.permutation
    }
}

/// Draws uniformly random permutations with a Fisher-Yates shuffle.
#[derive(Debug, Clone)]
pub struct RandomPermutations {
    /// The current permutation, shuffled in place at every step.
    permutation: Vec<usize>,
    /// Source of randomness, owned by this generator.
    random: Pcg32,
}

impl RandomPermutations {
    /// Creates a generator for random permutations of `n` elements, with a
    /// freshly seeded random source.
    pub fn new(n: usize) -> Self {
        Self::with_random(n, Pcg32::new())
    }

    /// Creates a generator for random permutations of `n` elements, drawing
    /// from the given random source.
    pub fn with_random(n: usize, random: Pcg32) -> Self {
        RandomPermutations {
            permutation: (0..n).collect(),
            random,
        }
    }
}

impl Generator for RandomPermutations {
    type Item = usize;

    fn has_next(&self) -> bool {
        true
    }

    fn next(&mut self) -> &[usize] {
        for i in (1..self.permutation.len()).rev() {
            let j = self.random.next_bounded(i as u32 + 1) as usize;
            self.permutation.swap(i, j);
        }
        &self.permutation
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn collect_all(mut generator: Permutations) -> Vec<Vec<usize>> {
        let mut all = Vec::new();
        while generator.has_next() {
            all.push(generator.next().to_vec());
        }
        all
    }

    #[test]
    fn test_five_players_yield_120_permutations() {
        let all = collect_all(Permutations::new(5));
        assert_eq!(all.len(), 120);
        let distinct: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(distinct.len(), 120);
        assert_eq!(all.last().unwrap(), &vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_factorial_counts() {
        let mut factorial = 1;
        for n in 1..=8 {
            factorial *= n;
            let all = collect_all(Permutations::new(n));
            let distinct: HashSet<_> = all.iter().cloned().collect();
            assert_eq!(all.len(), factorial);
            assert_eq!(distinct.len(), factorial);
        }
    }

    #[test]
    fn test_single_transposition_per_step() {
        let mut generator = Permutations::new(6);
        let mut previous: Vec<usize> = (0..6).collect();
        while generator.has_next() {
            let current = generator.next().to_vec();
            if !generator.has_next() {
                break;
            }
            let moved = std::iter::zip(&previous, &current)
                .filter(|(a, b)| a != b)
                .count();
            assert_eq!(moved, 2);
            previous = current;
        }
    }

    #[test]
    fn test_reset_restarts() {
        let mut generator = Permutations::new(4);
        let first = collect_all(generator.clone());
        generator.next();
        generator.next();
        generator.reset();
        assert_eq!(collect_all(generator), first);
    }

    #[test]
    fn test_zero_elements() {
        assert!(!Permutations::new(0).has_next());
    }

    #[test]
    fn test_random_permutations_are_uniform() {
        let mut generator = RandomPermutations::with_random(3, Pcg32::with_seed(5, 6));
        let mut counts: HashMap<Vec<usize>, u32> = HashMap::new();
        let draws = 600_000;
        for _ in 0..draws {
            *counts.entry(generator.next().to_vec()).or_default() += 1;
        }
        assert_eq!(counts.len(), 6);
        for count in counts.values() {
            let ratio = *count as f64 / (draws as f64 / 6.0);
            assert!(ratio > 0.98 && ratio < 1.02, "counts = {counts:?}");
        }
    }
}

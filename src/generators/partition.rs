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

/// Draws random compositions of `q` votes into `p` positive parts, each part
/// being at most `max`.
///
/// The generated buffer has `p + 1` items: the `p` parts followed by a fixed
/// value (the votes of the tracked player), so that it can directly be used
/// as the vote vector of a game with `p + 1` players.
///
/// Compositions are drawn uniformly, which means that partitions are not: the
/// partition `{5, 1}` of 6 is twice as likely as `{3, 3}` because it has two
/// orderings. Vote scenarios are ordered, so this is the intended
/// distribution.
#[derive(Debug, Clone)]
pub struct RandomPartitions {
    /// Number of parts.
    p: usize,
    /// Total to split.
    q: u32,
    /// Upper bound of each part.
    max: u32,
    /// The current composition, followed by the fixed value.
    partition: Vec<u32>,
    /// Source of randomness, owned by this generator.
    random: Pcg32,
}

impl RandomPartitions {
    /// Creates a generator of compositions into `p` parts, with a freshly
    /// seeded random source.
    pub fn new(p: usize) -> Self {
        Self::with_random(p, Pcg32::new())
    }

    /// Creates a generator of compositions into `p` parts, drawing from the
    /// given random source.
    pub fn with_random(p: usize, random: Pcg32) -> Self {
        assert!(p > 0);
        RandomPartitions {
            p,
            q: p as u32,
            max: 1,
            partition: vec![1; p + 1],
            random,
        }
    }

    /// Prepares the generation of compositions of `q` with parts at most
    /// `max`, with `set` in the last position of the buffer.
    ///
    /// A bound that no composition can satisfy (below `ceil(q / p)`) or that
    /// is never binding (above `q - p + 1`) is replaced by `q - p + 1`.
    pub fn initialize(&mut self, q: u32, max: Option<u32>, set: u32) {
        let p = self.p as u32;
        assert!(q >= p, "cannot split {q} into {p} positive parts");

        let min_max = q.div_ceil(p);
        let possible_max = q - p + 1;

        self.q = q;
        self.max = match max {
            Some(max) if (min_max..=possible_max).contains(&max) => max,
            _ => possible_max,
        };
        self.partition[self.p] = set;
    }

    /// Effective upper bound of each part.
    pub fn max(&self) -> u32 {
        self.max
    }
}

impl Generator for RandomPartitions {
    type Item = u32;

    fn has_next(&self) -> bool {
        true
    }

    fn next(&mut self) -> &[u32] {
        let p = self.p as u32;
        if self.q == p {
            self.partition[..self.p].fill(1);
            return &self.partition;
        }

        // Selection sampling (Knuth, TAOCP vol. 2, Algorithm 3.4.2S) of
        // k = p - 1 separators among n + k slots, where n = q - p. The gaps
        // between consecutive separators form a random composition of n into
        // p non-negative parts, shifted by one (Nijenhuis & Wilf, RANCOM).
        // Compositions with a part above max are rejected.
        let max = self.max;
        let k = p - 1;
        let nk = self.q - p + k;

        let mut v = max + 1;
        let mut l = 0;
        while v > max || l > max {
            let mut m = 0;
            let mut t = 0;
            l = 0;
            v = 0;

            while m < k {
                if self.random.next_bounded(nk - t) < k - m {
                    v = t - l + 1;
                    if v > max {
                        break;
                    }
                    self.partition[m as usize] = v;
                    m += 1;
                    l = t + 1;
                }
                t += 1;
            }

            l = nk - l + 1;
            self.partition[k as usize] = l;
        }

        &self.partition
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn check_partition(partition: &[u32], p: usize, q: u32, max: u32, set: u32) {
        assert_eq!(partition.len(), p + 1);
        assert_eq!(partition[p], set);
        assert_eq!(partition[..p].iter().sum::<u32>(), q, "{partition:?}");
        assert!(
            partition[..p].iter().all(|&x| x >= 1 && x <= max),
            "{partition:?} exceeds {max}"
        );
    }

    macro_rules! partition_tests {
        ( $( $case:ident: $p:expr, $q:expr, $max:expr, )+ ) => {
            $(
                #[test]
                fn $case() {
                    let mut generator = RandomPartitions::with_random($p, Pcg32::with_seed(7, 11));
                    generator.initialize($q, $max, 42);
                    let max = generator.max();
                    for _ in 0..10_000 {
                        check_partition(generator.next(), $p, $q, max, 42);
                    }
                }
            )+
        };
    }

    partition_tests! {
        test_unbounded_small: 5, 20, None,
        test_unbounded_large: 30, 600, None,
        test_bounded: 6, 16, Some(7),
        test_tight_bound: 4, 12, Some(3),
        test_single_part: 1, 9, None,
        test_two_parts: 2, 300, Some(160),
    }

    #[test]
    fn test_equal_total_gives_ones() {
        let mut generator = RandomPartitions::new(7);
        generator.initialize(7, Some(3), 5);
        assert_eq!(generator.next(), &[1, 1, 1, 1, 1, 1, 1, 5]);
    }

    #[test]
    fn test_invalid_max_falls_back() {
        let mut generator = RandomPartitions::new(4);
        // Below ceil(10 / 4).
        generator.initialize(10, Some(2), 0);
        assert_eq!(generator.max(), 7);
        // Above 10 - 4 + 1.
        generator.initialize(10, Some(8), 0);
        assert_eq!(generator.max(), 7);
        generator.initialize(10, None, 0);
        assert_eq!(generator.max(), 7);
        generator.initialize(10, Some(3), 0);
        assert_eq!(generator.max(), 3);
    }

    #[test]
    fn test_compositions_are_uniform() {
        // Compositions of 6 into 3 positive parts: C(5, 2) = 10 of them.
        let mut generator = RandomPartitions::with_random(3, Pcg32::with_seed(3, 4));
        generator.initialize(6, None, 0);
        let draws = 500_000;
        let mut counts: HashMap<Vec<u32>, u32> = HashMap::new();
        for _ in 0..draws {
            *counts.entry(generator.next()[..3].to_vec()).or_default() += 1;
        }
        assert_eq!(counts.len(), 10);
        for count in counts.values() {
            let ratio = *count as f64 / (draws as f64 / 10.0);
            assert!(ratio > 0.97 && ratio < 1.03, "counts = {counts:?}");
        }
    }
}

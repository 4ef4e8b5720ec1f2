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

/// Enumerates the subsets of `{0, ..., n-1}` with Chase's "Twiddle" algorithm
/// (Algorithm 382, "Combinations of M out of N objects", 1970).
///
/// Subsets come by decreasing size: the full set first, the empty set last.
/// Within a size, each subset differs from the previous one by a single
/// element swap, so every step costs O(1) amortized.
#[derive(Debug, Clone)]
pub struct Combinations {
    /// Number of elements to choose from.
    n: usize,
    /// Size of the current combination. Starts at `n + 1` before the first
    /// step.
    size: usize,
    /// Whether the exhaustive enumeration has more subsets.
    has_next: bool,
    /// When enumerating a single size: number of subsets left to return.
    remaining: Option<u64>,
    /// Whether the current buffer is yet to be returned.
    pending: bool,
    /// The current combination, of which the first `size` items are valid.
    combination: Vec<usize>,
    /// Twiddle's state array, of length `n + 2`.
    helper: Vec<i32>,
}

impl Combinations {
    /// Creates a generator for all the subsets of `n` elements.
    pub fn new(n: usize) -> Self {
        let mut generator = Combinations {
            n,
            size: n + 1,
            has_next: n > 0,
            remaining: None,
            pending: false,
            combination: vec![0; n],
            helper: vec![0; n + 2],
        };
        generator.reset();
        generator
    }

    /// Creates a generator for the subsets of exactly `size` out of `n`
    /// elements.
    pub fn with_size(n: usize, size: usize) -> Self {
        assert!(size <= n);
        let mut generator = Combinations {
            n,
            size,
            has_next: true,
            remaining: Some(binomial(n, size)),
            pending: true,
            combination: vec![0; n],
            helper: vec![0; n + 2],
        };
        generator.helper[0] = n as i32 + 1;
        generator.helper[n + 1] = -2;
        generator.load_first_of_size();
        generator
    }

    /// Restarts the exhaustive enumeration from the full set.
    pub fn reset(&mut self) {
        let n = self.n;
        self.size = n + 1;
        self.has_next = n > 0;
        self.remaining = None;
        self.pending = false;
        self.combination.fill(0);
        self.helper.fill(0);
        self.helper[0] = n as i32 + 1;
        if n > 0 {
            self.helper[1] = 1;
        }
        self.helper[n + 1] = -2;
    }

    /// Size of the current combination.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Sets up the first combination of the current size, i.e. the last
    /// `size` elements.
    fn load_first_of_size(&mut self) {
        let n = self.n;
        let m = self.size;
        for k in 1..=n - m {
            self.helper[k] = 0;
        }
        for k in 1..=m {
            self.combination[k - 1] = n - m + k - 1;
            self.helper[n - m + k] = k as i32;
        }
    }

    fn advance(&mut self) {
        let h = &mut self.helper;

        // L1
        let mut j = 0;
        loop {
            j += 1;
            if h[j] >= 1 {
                break;
            }
        }

        if h[j - 1] == 0 {
            for i in 2..j {
                h[i] = -1;
            }
            h[j] = 0;
            h[1] = 1;
            self.combination[0] = 0;
            return;
        }

        if j > 1 {
            h[j - 1] = 0;
        }

        // L2
        loop {
            j += 1;
            if h[j] <= 0 {
                break;
            }
        }

        // L3
        let mut i = j - 1;
        loop {
            i += 1;
            if h[i] != 0 {
                break;
            }
            h[i] = -1;
        }

        if h[i] == -1 {
            h[i] = h[j - 1];
            h[j - 1] = -1;
            self.combination[(h[i] - 1) as usize] = i - 1;
            return;
        }

        if i as i32 == h[0] {
            // All the subsets of this size were returned.
            self.size -= 1;
            self.has_next = self.size > 0;
            self.load_first_of_size();
            return;
        }

        // L4
        h[j] = h[i];
        h[i] = 0;
        self.combination[(h[j] - 1) as usize] = j - 1;
    }
}

impl Generator for Combinations {
    type Item = usize;

    fn has_next(&self) -> bool {
        match self.remaining {
            Some(remaining) => remaining > 0,
            None => self.has_next,
        }
    }

    fn next(&mut self) -> &[usize] {
        if self.pending {
            self.pending = false;
        } else {
            self.advance();
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        &self.combination[..self.size]
    }
}

/// Draws random subsets of `{0, ..., n-1}`, each element being included by
/// a fair coin flip.
///
/// The subset size therefore follows a binomial distribution, which matches
/// the proportion of k-subsets among all subsets. Sampling the size uniformly
/// would over-represent small and large coalitions in power index estimates.
#[derive(Debug, Clone)]
pub struct RandomCombinations {
    /// Number of elements to choose from.
    n: usize,
    /// Size of the current combination.
    size: usize,
    /// The current combination, of which the first `size` items are valid.
    combination: Vec<usize>,
    /// Source of randomness, owned by this generator.
    random: Pcg32,
}

impl RandomCombinations {
    /// Creates a generator for random subsets of `n` elements, with a freshly
    /// seeded random source.
    pub fn new(n: usize) -> Self {
        Self::with_random(n, Pcg32::new())
    }

    /// Creates a generator for random subsets of `n` elements, drawing from
    /// the given random source.
    pub fn with_random(n: usize, random: Pcg32) -> Self {
        RandomCombinations {
            n,
            size: 0,
            combination: vec![0; n],
            random,
        }
    }

    /// Size of the current combination.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Generator for RandomCombinations {
    type Item = usize;

    fn has_next(&self) -> bool {
        true
    }

    fn next(&mut self) -> &[usize] {
        let mut k = 0;
        for i in 0..self.n {
            let bit = self.random.next_bit() as usize;
            // Branchless: the slot is overwritten unless the bit was set.
            self.combination[k] = bit * i;
            k += bit;
        }
        self.size = k;
        &self.combination[..k]
    }
}

/// Number of subsets of size `k` of a set of size `n`.
pub(crate) fn binomial(n: usize, k: usize) -> u64 {
    let k = k.min(n - k);
    let mut result: u64 = 1;
    for i in 0..k {
        result = result * (n - i) as u64 / (i + 1) as u64;
    }
    result
}

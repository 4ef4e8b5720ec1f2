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

use super::factorial;
use crate::cancel::{Cancelled, CancellationToken};
use crate::generators::{Generator, Permutations, RandomPermutations};

/// Calculator of the Shapley-Shubik index: the share of player orderings in
/// which a player is pivotal, i.e. is the first one whose votes bring the
/// running total to the quota.
#[derive(Debug)]
pub struct Shapley {
    /// Number of players.
    n: usize,
    /// Orderings of all the players.
    permutations: Permutations,
    /// Orderings of all the players but one.
    tail_permutations: Permutations,
    /// Random orderings of all the players.
    random_permutations: RandomPermutations,
    /// Players other than the leading one, for partial enumerations.
    others: Vec<usize>,
}

impl Shapley {
    /// Creates a calculator for games with `n` players.
    pub fn new(n: usize) -> Self {
        Shapley {
            n,
            permutations: Permutations::new(n),
            tail_permutations: Permutations::new(n.saturating_sub(1)),
            random_permutations: RandomPermutations::new(n),
            others: Vec::with_capacity(n),
        }
    }

    /// Computes the exact index over all the `n!` orderings.
    pub fn calculate_exact(
        &mut self,
        votes: &[u32],
        quota: u32,
        results: &mut [f64],
        token: &CancellationToken,
    ) -> Result<(), Cancelled> {
        assert_eq!(votes.len(), self.n);
        results.fill(0.0);

        self.permutations.reset();
        while self.permutations.has_next() {
            token.check()?;
            let permutation = self.permutations.next();
            credit_pivot(votes, quota, 0, permutation.iter().copied(), results);
        }

        Self::normalize(results, factorial(self.n));
        Ok(())
    }

    /// Adds the raw pivot counts of the `(n-1)!` orderings that start with
    /// the `leader` player. Summing this over all the leaders yields the
    /// counts of the full enumeration.
    pub fn accumulate_leading(
        &mut self,
        votes: &[u32],
        quota: u32,
        leader: usize,
        results: &mut [f64],
        token: &CancellationToken,
    ) -> Result<(), Cancelled> {
        assert_eq!(votes.len(), self.n);
        token.check()?;

        let start = votes[leader] as u64;
        if start >= quota as u64 {
            // The leader is pivotal in all these orderings.
            results[leader] += factorial(self.n - 1);
            return Ok(());
        }

        self.others.clear();
        self.others.extend((0..self.n).filter(|&i| i != leader));

        self.tail_permutations.reset();
        while self.tail_permutations.has_next() {
            token.check()?;
            let permutation = self.tail_permutations.next();
            let others = &self.others;
            credit_pivot(
                votes,
                quota,
                start,
                permutation.iter().map(|&i| others[i]),
                results,
            );
        }
        Ok(())
    }

    /// Adds the raw pivot counts of `trials` random orderings. The counts
    /// must then be divided by the total number of trials.
    pub fn calculate_monte_carlo(
        &mut self,
        votes: &[u32],
        quota: u32,
        results: &mut [f64],
        trials: u64,
        token: &CancellationToken,
    ) -> Result<(), Cancelled> {
        assert_eq!(votes.len(), self.n);
        results.fill(0.0);

        for _ in 0..trials {
            token.check()?;
            let permutation = self.random_permutations.next();
            credit_pivot(votes, quota, 0, permutation.iter().copied(), results);
        }
        Ok(())
    }

    /// Turns pivot counts into index values.
    pub fn normalize(values: &mut [f64], total: f64) {
        for x in values.iter_mut() {
            *x /= total;
        }
    }
}

/// Walks the players in order from an initial running total, and credits the
/// first one that reaches the quota.
#[inline(always)]
fn credit_pivot(
    votes: &[u32],
    quota: u32,
    start: u64,
    order: impl Iterator<Item = usize>,
    results: &mut [f64],
) {
    let quota = quota as u64;
    let mut sum = start;
    for player in order {
        sum += votes[player] as u64;
        if sum >= quota {
            results[player] += 1.0;
            break;
        }
    }
}

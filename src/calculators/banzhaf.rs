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

use super::coalition_votes;
use crate::cancel::{Cancelled, CancellationToken};
use crate::generators::{Combinations, Generator, RandomCombinations};

/// Calculator of the normalized Banzhaf index: the share of critical
/// memberships of each player, over all the winning coalitions.
///
/// A player is critical in a winning coalition if the coalition falls below
/// the quota without it.
#[derive(Debug)]
pub struct Banzhaf {
    /// Number of players.
    n: usize,
    /// All the coalitions.
    combinations: Combinations,
    /// Random coalitions.
    random_combinations: RandomCombinations,
}

impl Banzhaf {
    /// Creates a calculator for games with `n` players.
    pub fn new(n: usize) -> Self {
        Banzhaf {
            n,
            combinations: Combinations::new(n),
            random_combinations: RandomCombinations::new(n),
        }
    }

    /// Computes the exact index over all the `2^n` coalitions.
    pub fn calculate_exact(
        &mut self,
        votes: &[u32],
        quota: u32,
        results: &mut [f64],
        token: &CancellationToken,
    ) -> Result<(), Cancelled> {
        assert_eq!(votes.len(), self.n);
        results.fill(0.0);

        self.combinations.reset();
        while self.combinations.has_next() {
            token.check()?;
            credit_critical(votes, quota, self.combinations.next(), results);
        }

        Self::normalize(results);
        Ok(())
    }

    /// Adds the raw critical counts of the coalitions of the given size.
    pub fn accumulate_size(
        &mut self,
        votes: &[u32],
        quota: u32,
        size: usize,
        results: &mut [f64],
        token: &CancellationToken,
    ) -> Result<(), Cancelled> {
        assert_eq!(votes.len(), self.n);

        let mut combinations = Combinations::with_size(self.n, size);
        while combinations.has_next() {
            token.check()?;
            credit_critical(votes, quota, combinations.next(), results);
        }
        Ok(())
    }

    /// Adds the raw critical counts of `trials` random coalitions.
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
            credit_critical(votes, quota, self.random_combinations.next(), results);
        }
        Ok(())
    }

    /// Turns critical counts into index values, by dividing them by their
    /// total. Zero counts stay at zero.
    pub fn normalize(values: &mut [f64]) {
        let mut total: f64 = values.iter().sum();
        if total == 0.0 {
            total = 1.0;
        }
        for x in values.iter_mut() {
            *x /= total;
        }
    }
}

/// Credits the critical players of a coalition, if it is winning.
#[inline(always)]
fn credit_critical(votes: &[u32], quota: u32, coalition: &[usize], results: &mut [f64]) {
    let quota = quota as u64;
    let sum = coalition_votes(votes, coalition);
    if sum >= quota {
        for &player in coalition {
            if sum - (votes[player] as u64) < quota {
                results[player] += 1.0;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::calculators::test_util::{assert_close, random_games, EPSILON};

    macro_rules! exact_tests {
        ( $( $case:ident: $votes:expr, $quota:expr => $expected:expr, )+ ) => {
            $(
                #[test]
                fn $case() {
                    let votes: &[u32] = &$votes;
                    let mut results = vec![0.0; votes.len()];
                    let mut banzhaf = Banzhaf::new(votes.len());
                    banzhaf
                        .calculate_exact(votes, $quota, &mut results, &CancellationToken::new())
                        .unwrap();
                    assert_close(&results, &$expected, 1e-4);
                }
            )+
        };
    }

    exact_tests! {
        test_exact_quota_14: [3, 5, 8, 8, 12], 14 => [0.12, 0.12, 0.2, 0.2, 0.36],
        test_exact_quota_19: [3, 5, 8, 8, 12], 19 => [1.0 / 13.0, 1.0 / 13.0, 3.0 / 13.0, 3.0 / 13.0, 5.0 / 13.0],
        test_exact_unreachable_quota: [3, 5, 8, 8, 12], 40 => [0.0; 5],
        test_exact_dummy_player: [6, 6, 1], 12 => [0.5, 0.5, 0.0],
        test_exact_single_player: [4], 3 => [1.0],
    }

    #[test]
    fn test_exact_sums_to_one() {
        let token = CancellationToken::new();
        for (votes, quota) in random_games(43, 60, 9) {
            let mut results = vec![0.0; votes.len()];
            Banzhaf::new(votes.len())
                .calculate_exact(&votes, quota, &mut results, &token)
                .unwrap();
            let sum: f64 = results.iter().sum();
            assert!((sum - 1.0).abs() < EPSILON, "{votes:?} / {quota}: {results:?}");
        }
    }

    #[test]
    fn test_size_shares_add_up_to_exact() {
        let token = CancellationToken::new();
        for (votes, quota) in random_games(8, 30, 9) {
            let n = votes.len();
            let mut banzhaf = Banzhaf::new(n);

            let mut exact = vec![0.0; n];
            banzhaf
                .calculate_exact(&votes, quota, &mut exact, &token)
                .unwrap();

            let mut shares = vec![0.0; n];
            for size in (0..=n).rev() {
                banzhaf
                    .accumulate_size(&votes, quota, size, &mut shares, &token)
                    .unwrap();
            }
            Banzhaf::normalize(&mut shares);

            assert_close(&shares, &exact, EPSILON);
        }
    }

    #[test]
    fn test_monte_carlo_matches_exact() {
        let votes = [3, 5, 8, 8, 12];
        let mut results = vec![0.0; 5];
        Banzhaf::new(5)
            .calculate_monte_carlo(&votes, 19, &mut results, 1_000_000, &CancellationToken::new())
            .unwrap();
        Banzhaf::normalize(&mut results);
        assert_close(&results, &[0.0769, 0.0769, 0.2308, 0.2308, 0.3846], 0.01);
    }

    #[test]
    fn test_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let mut results = vec![0.0; 3];
        let mut banzhaf = Banzhaf::new(3);
        assert_eq!(
            banzhaf.calculate_exact(&[1, 2, 3], 4, &mut results, &token),
            Err(Cancelled)
        );
        assert_eq!(
            banzhaf.accumulate_size(&[1, 2, 3], 4, 2, &mut results, &token),
            Err(Cancelled)
        );
    }
}

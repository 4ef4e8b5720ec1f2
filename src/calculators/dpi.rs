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

use crate::cancel::{Cancelled, CancellationToken};
use crate::generators::{Combinations, Generator, NTuples, RandomCombinations, RandomNTuples};

/// Calculator of the DPI, a "convincing probability" index over weighted
/// players.
///
/// For every coalition, each opponent (member of the complement) is assigned
/// to a coalition member who convinces them, with probability
/// `w_member / (w_member + w_opponent)`. Every such scenario contributes the
/// product of its convincing probabilities to each member that convinces an
/// opponent, once per convinced opponent. The index is the share of the
/// total contributions.
#[derive(Debug)]
pub struct Dpi {
    /// Number of players.
    n: usize,
    /// All the coalitions.
    combinations: Combinations,
    /// Random coalitions.
    random_combinations: RandomCombinations,
    /// All the assignments of opponents to coalition members.
    scenarios: NTuples,
    /// Random assignments of opponents to coalition members.
    random_scenarios: RandomNTuples,
    /// Copy of the current coalition.
    coalition: Vec<usize>,
    /// Complement of the current coalition.
    complement: Vec<usize>,
    /// Membership flags of the current coalition.
    is_member: Vec<bool>,
}

impl Dpi {
    /// Creates a calculator for games with `n` players.
    pub fn new(n: usize) -> Self {
        Dpi {
            n,
            combinations: Combinations::new(n),
            random_combinations: RandomCombinations::new(n),
            scenarios: NTuples::new(n),
            random_scenarios: RandomNTuples::new(n),
            coalition: Vec::with_capacity(n),
            complement: Vec::with_capacity(n),
            is_member: vec![false; n],
        }
    }

    /// Computes the exact index over all the coalitions and all their
    /// scenarios.
    pub fn calculate_exact(
        &mut self,
        weights: &[f64],
        results: &mut [f64],
        token: &CancellationToken,
    ) -> Result<(), Cancelled> {
        assert_eq!(weights.len(), self.n);
        results.fill(0.0);

        self.combinations.reset();
        while self.combinations.has_next() {
            token.check()?;
            let coalition = self.combinations.next();
            self.coalition.clear();
            self.coalition.extend_from_slice(coalition);
            self.enumerate_scenarios(weights, results, token)?;
        }

        Self::normalize(results);
        Ok(())
    }

    /// Adds the raw contributions of the coalitions of the given size.
    pub fn accumulate_size(
        &mut self,
        weights: &[f64],
        size: usize,
        results: &mut [f64],
        token: &CancellationToken,
    ) -> Result<(), Cancelled> {
        assert_eq!(weights.len(), self.n);

        let mut combinations = Combinations::with_size(self.n, size);
        while combinations.has_next() {
            token.check()?;
            let coalition = combinations.next();
            self.coalition.clear();
            self.coalition.extend_from_slice(coalition);
            self.enumerate_scenarios(weights, results, token)?;
        }
        Ok(())
    }

    /// Adds the raw contributions of `sqrt(trials)` random coalitions with
    /// `sqrt(trials)` random scenarios each.
    ///
    /// Empty coalitions have no member to convince anyone, so they contribute
    /// nothing.
    pub fn calculate_monte_carlo(
        &mut self,
        weights: &[f64],
        results: &mut [f64],
        trials: u64,
        token: &CancellationToken,
    ) -> Result<(), Cancelled> {
        assert_eq!(weights.len(), self.n);
        results.fill(0.0);

        let count = (trials as f64).sqrt() as u64;
        for _ in 0..count {
            token.check()?;
            let coalition = self.random_combinations.next();
            if coalition.is_empty() {
                continue;
            }
            self.coalition.clear();
            self.coalition.extend_from_slice(coalition);
            self.load_complement();

            self.random_scenarios
                .initialize(self.complement.len(), self.coalition.len());
            for _ in 0..count {
                token.check()?;
                let scenario = self.random_scenarios.next();
                credit_scenario(
                    weights,
                    &self.coalition,
                    &self.complement,
                    scenario,
                    results,
                );
            }
        }
        Ok(())
    }

    /// Turns contributions into index values, by dividing them by their
    /// total.
    ///
    /// Unlike the other indices, a zero total isn't guarded against: if all
    /// the weights are zero, the result is NaN.
    pub fn normalize(values: &mut [f64]) {
        let total: f64 = values.iter().sum();
        for x in values.iter_mut() {
            *x /= total;
        }
    }

    /// Computes the complement of the current coalition, in increasing
    /// order.
    fn load_complement(&mut self) {
        self.is_member.fill(false);
        for &player in &self.coalition {
            self.is_member[player] = true;
        }
        self.complement.clear();
        self.complement
            .extend((0..self.n).filter(|&player| !self.is_member[player]));
    }

    /// Adds the contributions of every scenario of the current coalition.
    fn enumerate_scenarios(
        &mut self,
        weights: &[f64],
        results: &mut [f64],
        token: &CancellationToken,
    ) -> Result<(), Cancelled> {
        self.load_complement();
        self.scenarios
            .initialize(self.complement.len(), self.coalition.len());
        while self.scenarios.has_next() {
            token.check()?;
            let scenario = self.scenarios.next();
            credit_scenario(
                weights,
                &self.coalition,
                &self.complement,
                scenario,
                results,
            );
        }
        Ok(())
    }
}

/// Adds the probability of a scenario to the members that convince an
/// opponent in it. `scenario[i]` is the index in the coalition of the member
/// that convinces the opponent `complement[i]`.
#[inline(always)]
fn credit_scenario(
    weights: &[f64],
    coalition: &[usize],
    complement: &[usize],
    scenario: &[usize],
    results: &mut [f64],
) {
    let mut probability = 1.0;
    for (&member, &opponent) in std::iter::zip(scenario, complement) {
        let w = weights[coalition[member]];
        let mut denominator = w + weights[opponent];
        if denominator == 0.0 {
            denominator = 1.0;
        }
        probability *= w / denominator;
    }

    for &member in scenario {
        results[coalition[member]] += probability;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::calculators::test_util::{assert_close, EPSILON};
    use rand::Rng;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaChaRng;
    use rand_distr::Exp;

    const WEIGHTS: [f64; 8] = [0.0, 3.0, 5.0, 8.0, 8.0, 12.0, 13.0, 17.0];
    const EXPECTED: [f64; 8] = [
        0.0, 0.05585, 0.08838, 0.13158, 0.13158, 0.17886, 0.18907, 0.22468,
    ];

    #[test]
    fn test_exact() {
        let mut results = vec![0.0; 8];
        Dpi::new(8)
            .calculate_exact(&WEIGHTS, &mut results, &CancellationToken::new())
            .unwrap();
        assert_close(&results, &EXPECTED, 1e-3);
    }

    #[test]
    fn test_two_players() {
        // Coalition {0} convinces 1 with probability 1/4, coalition {1}
        // convinces 0 with probability 3/4.
        let mut results = vec![0.0; 2];
        Dpi::new(2)
            .calculate_exact(&[1.0, 3.0], &mut results, &CancellationToken::new())
            .unwrap();
        assert_close(&results, &[0.25, 0.75], EPSILON);
    }

    #[test]
    fn test_all_zero_weights_are_nan() {
        let mut results = vec![0.0; 3];
        Dpi::new(3)
            .calculate_exact(&[0.0; 3], &mut results, &CancellationToken::new())
            .unwrap();
        assert!(results.iter().all(|x| x.is_nan()), "{results:?}");
    }

    #[test]
    fn test_size_shares_add_up_to_exact() {
        let token = CancellationToken::new();
        let mut rng = ChaChaRng::seed_from_u64(9);
        let distribution = Exp::new(0.1).unwrap();
        // A single player never convinces anyone.
        for n in 2..=6 {
            let weights: Vec<f64> = (0..n).map(|_| rng.sample(&distribution)).collect();
            let mut dpi = Dpi::new(n);

            let mut exact = vec![0.0; n];
            dpi.calculate_exact(&weights, &mut exact, &token).unwrap();

            let mut shares = vec![0.0; n];
            for size in 0..=n {
                dpi.accumulate_size(&weights, size, &mut shares, &token)
                    .unwrap();
            }
            Dpi::normalize(&mut shares);

            assert_close(&shares, &exact, EPSILON);
            let sum: f64 = exact.iter().sum();
            assert!((sum - 1.0).abs() < EPSILON);
        }
    }

    #[test]
    fn test_monte_carlo_ranks_players() {
        let token = CancellationToken::new();
        let mut dpi = Dpi::new(8);

        let mut exact = vec![0.0; 8];
        dpi.calculate_exact(&WEIGHTS, &mut exact, &token).unwrap();

        let mut results = vec![0.0; 8];
        dpi.calculate_monte_carlo(&WEIGHTS, &mut results, 4_000_000, &token)
            .unwrap();
        Dpi::normalize(&mut results);

        let sum: f64 = results.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON);
        assert_eq!(results[0], 0.0);
        assert!(results[7] > results[1], "{results:?}");
        // Scenarios are drawn uniformly within each coalition, which slightly
        // favors small coalitions.
        assert_close(&results, &exact, 0.03);
    }

    #[test]
    fn test_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let mut results = vec![0.0; 8];
        assert_eq!(
            Dpi::new(8).calculate_exact(&WEIGHTS, &mut results, &token),
            Err(Cancelled)
        );
    }
}

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

//! Power index calculators.
//!
//! Each calculator owns the generators it iterates over, so that repeated
//! calculations on games of the same size don't allocate. A calculator must
//! therefore not be shared between threads: each worker creates its own.
//!
//! The `calculate_*` functions reset their output on entry. The
//! `accumulate_*` functions compute one share of an exact enumeration and add
//! raw counts to their output, so that several shares can be summed before a
//! single call to `normalize()`. All of them poll a [`CancellationToken`] at
//! every generator step, and leave unspecified values in their output when
//! they return [`Cancelled`].
//!
//! [`CancellationToken`]: crate::cancel::CancellationToken
//! [`Cancelled`]: crate::cancel::Cancelled

mod banzhaf;
mod dpi;
mod shapley;

pub use banzhaf::Banzhaf;
pub use dpi::Dpi;
pub use shapley::Shapley;

/// Computes `n!` as a floating-point value. Exact up to `n = 22`.
pub(crate) fn factorial(n: usize) -> f64 {
    (2..=n).fold(1.0, |acc, i| acc * i as f64)
}

/// Sum of the votes of the given players.
#[inline(always)]
fn coalition_votes(votes: &[u32], players: &[usize]) -> u64 {
    players.iter().map(|&player| votes[player] as u64).sum()
}

#[cfg(test)]
pub(crate) mod test_util {
    use rand::Rng;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaChaRng;

    pub const EPSILON: f64 = 1e-9;

    pub fn assert_close(actual: &[f64], expected: &[f64], tolerance: f64) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in std::iter::zip(actual, expected).enumerate() {
            assert!(
                (a - e).abs() < tolerance,
                "player {i}: got {a}, expected {e}\n   actual = {actual:?}\n expected = {expected:?}"
            );
        }
    }

    /// Draws reproducible random games: vote vectors with their quota.
    pub fn random_games(seed: u64, count: usize, max_n: usize) -> Vec<(Vec<u32>, u32)> {
        let mut rng = ChaChaRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let n = rng.gen_range(1..=max_n);
                let votes: Vec<u32> = (0..n).map(|_| rng.gen_range(1..30)).collect();
                let total: u32 = votes.iter().sum();
                let quota = rng.gen_range(1..=total);
                (votes, quota)
            })
            .collect()
    }
}

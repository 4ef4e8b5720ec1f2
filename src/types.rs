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

//! Inputs and outputs of the calculation and simulation services.

use crate::cache::{DEFAULT_CACHE_BITS, MAX_CACHE_BITS};
use std::time::Duration;

/// Input of a single power index calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationParameters {
    /// Votes of each player.
    pub votes: Vec<u32>,
    /// Weights of each player. If present, the DPI is computed instead of the
    /// Shapley-Shubik and Banzhaf indices.
    pub weights: Option<Vec<f64>>,
    /// Votes needed to win.
    pub quota: u32,
    /// Number of Monte-Carlo trials, or zero for an exact calculation.
    pub monte_carlo_count: u64,
}

impl CalculationParameters {
    /// Parameters to compute the Shapley-Shubik and Banzhaf indices.
    pub fn classic(votes: impl Into<Vec<u32>>, quota: u32) -> Self {
        CalculationParameters {
            votes: votes.into(),
            weights: None,
            quota,
            monte_carlo_count: 0,
        }
    }

    /// Parameters to compute the DPI.
    pub fn dpi(weights: impl Into<Vec<f64>>) -> Self {
        CalculationParameters {
            votes: Vec::new(),
            weights: Some(weights.into()),
            quota: 0,
            monte_carlo_count: 0,
        }
    }

    /// Switches to a Monte-Carlo estimation with the given number of trials.
    pub fn with_monte_carlo(mut self, trials: u64) -> Self {
        self.monte_carlo_count = trials;
        self
    }

    /// Number of players.
    pub fn n(&self) -> usize {
        match &self.weights {
            Some(weights) => weights.len(),
            None => self.votes.len(),
        }
    }

    /// Whether the DPI is computed.
    pub fn is_dpi(&self) -> bool {
        self.weights.is_some()
    }
}

/// Input of a sweep simulation.
///
/// The tracked player is the last one. For each of its vote values, the
/// remaining votes are randomly split among the other players, and the
/// change of its indices is measured.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParameters {
    /// Number of players.
    pub n: usize,
    /// Total number of votes, split among all the players.
    pub votes: u32,
    /// Quota of the indices compared to the DPI.
    pub quota: u32,
    /// Quota before the change.
    pub quota_from: u32,
    /// Quota after the change.
    pub quota_to: u32,
    /// Maximal number of votes of the other players, or `None` if
    /// unbounded.
    pub maximum_vote: Option<u32>,
    /// Largest vote value of the tracked player, or zero for all the values
    /// it can have.
    pub simulation_limit: u32,
    /// Number of Monte-Carlo trials of each index computation, or zero for
    /// exact computations.
    pub index_monte_carlo_count: u64,
    /// Number of random vote distributions per vote value of the tracked
    /// player.
    pub monte_carlo_count: u64,
    /// Changes smaller than this in absolute value count as zero.
    pub tolerance: f64,
    /// Vote value of the tracked player when generating distributions.
    pub single_vote: u32,
    /// Whether to compare the indices with the DPI, instead of comparing
    /// quotas.
    pub is_dpi: bool,
    /// Number of bits of the cache capacity.
    pub cache_bits: u32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        SimulationParameters {
            n: 0,
            votes: 0,
            quota: 0,
            quota_from: 0,
            quota_to: 0,
            maximum_vote: None,
            simulation_limit: 0,
            index_monte_carlo_count: 0,
            monte_carlo_count: 0,
            tolerance: 1e-3,
            single_vote: 0,
            is_dpi: false,
            cache_bits: DEFAULT_CACHE_BITS,
        }
    }
}

impl SimulationParameters {
    /// Largest number of votes that a player can hold, when all the others
    /// hold one vote.
    pub fn max_player_votes(&self) -> u32 {
        self.votes + 1 - self.n as u32
    }

    /// Number of vote values of the tracked player covered by the sweep.
    pub fn effective_limit(&self) -> u32 {
        let max = self.max_player_votes();
        if self.simulation_limit > 0 {
            self.simulation_limit.min(max)
        } else {
            max
        }
    }

    /// Number of bits of the cache capacity, at most [`MAX_CACHE_BITS`].
    pub fn effective_cache_bits(&self) -> u32 {
        self.cache_bits.min(MAX_CACHE_BITS)
    }
}

/// Power indices of each player.
#[derive(Debug, Clone, PartialEq)]
pub enum Indices {
    /// Shapley-Shubik and Banzhaf indices.
    Classic {
        /// Shapley-Shubik index of each player.
        shapley: Vec<f64>,
        /// Banzhaf index of each player.
        banzhaf: Vec<f64>,
    },
    /// DPI of each player.
    Dpi {
        /// DPI of each player.
        dpi: Vec<f64>,
    },
}

/// Output of a calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct Results {
    /// Computed indices.
    pub indices: Indices,
    /// Wall-clock duration of the calculation.
    pub elapsed: Duration,
}

/// Statistics of an index change, for one vote value of the tracked player.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeltaRow {
    /// Share of distributions where the index increased.
    pub positive: f64,
    /// Share of distributions where the index decreased.
    pub negative: f64,
    /// Share of distributions where the index didn't change.
    pub zero: f64,
    /// Average change.
    pub mean: f64,
    /// Standard deviation of the change.
    pub stdev: f64,
}

/// Output of a sweep simulation: one row per vote value of the tracked
/// player, starting at one vote.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultDelta {
    /// Changes of the Shapley-Shubik index.
    pub shapley: Vec<DeltaRow>,
    /// Changes of the Banzhaf index.
    pub banzhaf: Vec<DeltaRow>,
    /// Wall-clock duration of the simulation.
    pub elapsed: Duration,
    /// Number of distributions found in the cache.
    pub cache_hits: u64,
    /// Number of distributions stored in the cache.
    pub cache_stores: u64,
}

/// Output of a generation of random distributions for a single vote value of
/// the tracked player.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultDeltaSingle {
    /// Change of the Shapley-Shubik index of the tracked player, for each
    /// distribution.
    pub shapley: Vec<f64>,
    /// Change of the Banzhaf index of the tracked player, for each
    /// distribution.
    pub banzhaf: Vec<f64>,
    /// The generated distributions.
    pub votes: Vec<Vec<u32>>,
    /// Wall-clock duration of the generation.
    pub elapsed: Duration,
}

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

//! Service computing the power indices of a single game.

use super::{Orchestrator, ServiceConfig, ServiceError, TaskContext};
use crate::calculators::{factorial, Banzhaf, Dpi, Shapley};
use crate::cancel::{Cancelled, CancellationToken};
use crate::generators::binomial;
use crate::parallelism::{round_robin, split_evenly};
use crate::types::{CalculationParameters, Indices, Results};
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

/// Computes power indices in the background.
pub struct CalculationService {
    orchestrator: Orchestrator,
}

impl CalculationService {
    /// Creates a service with the given configuration.
    pub fn new(config: ServiceConfig) -> Self {
        CalculationService {
            orchestrator: Orchestrator::new(config),
        }
    }

    /// Cancels the calculations in progress, and starts computing the indices
    /// for the given parameters. The callback receives the indices, or `None`
    /// if the calculation was cancelled.
    ///
    /// Returns an error if the calculation couldn't be queued, in which case
    /// the callback is invoked with `None` before returning.
    pub fn calculate<C>(&self, params: CalculationParameters, callback: C) -> Result<(), ServiceError>
    where
        C: FnOnce(Option<Results>) + Send + 'static,
    {
        self.orchestrator.start(
            "calculate",
            move |context| run_calculation(context, params),
            callback,
        )
    }

    /// Cancels the calculations in progress.
    pub fn cleanup_tasks(&self) {
        self.orchestrator.cleanup_tasks()
    }

    /// Whether a calculation is in progress.
    pub fn is_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    /// Waits for the calculations in progress. Returns false if any of them
    /// was cancelled.
    pub fn wait(&self) -> bool {
        self.orchestrator.wait()
    }

    /// Cancels the calculations in progress, and stops the worker threads.
    pub fn shutdown(&mut self) {
        self.orchestrator.shutdown()
    }
}

/// A slice of the work of a calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkUnit {
    /// Monte-Carlo estimation with the given number of trials.
    MonteCarlo(u64),
    /// Shapley-Shubik orderings starting with the given player.
    Leading(usize),
    /// Banzhaf coalitions of the given size.
    BanzhafSize(usize),
    /// DPI coalitions of the given size.
    DpiSize(usize),
}

impl WorkUnit {
    /// Rough number of operations of this unit, for `n` players.
    fn cost(&self, n: usize) -> f64 {
        let n_f64 = n as f64;
        match *self {
            WorkUnit::MonteCarlo(trials) => trials as f64 * n_f64,
            WorkUnit::Leading(_) => factorial(n - 1) * n_f64,
            WorkUnit::BanzhafSize(k) => binomial(n, k) as f64 * n_f64,
            WorkUnit::DpiSize(k) => {
                binomial(n, k) as f64 * (k as f64).powi((n - k) as i32) * n_f64
            }
        }
    }
}

/// Splits a calculation into groups of work units, one group per worker.
fn plan(params: &CalculationParameters, num_threads: usize) -> Vec<Vec<WorkUnit>> {
    let n = params.n();
    if params.monte_carlo_count > 0 {
        return split_evenly(params.monte_carlo_count, num_threads)
            .into_iter()
            .filter(|&trials| trials > 0)
            .map(|trials| vec![WorkUnit::MonteCarlo(trials)])
            .collect();
    }

    let mut units: Vec<WorkUnit> = if params.is_dpi() {
        (0..=n).map(WorkUnit::DpiSize).collect()
    } else {
        (0..n)
            .map(WorkUnit::Leading)
            .chain((0..=n).map(WorkUnit::BanzhafSize))
            .collect()
    };
    // Deal the most expensive units first.
    units.sort_by(|a, b| b.cost(n).total_cmp(&a.cost(n)));

    round_robin(units, num_threads)
        .into_iter()
        .filter(|group| !group.is_empty())
        .collect()
}

/// Raw counts of the indices, before normalization.
#[derive(Debug, Clone, PartialEq)]
struct PartialIndices {
    shapley: Vec<f64>,
    banzhaf: Vec<f64>,
    dpi: Vec<f64>,
}

impl PartialIndices {
    fn zeros(n: usize) -> Self {
        PartialIndices {
            shapley: vec![0.0; n],
            banzhaf: vec![0.0; n],
            dpi: vec![0.0; n],
        }
    }

    fn reduce(mut self, other: Self) -> Self {
        add_assign(&mut self.shapley, &other.shapley);
        add_assign(&mut self.banzhaf, &other.banzhaf);
        add_assign(&mut self.dpi, &other.dpi);
        self
    }

    /// Normalizes the counts summed over all the work units.
    fn finish(mut self, params: &CalculationParameters) -> Indices {
        if params.is_dpi() {
            Dpi::normalize(&mut self.dpi);
            Indices::Dpi { dpi: self.dpi }
        } else {
            let total = if params.monte_carlo_count > 0 {
                params.monte_carlo_count as f64
            } else {
                factorial(params.n())
            };
            Shapley::normalize(&mut self.shapley, total);
            Banzhaf::normalize(&mut self.banzhaf);
            Indices::Classic {
                shapley: self.shapley,
                banzhaf: self.banzhaf,
            }
        }
    }
}

fn add_assign(acc: &mut [f64], values: &[f64]) {
    for (a, v) in acc.iter_mut().zip(values) {
        *a += v;
    }
}

/// Executes a group of work units on the current thread.
fn execute_units(
    params: &CalculationParameters,
    units: Vec<WorkUnit>,
    token: &CancellationToken,
) -> Result<PartialIndices, Cancelled> {
    let n = params.n();
    let votes = params.votes.as_slice();
    let weights = params.weights.as_deref().unwrap_or_default();
    let quota = params.quota;

    let mut partial = PartialIndices::zeros(n);
    let mut scratch = vec![0.0; n];
    let mut shapley = None;
    let mut banzhaf = None;
    let mut dpi = None;

    for unit in units {
        match unit {
            WorkUnit::MonteCarlo(trials) => {
                if params.is_dpi() {
                    dpi.get_or_insert_with(|| Dpi::new(n))
                        .calculate_monte_carlo(weights, &mut scratch, trials, token)?;
                    add_assign(&mut partial.dpi, &scratch);
                } else {
                    shapley
                        .get_or_insert_with(|| Shapley::new(n))
                        .calculate_monte_carlo(votes, quota, &mut scratch, trials, token)?;
                    add_assign(&mut partial.shapley, &scratch);
                    banzhaf
                        .get_or_insert_with(|| Banzhaf::new(n))
                        .calculate_monte_carlo(votes, quota, &mut scratch, trials, token)?;
                    add_assign(&mut partial.banzhaf, &scratch);
                }
            }
            WorkUnit::Leading(leader) => shapley
                .get_or_insert_with(|| Shapley::new(n))
                .accumulate_leading(votes, quota, leader, &mut partial.shapley, token)?,
            WorkUnit::BanzhafSize(size) => banzhaf
                .get_or_insert_with(|| Banzhaf::new(n))
                .accumulate_size(votes, quota, size, &mut partial.banzhaf, token)?,
            WorkUnit::DpiSize(size) => dpi
                .get_or_insert_with(|| Dpi::new(n))
                .accumulate_size(weights, size, &mut partial.dpi, token)?,
        }
    }
    Ok(partial)
}

/// Body of the orchestration job of a calculation.
fn run_calculation(
    context: &TaskContext,
    params: CalculationParameters,
) -> Result<Results, ServiceError> {
    let start = Instant::now();
    let n = params.n();

    let groups = plan(&params, context.num_threads());
    debug!(
        "Splitting the calculation for {n} players into {} groups",
        groups.len()
    );

    let params = Arc::new(params);
    let shared = Arc::clone(&params);
    let partials = context.execute(groups, move |units, token| {
        execute_units(&shared, units, token)
    })?;
    context.token().check()?;

    let indices = partials
        .into_iter()
        .fold(PartialIndices::zeros(n), PartialIndices::reduce)
        .finish(&params);

    let elapsed = start.elapsed();
    info!("Calculated the indices of {n} players in {elapsed:?}");
    Ok(Results { indices, elapsed })
}

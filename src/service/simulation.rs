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

//! Service running sweep simulations over random vote distributions.

use super::{Orchestrator, ServiceConfig, ServiceError, TaskContext};
use crate::cache::{EntryChecker, SimulationCache};
use crate::calculators::{Banzhaf, Dpi, Shapley};
use crate::cancel::{Cancelled, CancellationToken};
use crate::generators::{Generator, RandomPartitions};
use crate::parallelism::split_evenly;
use crate::types::{DeltaRow, ResultDelta, ResultDeltaSingle, SimulationParameters};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Runs simulations in the background.
pub struct SimulationService {
    orchestrator: Orchestrator,
}

impl SimulationService {
    /// Creates a service with the given configuration.
    pub fn new(config: ServiceConfig) -> Self {
        SimulationService {
            orchestrator: Orchestrator::new(config),
        }
    }

    /// Cancels the simulations in progress, and starts a sweep over the vote
    /// values of the tracked player. The callback receives one row of
    /// statistics per vote value, or `None` if the sweep was cancelled.
    ///
    /// The parameters must describe at least two players, and at least as
    /// many votes as players.
    pub fn simulate<C>(&self, params: SimulationParameters, callback: C) -> Result<(), ServiceError>
    where
        C: FnOnce(Option<ResultDelta>) + Send + 'static,
    {
        self.orchestrator.start(
            "simulate",
            move |context| run_simulation(context, params),
            callback,
        )
    }

    /// Cancels the simulations in progress, and starts generating random
    /// distributions where the tracked player holds
    /// [`SimulationParameters::single_vote`] votes. The callback receives
    /// every distribution with its index deltas, or `None` if the generation
    /// was cancelled.
    pub fn generate<C>(&self, params: SimulationParameters, callback: C) -> Result<(), ServiceError>
    where
        C: FnOnce(Option<ResultDeltaSingle>) + Send + 'static,
    {
        self.orchestrator.start(
            "generate",
            move |context| run_generation(context, params),
            callback,
        )
    }

    /// Cancels the simulations in progress.
    pub fn cleanup_tasks(&self) {
        self.orchestrator.cleanup_tasks()
    }

    /// Whether a simulation is in progress.
    pub fn is_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    /// Waits for the simulations in progress. Returns false if any of them
    /// was cancelled.
    pub fn wait(&self) -> bool {
        self.orchestrator.wait()
    }

    /// Cancels the simulations in progress, and stops the worker threads.
    pub fn shutdown(&mut self) {
        self.orchestrator.shutdown()
    }
}

/// Computes index changes for a vote distribution.
struct DeltaCalculator {
    params: Arc<SimulationParameters>,
    shapley_calculator: Shapley,
    banzhaf_calculator: Banzhaf,
    dpi_calculator: Option<Dpi>,
    weights: Vec<f64>,
    values: Vec<f64>,
    /// Change of the Shapley-Shubik index of each player.
    shapley: Vec<f64>,
    /// Change of the Banzhaf index of each player.
    banzhaf: Vec<f64>,
}

impl DeltaCalculator {
    fn new(params: Arc<SimulationParameters>) -> Self {
        let n = params.n;
        DeltaCalculator {
            shapley_calculator: Shapley::new(n),
            banzhaf_calculator: Banzhaf::new(n),
            dpi_calculator: params.is_dpi.then(|| Dpi::new(n)),
            weights: vec![0.0; n],
            values: vec![0.0; n],
            shapley: vec![0.0; n],
            banzhaf: vec![0.0; n],
            params,
        }
    }

    /// Computes the index changes of all the players: from `quota_from` to
    /// `quota_to`, or from the DPI to the index at `quota` if the
    /// distribution is compared with the DPI.
    fn compute(&mut self, votes: &[u32], token: &CancellationToken) -> Result<(), Cancelled> {
        let trials = self.params.index_monte_carlo_count;

        if let Some(dpi) = &mut self.dpi_calculator {
            let quota = self.params.quota;
            for (w, &v) in self.weights.iter_mut().zip(votes) {
                *w = v as f64;
            }
            shapley_index(
                &mut self.shapley_calculator,
                votes,
                quota,
                trials,
                &mut self.shapley,
                token,
            )?;
            banzhaf_index(
                &mut self.banzhaf_calculator,
                votes,
                quota,
                trials,
                &mut self.banzhaf,
                token,
            )?;
            dpi_index(dpi, &self.weights, trials, &mut self.values, token)?;

            for ((s, b), v) in self
                .shapley
                .iter_mut()
                .zip(self.banzhaf.iter_mut())
                .zip(&self.values)
            {
                *s -= v;
                *b -= v;
            }
        } else {
            let (quota_from, quota_to) = (self.params.quota_from, self.params.quota_to);

            shapley_index(
                &mut self.shapley_calculator,
                votes,
                quota_to,
                trials,
                &mut self.shapley,
                token,
            )?;
            shapley_index(
                &mut self.shapley_calculator,
                votes,
                quota_from,
                trials,
                &mut self.values,
                token,
            )?;
            subtract(&mut self.shapley, &self.values);

            banzhaf_index(
                &mut self.banzhaf_calculator,
                votes,
                quota_to,
                trials,
                &mut self.banzhaf,
                token,
            )?;
            banzhaf_index(
                &mut self.banzhaf_calculator,
                votes,
                quota_from,
                trials,
                &mut self.values,
                token,
            )?;
            subtract(&mut self.banzhaf, &self.values);
        }
        Ok(())
    }
}

fn subtract(values: &mut [f64], other: &[f64]) {
    for (x, y) in values.iter_mut().zip(other) {
        *x -= y;
    }
}

/// Normalized Shapley-Shubik index, estimated if `trials > 0`.
fn shapley_index(
    calculator: &mut Shapley,
    votes: &[u32],
    quota: u32,
    trials: u64,
    results: &mut [f64],
    token: &CancellationToken,
) -> Result<(), Cancelled> {
    if trials > 0 {
        calculator.calculate_monte_carlo(votes, quota, results, trials, token)?;
        Shapley::normalize(results, trials as f64);
    } else {
        calculator.calculate_exact(votes, quota, results, token)?;
    }
    Ok(())
}

/// Normalized Banzhaf index, estimated if `trials > 0`.
fn banzhaf_index(
    calculator: &mut Banzhaf,
    votes: &[u32],
    quota: u32,
    trials: u64,
    results: &mut [f64],
    token: &CancellationToken,
) -> Result<(), Cancelled> {
    if trials > 0 {
        calculator.calculate_monte_carlo(votes, quota, results, trials, token)?;
        Banzhaf::normalize(results);
    } else {
        calculator.calculate_exact(votes, quota, results, token)?;
    }
    Ok(())
}

/// Normalized DPI, estimated if `trials > 0`.
fn dpi_index(
    calculator: &mut Dpi,
    weights: &[f64],
    trials: u64,
    results: &mut [f64],
    token: &CancellationToken,
) -> Result<(), Cancelled> {
    if trials > 0 {
        calculator.calculate_monte_carlo(weights, results, trials, token)?;
        Dpi::normalize(results);
    } else {
        calculator.calculate_exact(weights, results, token)?;
    }
    Ok(())
}

/// Online statistics of index changes (Welford's algorithm).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct RunningStats {
    count: u64,
    positive: u64,
    negative: u64,
    zero: u64,
    mean: f64,
    /// Sum of squared differences from the mean.
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, value: f64, tolerance: f64) {
        if value.abs() < tolerance {
            self.zero += 1;
        } else if value.is_sign_negative() {
            self.negative += 1;
        } else {
            self.positive += 1;
        }

        self.count += 1;
        let previous_mean = self.mean;
        self.mean += (value - previous_mean) / self.count as f64;
        self.m2 += (value - previous_mean) * (value - self.mean);
    }

    /// Unbiased variance estimate.
    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }
}

/// Combines the statistics of all the workers into a row. Counts are divided
/// by the total number of trials, means and variances are averaged over the
/// workers.
fn aggregate<'a>(stats: impl Iterator<Item = &'a RunningStats>, total: u64) -> DeltaRow {
    let mut row = DeltaRow::default();
    let mut workers = 0;
    let mut variance = 0.0;
    for s in stats.filter(|s| s.count > 0) {
        workers += 1;
        row.positive += s.positive as f64;
        row.negative += s.negative as f64;
        row.zero += s.zero as f64;
        row.mean += s.mean;
        variance += s.variance();
    }
    if workers == 0 {
        return row;
    }

    let total = total as f64;
    row.positive /= total;
    row.negative /= total;
    row.zero /= total;
    row.mean /= workers as f64;
    row.stdev = (variance / workers as f64).sqrt();
    row
}

/// State of one worker of a sweep, carried from one vote value to the next.
struct SweepWorker {
    params: Arc<SimulationParameters>,
    cache: Arc<SimulationCache>,
    checker: EntryChecker,
    generator: RandomPartitions,
    delta: DeltaCalculator,
    trials: u64,
    shapley: RunningStats,
    banzhaf: RunningStats,
}

impl SweepWorker {
    fn new(params: Arc<SimulationParameters>, cache: Arc<SimulationCache>, trials: u64) -> Self {
        SweepWorker {
            checker: cache.checker(),
            generator: RandomPartitions::new(params.n - 1),
            delta: DeltaCalculator::new(Arc::clone(&params)),
            params,
            cache,
            trials,
            shapley: RunningStats::default(),
            banzhaf: RunningStats::default(),
        }
    }

    /// Measures the index changes of the tracked player over random
    /// distributions where it holds `fixed` votes.
    fn run(&mut self, fixed: u32, token: &CancellationToken) -> Result<(), Cancelled> {
        let n = self.params.n;
        let tolerance = self.params.tolerance;

        self.shapley = RunningStats::default();
        self.banzhaf = RunningStats::default();
        self.generator
            .initialize(self.params.votes - fixed, self.params.maximum_vote, fixed);

        for _ in 0..self.trials {
            token.check()?;
            let votes = self.generator.next();
            self.checker.set_votes_and_value(votes, votes[n - 1]);

            let (shapley, banzhaf) = match self.cache.get(&mut self.checker) {
                Some(found) => (found.shapley, found.banzhaf),
                None => {
                    self.delta.compute(votes, token)?;
                    self.cache
                        .store(&mut self.checker, &self.delta.shapley, &self.delta.banzhaf);
                    (self.delta.shapley[n - 1], self.delta.banzhaf[n - 1])
                }
            };

            self.shapley.push(shapley, tolerance);
            self.banzhaf.push(banzhaf, tolerance);
        }
        Ok(())
    }
}

/// Body of the orchestration job of a sweep.
fn run_simulation(
    context: &TaskContext,
    params: SimulationParameters,
) -> Result<ResultDelta, ServiceError> {
    let start = Instant::now();

    let limit = params.effective_limit();
    if params.simulation_limit > limit {
        warn!(
            "Simulation limit {} is above the maximal vote value {limit}, using {limit} instead",
            params.simulation_limit
        );
    }
    let mc = params.monte_carlo_count;

    let cache_bits = params.effective_cache_bits();
    if cache_bits != params.cache_bits {
        warn!(
            "Cache of 2^{} entries is too large, using 2^{cache_bits} entries instead",
            params.cache_bits
        );
    }
    let cache = Arc::new(SimulationCache::new(
        params.n,
        params.max_player_votes(),
        cache_bits,
    ));
    let params = Arc::new(params);

    let mut workers: Vec<SweepWorker> = split_evenly(mc, context.num_threads())
        .into_iter()
        .filter(|&trials| trials > 0)
        .map(|trials| SweepWorker::new(Arc::clone(&params), Arc::clone(&cache), trials))
        .collect();

    let mut shapley = Vec::with_capacity(limit as usize);
    let mut banzhaf = Vec::with_capacity(limit as usize);
    for fixed in 1..=limit {
        workers = context.execute(workers, move |mut worker, token| {
            worker.run(fixed, token)?;
            Ok(worker)
        })?;

        shapley.push(aggregate(workers.iter().map(|w| &w.shapley), mc));
        banzhaf.push(aggregate(workers.iter().map(|w| &w.banzhaf), mc));
        debug!("[simulate] Completed vote value {fixed}/{limit}");
    }

    info!(
        "Simulation had {} cache hits and {} cache stores out of {} scenarios",
        cache.hits(),
        cache.stores(),
        limit as u64 * mc
    );

    Ok(ResultDelta {
        shapley,
        banzhaf,
        elapsed: start.elapsed(),
        cache_hits: cache.hits(),
        cache_stores: cache.stores(),
    })
}

/// Output of one worker of a generation.
struct GeneratedShare {
    shapley: Vec<f64>,
    banzhaf: Vec<f64>,
    votes: Vec<Vec<u32>>,
}

/// Draws `count` distributions where the tracked player holds `fixed`
/// votes, and computes their deltas.
fn generate_share(
    params: &Arc<SimulationParameters>,
    fixed: u32,
    count: u64,
    token: &CancellationToken,
) -> Result<GeneratedShare, Cancelled> {
    let n = params.n;
    let mut generator = RandomPartitions::new(n - 1);
    generator.initialize(params.votes - fixed, params.maximum_vote, fixed);
    let mut delta = DeltaCalculator::new(Arc::clone(params));

    let mut share = GeneratedShare {
        shapley: Vec::with_capacity(count as usize),
        banzhaf: Vec::with_capacity(count as usize),
        votes: Vec::with_capacity(count as usize),
    };
    for _ in 0..count {
        token.check()?;
        let votes = generator.next();
        delta.compute(votes, token)?;
        share.votes.push(votes.to_vec());
        share.shapley.push(delta.shapley[n - 1]);
        share.banzhaf.push(delta.banzhaf[n - 1]);
    }
    Ok(share)
}

/// Body of the orchestration job of a generation.
fn run_generation(
    context: &TaskContext,
    params: SimulationParameters,
) -> Result<ResultDeltaSingle, ServiceError> {
    let start = Instant::now();

    let fixed = params.single_vote.clamp(1, params.max_player_votes());
    if fixed != params.single_vote {
        warn!(
            "Vote value {} is out of range, using {fixed} instead",
            params.single_vote
        );
    }
    let counts: Vec<u64> = split_evenly(params.monte_carlo_count, context.num_threads())
        .into_iter()
        .filter(|&count| count > 0)
        .collect();

    let params = Arc::new(params);
    let shared = Arc::clone(&params);
    let shares = context.execute(counts, move |count, token| {
        generate_share(&shared, fixed, count, token)
    })?;

    let total = params.monte_carlo_count as usize;
    let mut output = ResultDeltaSingle {
        shapley: Vec::with_capacity(total),
        banzhaf: Vec::with_capacity(total),
        votes: Vec::with_capacity(total),
        elapsed: Default::default(),
    };
    for share in shares {
        output.shapley.extend(share.shapley);
        output.banzhaf.extend(share.banzhaf);
        output.votes.extend(share.votes);
    }
    output.elapsed = start.elapsed();
    debug!(
        "[generate] Generated {} distributions in {:?}",
        output.votes.len(),
        output.elapsed
    );
    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::service::Parallel;
    use std::num::NonZeroUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    fn service(parallel: Parallel, num_threads: usize) -> SimulationService {
        SimulationService::new(ServiceConfig {
            num_threads: NonZeroUsize::new(num_threads).unwrap(),
            queue_capacity: 64,
            parallel,
            pin_threads: false,
        })
    }

    fn simulate(service: &SimulationService, params: SimulationParameters) -> Option<ResultDelta> {
        let (tx, rx) = mpsc::channel();
        service
            .simulate(params, move |result| tx.send(result).unwrap())
            .unwrap();
        rx.recv().unwrap()
    }

    fn generate(
        service: &SimulationService,
        params: SimulationParameters,
    ) -> Option<ResultDeltaSingle> {
        let (tx, rx) = mpsc::channel();
        service
            .generate(params, move |result| tx.send(result).unwrap())
            .unwrap();
        rx.recv().unwrap()
    }

    fn assert_row(row: &DeltaRow, expected: &DeltaRow) {
        for (actual, expected) in [
            (row.positive, expected.positive),
            (row.negative, expected.negative),
            (row.zero, expected.zero),
            (row.mean, expected.mean),
            (row.stdev, expected.stdev),
        ] {
            assert!(
                (actual - expected).abs() < 1e-9,
                "\n   actual = {row:?}\n expected = {expected:?}"
            );
        }
    }

    fn two_players() -> SimulationParameters {
        // The other player holds the remaining votes, so every distribution
        // is determined by the tracked player's vote value.
        SimulationParameters {
            n: 2,
            votes: 10,
            quota_from: 1,
            quota_to: 6,
            monte_carlo_count: 20,
            ..Default::default()
        }
    }

    macro_rules! simulation_tests {
        ( $( $mod:ident: $parallel:expr, $num_threads:expr, )+ ) => {
            $(
                mod $mod {
                    use super::*;

                    #[test]
                    fn test_two_players_sweep() {
                        let service = service($parallel, $num_threads);
                        let result = simulate(&service, two_players()).unwrap();
                        assert_eq!(result.shapley.len(), 9);
                        assert_eq!(result.banzhaf.len(), 9);

                        let lose = DeltaRow { negative: 1.0, mean: -0.5, ..Default::default() };
                        let tie = DeltaRow { zero: 1.0, ..Default::default() };
                        let win = DeltaRow { positive: 1.0, mean: 0.5, ..Default::default() };
                        for (i, (shapley, banzhaf)) in
                            std::iter::zip(&result.shapley, &result.banzhaf).enumerate()
                        {
                            let expected = match i + 1 {
                                1..=4 => &lose,
                                5 => &tie,
                                _ => &win,
                            };
                            assert_row(shapley, expected);
                            assert_row(banzhaf, expected);
                        }

                        // Only one distribution per vote value.
                        assert!(result.cache_stores <= 9 * $num_threads);
                        assert!(result.cache_hits + result.cache_stores <= 9 * 20);
                    }

                    #[test]
                    fn test_sweep_shares_sum_to_one() {
                        let service = service($parallel, $num_threads);
                        let params = SimulationParameters {
                            n: 5,
                            votes: 30,
                            quota_from: 16,
                            quota_to: 21,
                            simulation_limit: 6,
                            monte_carlo_count: 100,
                            ..Default::default()
                        };
                        let result = simulate(&service, params).unwrap();
                        assert_eq!(result.shapley.len(), 6);
                        for row in result.shapley.iter().chain(&result.banzhaf) {
                            let sum = row.positive + row.negative + row.zero;
                            assert!((sum - 1.0).abs() < 1e-9, "{row:?}");
                            assert!(row.mean.abs() <= 1.0);
                            assert!(row.stdev >= 0.0);
                        }
                    }

                    #[test]
                    fn test_generate() {
                        let service = service($parallel, $num_threads);
                        let params = SimulationParameters {
                            n: 4,
                            votes: 20,
                            quota_from: 11,
                            quota_to: 14,
                            maximum_vote: Some(7),
                            monte_carlo_count: 50,
                            single_vote: 5,
                            ..Default::default()
                        };
                        let result = generate(&service, params).unwrap();
                        assert_eq!(result.votes.len(), 50);
                        assert_eq!(result.shapley.len(), 50);
                        assert_eq!(result.banzhaf.len(), 50);
                        for votes in &result.votes {
                            assert_eq!(votes.len(), 4);
                            assert_eq!(votes.iter().sum::<u32>(), 20);
                            assert_eq!(votes[3], 5);
                            assert!(votes[..3].iter().all(|&v| (1..=7).contains(&v)));
                        }
                    }
                }
            )+
        };
    }

    simulation_tests! {
        sequential: Parallel::No, 1,
        rayon: Parallel::Rayon, 3,
        custom_single: Parallel::Custom, 1,
        custom_four: Parallel::Custom, 4,
    }

    #[test]
    fn test_single_thread_cache_accounting() {
        let service = service(Parallel::Custom, 1);
        let params = SimulationParameters {
            n: 4,
            votes: 16,
            quota_from: 9,
            quota_to: 12,
            monte_carlo_count: 200,
            ..Default::default()
        };
        let result = simulate(&service, params).unwrap();
        // Without concurrent stores, every lookup is either a hit or a miss
        // followed by a store.
        assert_eq!(result.cache_hits + result.cache_stores, 13 * 200);
        assert!(result.cache_hits > result.cache_stores);
    }

    #[test]
    fn test_dpi_sweep() {
        let service = service(Parallel::Custom, 2);
        let params = SimulationParameters {
            n: 3,
            votes: 12,
            quota: 7,
            monte_carlo_count: 40,
            is_dpi: true,
            ..Default::default()
        };
        let result = simulate(&service, params).unwrap();
        assert_eq!(result.shapley.len(), 10);
        for row in result.shapley.iter().chain(&result.banzhaf) {
            assert!(!row.mean.is_nan());
            let sum = row.positive + row.negative + row.zero;
            assert!((sum - 1.0).abs() < 1e-9, "{row:?}");
        }
    }

    #[test]
    fn test_estimated_sweep() {
        let service = service(Parallel::Custom, 2);
        let params = SimulationParameters {
            index_monte_carlo_count: 2_000,
            tolerance: 0.1,
            ..two_players()
        };
        let result = simulate(&service, params).unwrap();
        // Estimates within the tolerance of zero count as no change.
        assert!(result.shapley[4].zero > 0.9);
        assert!(result.shapley[0].negative > 0.9);
        assert!(result.shapley[8].positive > 0.9);
    }

    #[test]
    fn test_simulation_limit_is_clamped() {
        let service = service(Parallel::No, 1);
        let params = SimulationParameters {
            simulation_limit: 100,
            ..two_players()
        };
        assert_eq!(simulate(&service, params).unwrap().shapley.len(), 9);
    }

    #[test]
    fn test_cancel_then_reuse() {
        let service = service(Parallel::Custom, 2);
        let params = SimulationParameters {
            n: 9,
            votes: 1000,
            quota_from: 300,
            quota_to: 700,
            monte_carlo_count: 1_000_000,
            ..Default::default()
        };
        let (tx, rx) = mpsc::channel();
        service
            .simulate(params, move |result| tx.send(result).unwrap())
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(service.is_running());
        service.cleanup_tasks();
        assert_eq!(rx.recv().unwrap(), None);

        let result = simulate(&service, two_players()).unwrap();
        assert_eq!(result.shapley.len(), 9);
        assert!(service.wait());
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [1.0, 2.0, 3.0, 4.0, 0.0005, -2.0] {
            stats.push(value, 1e-3);
        }
        assert_eq!(stats.count, 6);
        assert_eq!(stats.positive, 4);
        assert_eq!(stats.negative, 1);
        assert_eq!(stats.zero, 1);

        let values = [1.0, 2.0, 3.0, 4.0, 0.0005, -2.0];
        let mean = values.iter().sum::<f64>() / 6.0;
        let variance = values.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / 5.0;
        assert!((stats.mean - mean).abs() < 1e-12);
        assert!((stats.variance() - variance).abs() < 1e-12);
    }

    #[test]
    fn test_running_stats_negative_zero() {
        let mut stats = RunningStats::default();
        stats.push(-0.0, 1e-3);
        stats.push(-1e-4, 1e-3);
        assert_eq!(stats.zero, 2);
        assert!(stats.variance() >= 0.0);
    }

    #[test]
    fn test_aggregate() {
        let mut a = RunningStats::default();
        let mut b = RunningStats::default();
        for value in [1.0, 3.0] {
            a.push(value, 1e-3);
        }
        for value in [-1.0, 0.0] {
            b.push(value, 1e-3);
        }
        let idle = RunningStats::default();

        let row = aggregate([a, b, idle].iter(), 4);
        assert_row(
            &row,
            &DeltaRow {
                positive: 0.5,
                negative: 0.25,
                zero: 0.25,
                mean: (2.0 - 0.5) / 2.0,
                stdev: ((2.0 + 0.5) / 2.0f64).sqrt(),
            },
        );
        assert_eq!(aggregate(std::iter::empty(), 0), DeltaRow::default());
    }
}

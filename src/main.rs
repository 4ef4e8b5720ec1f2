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

//! Command-line program for voting power indices.

#![deny(missing_docs)]
#![forbid(unsafe_code)]

use clap::{Args, Parser, Subcommand};
use log::info;
use picalc_rs::{
    csv::{write_calculation, write_generation, write_simulation},
    properties::{validate_calculation, SimulationSettings},
    service::{CalculationService, Parallel, ServiceConfig, SimulationService},
    types::{CalculationParameters, SimulationParameters},
};
use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::mpsc;

/// Rust implementation of voting power index calculations and simulations.
#[derive(Parser, Debug, PartialEq)]
struct Cli {
    /// Number of worker threads. Defaults to the number of CPUs for
    /// calculations, and to the `threads` setting for simulations.
    #[arg(long, global = true)]
    threads: Option<NonZeroUsize>,

    /// Strategy to execute the work units of a calculation.
    #[arg(long, value_enum, global = true, default_value_t = Parallel::Custom)]
    parallel: Parallel,

    /// Pin the worker threads to CPUs.
    #[arg(long, global = true)]
    pin_threads: bool,

    #[command(subcommand)]
    command: Command,
}

/// Operation to run.
#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Compute the power indices of a single game.
    Calculate(CalculateArgs),
    /// Sweep the vote values of the last player, and measure how its indices
    /// change.
    Simulate(SimulationArgs),
    /// Generate random distributions where the last player holds a given
    /// number of votes, and measure how its indices change.
    Generate(SimulationArgs),
}

/// Game of a single calculation.
#[derive(Args, Debug, PartialEq)]
struct CalculateArgs {
    /// Comma-separated votes of the players.
    #[arg(
        long,
        value_delimiter = ',',
        required_unless_present = "weights",
        conflicts_with = "weights"
    )]
    votes: Vec<u32>,

    /// Comma-separated weights of the players, to compute the DPI.
    #[arg(long, value_delimiter = ',')]
    weights: Vec<f64>,

    /// Votes needed to win.
    #[arg(long, default_value_t = 0)]
    quota: u32,

    /// Number of Monte-Carlo trials, or 0 for an exact calculation.
    #[arg(long, default_value_t = 0)]
    monte_carlo: u64,
}

impl CalculateArgs {
    fn parameters(&self) -> CalculationParameters {
        let params = if self.weights.is_empty() {
            CalculationParameters::classic(self.votes.clone(), self.quota)
        } else {
            CalculationParameters::dpi(self.weights.clone())
        };
        params.with_monte_carlo(self.monte_carlo)
    }
}

/// Settings of a simulation, read from a properties file and/or flags. Flags
/// take precedence over the file.
#[derive(Args, Debug, PartialEq)]
struct SimulationArgs {
    /// Properties file with the simulation settings.
    #[arg(long)]
    properties: Option<PathBuf>,

    /// Number of players.
    #[arg(long, required_unless_present = "properties")]
    players: Option<i64>,

    /// Total number of votes.
    #[arg(long, required_unless_present = "properties")]
    votes: Option<i64>,

    /// Quota of the indices compared with the DPI.
    #[arg(long)]
    quota: Option<i64>,

    /// Quota before the change.
    #[arg(long, required_unless_present = "properties")]
    quota_from: Option<i64>,

    /// Quota after the change.
    #[arg(long, required_unless_present = "properties")]
    quota_to: Option<i64>,

    /// Maximal number of votes of each random player, or -1 if unbounded.
    #[arg(long, allow_hyphen_values = true)]
    max_random_vote: Option<i64>,

    /// Number of vote values to sweep, or 0 for the smaller quota.
    #[arg(long)]
    simulation_limit: Option<i64>,

    /// Number of random distributions per vote value.
    #[arg(long, required_unless_present = "properties")]
    simulation_mc: Option<i64>,

    /// Number of Monte-Carlo trials per index computation, or 0 for exact
    /// computations.
    #[arg(long)]
    index_estimation_mc: Option<i64>,

    /// Index changes smaller than this count as zero.
    #[arg(long)]
    epsilon: Option<f64>,

    /// Compare the indices with the DPI, instead of comparing two quotas.
    #[arg(long)]
    dpi: bool,

    /// Votes of the last player, for generations.
    #[arg(long)]
    single_vote: Option<i64>,

    /// Base-2 logarithm of the cache capacity.
    #[arg(
        long,
        default_value_t = picalc_rs::cache::DEFAULT_CACHE_BITS,
        value_parser = clap::value_parser!(u32).range(..=picalc_rs::cache::MAX_CACHE_BITS as i64)
    )]
    cache_bits: u32,
}

impl SimulationArgs {
    /// Merges the properties file and the flags.
    fn settings(&self, threads: Option<NonZeroUsize>) -> Result<SimulationSettings, Box<dyn Error>> {
        let mut settings = match &self.properties {
            Some(path) => SimulationSettings::read(BufReader::new(File::open(path)?))?,
            None => SimulationSettings::default(),
        };

        macro_rules! override_settings {
            ( $( $field:ident ),+ ) => {
                $(
                    if let Some(value) = self.$field {
                        settings.$field = value;
                    }
                )+
            };
        }
        override_settings!(
            players,
            votes,
            quota,
            quota_from,
            quota_to,
            max_random_vote,
            simulation_limit,
            simulation_mc,
            index_estimation_mc,
            epsilon,
            single_vote
        );
        settings.dpi |= self.dpi;
        if let Some(threads) = threads {
            settings.threads = threads.get() as i64;
        }
        Ok(settings)
    }

    fn setup(
        &self,
        threads: Option<NonZeroUsize>,
    ) -> Result<(SimulationParameters, NonZeroUsize), Box<dyn Error>> {
        let setup = self.settings(threads)?.validate()?;
        let params = SimulationParameters {
            cache_bits: self.cache_bits,
            ..setup.params
        };
        Ok((params, setup.threads))
    }
}

impl Cli {
    fn config(&self, num_threads: NonZeroUsize) -> ServiceConfig {
        ServiceConfig {
            num_threads,
            parallel: self.parallel,
            pin_threads: self.pin_threads,
            ..Default::default()
        }
    }

    /// Runs the command, and writes its results to the standard output.
    fn run(self) -> Result<(), Box<dyn Error>> {
        match &self.command {
            Command::Calculate(args) => {
                let params = args.parameters();
                validate_calculation(&params)?;
                let threads = self
                    .threads
                    .unwrap_or_else(|| ServiceConfig::default().num_threads);

                let mut service = CalculationService::new(self.config(threads));
                let (tx, rx) = mpsc::channel();
                service.calculate(params.clone(), move |results| {
                    tx.send(results).ok();
                })?;
                let results = rx.recv()?.ok_or("The calculation was not completed.")?;
                info!("Finished in {:?}", results.elapsed);
                write_calculation(&mut io::stdout().lock(), &params, &results)?;
                service.shutdown();
            }
            Command::Simulate(args) => {
                let (params, threads) = args.setup(self.threads)?;

                let mut service = SimulationService::new(self.config(threads));
                let (tx, rx) = mpsc::channel();
                service.simulate(params, move |result| {
                    tx.send(result).ok();
                })?;
                let result = rx.recv()?.ok_or("The simulation was not completed.")?;
                info!("Finished in {:?}", result.elapsed);
                write_simulation(&mut io::stdout().lock(), &result)?;
                service.shutdown();
            }
            Command::Generate(args) => {
                let (params, threads) = args.setup(self.threads)?;
                if args.single_vote.is_none() && args.properties.is_none() {
                    return Err("A generation needs a --single-vote value!".into());
                }

                let mut service = SimulationService::new(self.config(threads));
                let (tx, rx) = mpsc::channel();
                service.generate(params, move |result| {
                    tx.send(result).ok();
                })?;
                let result = rx.recv()?.ok_or("The generation was not completed.")?;
                info!("Finished in {:?}", result.elapsed);
                write_generation(&mut io::stdout().lock(), &result)?;
                service.shutdown();
            }
        }
        Ok(())
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(e) = cli.run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

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

//! Module to read and validate simulation settings from properties files.
//!
//! A properties file contains one `key=value` (or `key: value`) pair per
//! line. Blank lines and lines starting with `#` or `!` are ignored.

use crate::types::{CalculationParameters, SimulationParameters};
use log::{info, warn};
use regex::Regex;
use std::collections::HashMap;
use std::error::Error;
use std::io::BufRead;
use std::num::NonZeroUsize;
use std::str::FromStr;

/// Largest number of players, and largest total number of votes.
pub const MAX_VOTES: i64 = 32767;

/// Largest number of players for which indices are computed exactly.
pub const MAX_EXACT_PLAYERS: i64 = 15;

const KNOWN_KEYS: &[&str] = &[
    "players",
    "votes",
    "quota",
    "quotaFrom",
    "quotaTo",
    "maxRandomVote",
    "simulationLimit",
    "simulationMC",
    "indexEstimationMC",
    "epsilon",
    "dpi",
    "threads",
    "singleVote",
];

/// Reads the key/value pairs of a properties file.
pub fn parse_properties(input: impl BufRead) -> Result<HashMap<String, String>, Box<dyn Error>> {
    let re_comment = Regex::new(r"^\s*(?:[#!].*)?$").unwrap();
    let re_pair = Regex::new(r"^\s*([A-Za-z][A-Za-z0-9_.]*)\s*[=:]\s*(.*?)\s*$").unwrap();

    let mut properties = HashMap::new();
    for (i, line) in input.lines().enumerate() {
        let line = line?;
        if re_comment.is_match(&line) {
            continue;
        }
        let captures = re_pair
            .captures(&line)
            .ok_or_else(|| format!("Invalid line {} in properties file: {line}", i + 1))?;
        let key = captures[1].to_owned();
        let value = captures[2].to_owned();
        if !KNOWN_KEYS.contains(&key.as_str()) {
            warn!("Unknown property: {key}");
        }
        if properties.insert(key.clone(), value).is_some() {
            warn!("Property {key} is set twice, keeping the last value");
        }
    }
    Ok(properties)
}

/// Raw simulation settings, as written by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    /// Number of players.
    pub players: i64,
    /// Total number of votes.
    pub votes: i64,
    /// Quota of the indices compared with the DPI.
    pub quota: i64,
    /// Quota before the change.
    pub quota_from: i64,
    /// Quota after the change.
    pub quota_to: i64,
    /// Maximal number of votes of a random player, or below 1 if
    /// unbounded.
    pub max_random_vote: i64,
    /// Number of vote values to sweep, or below 1 for the default.
    pub simulation_limit: i64,
    /// Number of random distributions per vote value.
    pub simulation_mc: i64,
    /// Number of Monte-Carlo trials per index computation, or 0 for exact
    /// computations.
    pub index_estimation_mc: i64,
    /// Changes smaller than this count as zero.
    pub epsilon: f64,
    /// Whether to compare the indices with the DPI.
    pub dpi: bool,
    /// Number of worker threads.
    pub threads: i64,
    /// Vote value of the tracked player, for generations.
    pub single_vote: i64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            players: 0,
            votes: 0,
            quota: 0,
            quota_from: 0,
            quota_to: 0,
            max_random_vote: -1,
            simulation_limit: 0,
            simulation_mc: 0,
            index_estimation_mc: 0,
            epsilon: 0.001,
            dpi: false,
            threads: 1,
            single_vote: 0,
        }
    }
}

/// Validated simulation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSetup {
    /// Parameters of the simulation service.
    pub params: SimulationParameters,
    /// Number of worker threads.
    pub threads: NonZeroUsize,
}

fn required<T>(properties: &HashMap<String, String>, key: &str) -> Result<T, Box<dyn Error>>
where
    T: FromStr,
    T::Err: Error + 'static,
{
    let value = properties
        .get(key)
        .ok_or_else(|| format!("Missing property: {key}"))?;
    value
        .parse()
        .map_err(|e| format!("Invalid value for property {key} ({value:?}): {e}").into())
}

fn optional<T>(
    properties: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, Box<dyn Error>>
where
    T: FromStr,
    T::Err: Error + 'static,
{
    if properties.contains_key(key) {
        required(properties, key)
    } else {
        Ok(default)
    }
}

impl SimulationSettings {
    /// Reads the settings from the key/value pairs of a properties file.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, Box<dyn Error>> {
        let defaults = SimulationSettings::default();
        let settings = SimulationSettings {
            players: required(properties, "players")?,
            votes: required(properties, "votes")?,
            quota: optional(properties, "quota", defaults.quota)?,
            quota_from: required(properties, "quotaFrom")?,
            quota_to: required(properties, "quotaTo")?,
            max_random_vote: optional(properties, "maxRandomVote", defaults.max_random_vote)?,
            simulation_limit: optional(properties, "simulationLimit", defaults.simulation_limit)?,
            simulation_mc: required(properties, "simulationMC")?,
            index_estimation_mc: optional(
                properties,
                "indexEstimationMC",
                defaults.index_estimation_mc,
            )?,
            epsilon: optional(properties, "epsilon", defaults.epsilon)?,
            dpi: properties
                .get("dpi")
                .is_some_and(|value| value.eq_ignore_ascii_case("true")),
            threads: optional(properties, "threads", defaults.threads)?,
            single_vote: optional(properties, "singleVote", defaults.single_vote)?,
        };
        info!("Simulation properties loaded: {settings:?}");
        Ok(settings)
    }

    /// Reads the settings from a properties file.
    pub fn read(input: impl BufRead) -> Result<Self, Box<dyn Error>> {
        Self::from_properties(&parse_properties(input)?)
    }

    /// Checks the settings, and turns them into service parameters.
    pub fn validate(&self) -> Result<SimulationSetup, Box<dyn Error>> {
        if self.threads < 1 {
            return Err("Number of threads must be at least 1".into());
        }
        if self.players < 2 || self.players > MAX_VOTES {
            return Err(format!("Too few or too many players! (Can be 2 to {MAX_VOTES})").into());
        }
        if self.players > MAX_EXACT_PLAYERS && self.index_estimation_mc < 1 {
            return Err(
                "Must do MC estimation with this many players! Specify an indexEstimationMC value."
                    .into(),
            );
        }
        if self.index_estimation_mc < 0 {
            return Err("IndexEstimationMC value cannot be negative!".into());
        }
        if self.votes < self.players {
            return Err("Not enough votes for players!".into());
        }
        if self.votes > MAX_VOTES {
            return Err(format!("Too many total votes! (Can be 1 to {MAX_VOTES})").into());
        }
        if self.quota_from < 1 {
            return Err("QuotaFrom value needs to be at least one!".into());
        }
        if self.quota_to < 1 {
            return Err("QuotaTo value needs to be at least one!".into());
        }
        if self.simulation_mc < 1 {
            return Err("SimulationMC value needs to be at least one!".into());
        }
        if self.dpi && self.quota < 1 {
            return Err("Quota value needs to be at least one!".into());
        }
        if self.epsilon <= 0.0 || self.epsilon >= 1.0 {
            return Err("Epsilon needs the be greater than 0 but less than 1.".into());
        }
        let max_player_votes = self.votes - self.players + 1;
        if self.single_vote > max_player_votes {
            return Err(format!(
                "SingleVote value is too large! (Can be 1 to {max_player_votes})"
            )
            .into());
        }

        let simulation_limit = if self.simulation_limit < 1 {
            if self.dpi {
                self.quota
            } else {
                self.quota_from.min(self.quota_to)
            }
        } else {
            self.simulation_limit
        };

        let params = SimulationParameters {
            n: self.players as usize,
            votes: self.votes as u32,
            quota: self.quota.max(0) as u32,
            quota_from: self.quota_from as u32,
            quota_to: self.quota_to as u32,
            maximum_vote: (self.max_random_vote >= 1)
                .then(|| self.max_random_vote.min(MAX_VOTES) as u32),
            simulation_limit: simulation_limit.min(MAX_VOTES) as u32,
            index_monte_carlo_count: self.index_estimation_mc as u64,
            monte_carlo_count: self.simulation_mc as u64,
            tolerance: self.epsilon,
            single_vote: self.single_vote.max(1) as u32,
            is_dpi: self.dpi,
            ..Default::default()
        };
        let threads = NonZeroUsize::new(self.threads as usize)
            .ok_or("Number of threads must be at least 1")?;
        Ok(SimulationSetup { params, threads })
    }
}

/// Checks the parameters of a single calculation.
pub fn validate_calculation(params: &CalculationParameters) -> Result<(), Box<dyn Error>> {
    let n = params.n() as i64;
    if n < 2 || n > MAX_VOTES {
        return Err(format!("Too few or too many players! (Can be 2 to {MAX_VOTES})").into());
    }
    if n > MAX_EXACT_PLAYERS && params.monte_carlo_count == 0 {
        return Err("Must do MC estimation with this many players!".into());
    }
    match &params.weights {
        Some(weights) => {
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err("Weights must be non-negative numbers!".into());
            }
        }
        None => {
            if params.quota < 1 {
                return Err("Quota value needs to be at least one!".into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    const SIMULATION: &str = "\
# Quota change simulation
players=5
votes = 100
quota=0
quotaFrom=51
quotaTo: 67
maxRandomVote=-1

simulationLimit=0
simulationMC=1000
indexEstimationMC=0
epsilon=0.001
dpi=false
threads=4
";

    fn settings(input: &str) -> SimulationSettings {
        SimulationSettings::read(input.as_bytes()).unwrap()
    }

    fn validation_error(settings: SimulationSettings) -> String {
        settings.validate().unwrap_err().to_string()
    }

    #[test]
    fn test_parse_properties() {
        let properties = parse_properties(SIMULATION.as_bytes()).unwrap();
        assert_eq!(properties.len(), 12);
        assert_eq!(properties["votes"], "100");
        assert_eq!(properties["quotaTo"], "67");
        assert_eq!(properties["dpi"], "false");
    }

    #[test]
    fn test_parse_properties_invalid_line() {
        let err = parse_properties("players=5\n=3\n".as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid line 2 in properties file: =3");
    }

    #[test]
    fn test_read_settings() {
        assert_eq!(
            settings(SIMULATION),
            SimulationSettings {
                players: 5,
                votes: 100,
                quota: 0,
                quota_from: 51,
                quota_to: 67,
                max_random_vote: -1,
                simulation_limit: 0,
                simulation_mc: 1000,
                index_estimation_mc: 0,
                epsilon: 0.001,
                dpi: false,
                threads: 4,
                single_vote: 0,
            }
        );
    }

    #[test]
    fn test_missing_property() {
        let err = SimulationSettings::read("players=5\n".as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "Missing property: votes");
    }

    #[test]
    fn test_invalid_property() {
        let input = SIMULATION.replace("votes = 100", "votes = many");
        let err = SimulationSettings::read(input.as_bytes()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for property votes (\"many\"): invalid digit found in string"
        );
    }

    #[test]
    fn test_validate() {
        let setup = settings(SIMULATION).validate().unwrap();
        assert_eq!(setup.threads.get(), 4);
        assert_eq!(
            setup.params,
            SimulationParameters {
                n: 5,
                votes: 100,
                quota: 0,
                quota_from: 51,
                quota_to: 67,
                maximum_vote: None,
                // The smaller quota by default.
                simulation_limit: 51,
                index_monte_carlo_count: 0,
                monte_carlo_count: 1000,
                tolerance: 0.001,
                single_vote: 1,
                is_dpi: false,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_validate_dpi_limit() {
        let setup = SimulationSettings {
            dpi: true,
            quota: 40,
            max_random_vote: 30,
            ..settings(SIMULATION)
        }
        .validate()
        .unwrap();
        assert!(setup.params.is_dpi);
        assert_eq!(setup.params.simulation_limit, 40);
        assert_eq!(setup.params.maximum_vote, Some(30));
    }

    macro_rules! validation_tests {
        ( $( $case:ident: { $($field:ident: $value:expr),+ } => $message:expr, )+ ) => {
            $(
                #[test]
                fn $case() {
                    let settings = SimulationSettings {
                        $($field: $value,)+
                        ..settings(SIMULATION)
                    };
                    assert_eq!(validation_error(settings), $message);
                }
            )+
        };
    }

    validation_tests! {
        test_no_threads: { threads: 0 } => "Number of threads must be at least 1",
        test_one_player: { players: 1 } => "Too few or too many players! (Can be 2 to 32767)",
        test_too_many_players: { players: 40000, votes: 40000 }
            => "Too few or too many players! (Can be 2 to 32767)",
        test_exact_too_many_players: { players: 16 }
            => "Must do MC estimation with this many players! Specify an indexEstimationMC value.",
        test_not_enough_votes: { votes: 4 } => "Not enough votes for players!",
        test_too_many_votes: { votes: 40000 } => "Too many total votes! (Can be 1 to 32767)",
        test_quota_from: { quota_from: 0 } => "QuotaFrom value needs to be at least one!",
        test_quota_to: { quota_to: -3 } => "QuotaTo value needs to be at least one!",
        test_simulation_mc: { simulation_mc: 0 } => "SimulationMC value needs to be at least one!",
        test_dpi_quota: { dpi: true, quota: 0 } => "Quota value needs to be at least one!",
        test_epsilon_zero: { epsilon: 0.0 }
            => "Epsilon needs the be greater than 0 but less than 1.",
        test_epsilon_one: { epsilon: 1.0 }
            => "Epsilon needs the be greater than 0 but less than 1.",
        test_single_vote: { single_vote: 97 } => "SingleVote value is too large! (Can be 1 to 96)",
    }

    #[test]
    fn test_many_players_with_estimation() {
        let setup = SimulationSettings {
            players: 20,
            index_estimation_mc: 10_000,
            ..settings(SIMULATION)
        }
        .validate()
        .unwrap();
        assert_eq!(setup.params.index_monte_carlo_count, 10_000);
    }

    #[test]
    fn test_validate_calculation() {
        assert!(validate_calculation(&CalculationParameters::classic([3, 5, 8], 9)).is_ok());
        assert!(validate_calculation(&CalculationParameters::dpi([1.0, 2.0])).is_ok());
        assert_eq!(
            validate_calculation(&CalculationParameters::classic([3], 2))
                .unwrap_err()
                .to_string(),
            "Too few or too many players! (Can be 2 to 32767)"
        );
        assert_eq!(
            validate_calculation(&CalculationParameters::classic([3, 5], 0))
                .unwrap_err()
                .to_string(),
            "Quota value needs to be at least one!"
        );
        assert_eq!(
            validate_calculation(&CalculationParameters::classic(vec![1; 16], 9))
                .unwrap_err()
                .to_string(),
            "Must do MC estimation with this many players!"
        );
        assert!(
            validate_calculation(&CalculationParameters::classic(vec![1; 16], 9).with_monte_carlo(10))
                .is_ok()
        );
        assert!(validate_calculation(&CalculationParameters::dpi([1.0, -2.0])).is_err());
    }
}

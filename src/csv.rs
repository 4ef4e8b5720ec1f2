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

//! Module to write results as CSV, with seven decimals.

use crate::types::{CalculationParameters, DeltaRow, Indices, ResultDelta, ResultDeltaSingle, Results};
use std::io::{self, Write};

const SIMULATION_HEADER: &str = "set_vote,\
ss_change_pos,ss_change_neg,ss_change_zero,ss_change_mean,ss_change_stdev,\
bf_change_pos,bf_change_neg,bf_change_zero,bf_change_mean,bf_change_stdev";

fn write_row(out: &mut impl Write, row: &DeltaRow) -> io::Result<()> {
    write!(
        out,
        "{:.7},{:.7},{:.7},{:.7},{:.7}",
        row.positive, row.negative, row.zero, row.mean, row.stdev
    )
}

/// Writes the rows of a sweep simulation, one per vote value of the tracked
/// player.
pub fn write_simulation(out: &mut impl Write, result: &ResultDelta) -> io::Result<()> {
    writeln!(out, "{SIMULATION_HEADER}")?;
    for (i, (shapley, banzhaf)) in std::iter::zip(&result.shapley, &result.banzhaf).enumerate() {
        write!(out, "{},", i + 1)?;
        write_row(out, shapley)?;
        write!(out, ",")?;
        write_row(out, banzhaf)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Writes the generated distributions, with the index changes of the tracked
/// player.
pub fn write_generation(out: &mut impl Write, result: &ResultDeltaSingle) -> io::Result<()> {
    let n = result.votes.first().map_or(0, |votes| votes.len());
    write!(out, "ss_change,bf_change")?;
    for i in 1..=n {
        write!(out, ",player_{i}")?;
    }
    writeln!(out)?;

    for ((shapley, banzhaf), votes) in result
        .shapley
        .iter()
        .zip(&result.banzhaf)
        .zip(&result.votes)
    {
        write!(out, "{shapley:.7},{banzhaf:.7}")?;
        for v in votes {
            write!(out, ",{v}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Writes the indices of each player.
pub fn write_calculation(
    out: &mut impl Write,
    params: &CalculationParameters,
    results: &Results,
) -> io::Result<()> {
    match &results.indices {
        Indices::Classic { shapley, banzhaf } => {
            writeln!(out, "player,votes,shapley,banzhaf")?;
            for (i, ((votes, shapley), banzhaf)) in
                params.votes.iter().zip(shapley).zip(banzhaf).enumerate()
            {
                writeln!(out, "{},{votes},{shapley:.7},{banzhaf:.7}", i + 1)?;
            }
        }
        Indices::Dpi { dpi } => {
            writeln!(out, "player,weight,dpi")?;
            let weights = params.weights.as_deref().unwrap_or_default();
            for (i, (weight, dpi)) in weights.iter().zip(dpi).enumerate() {
                writeln!(out, "{},{weight},{dpi:.7}", i + 1)?;
            }
        }
    }
    Ok(())
}

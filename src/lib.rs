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

//! Voting power indices for weighted voting games.
//!
//! This crate computes the Shapley-Shubik, Banzhaf and DPI (a weighted
//! "convincing probability" index) either exactly, by enumerating every
//! permutation or coalition of players, or approximately by Monte-Carlo
//! sampling. On top of that, the [`service::SimulationService`] runs sweep
//! simulations that measure how these indices change for a player when the
//! quota changes, over thousands of randomly generated vote distributions.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cache;
pub mod calculators;
pub mod cancel;
pub mod csv;
pub mod generators;
pub mod parallelism;
pub mod properties;
pub mod random;
pub mod service;
pub mod types;

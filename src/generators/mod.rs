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

//! Generators of combinatorial objects: coalitions, orderings, tuples and
//! vote distributions. Each object family has an exhaustive generator and a
//! randomized one, sharing the [`Generator`] interface.

mod combination;
mod ntuple;
mod partition;
mod permutation;

pub(crate) use combination::binomial;
pub use combination::{Combinations, RandomCombinations};
pub use ntuple::{NTuples, RandomNTuples};
pub use partition::RandomPartitions;
pub use permutation::{Permutations, RandomPermutations};

/// A lazy sequence of combinatorial objects, stored in a buffer owned by the
/// generator.
///
/// The slice returned by [`Generator::next()`] borrows the internal buffer
/// and is overwritten in place by the following call, which the borrow
/// checker enforces: values that must outlive the next step have to be
/// copied out.
pub trait Generator {
    /// Type of the elements of each generated object.
    type Item;

    /// Whether [`Generator::next()`] can be called again. Randomized
    /// generators never run out.
    fn has_next(&self) -> bool;

    /// Computes the next object.
    fn next(&mut self) -> &[Self::Item];
}

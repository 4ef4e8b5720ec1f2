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

//! Hand-rolled parallelism utilities for power index computations.

mod split;
mod thread_pool;

pub use split::{round_robin, split_evenly};
pub use thread_pool::{JobError, JobHandle, Rejected, Spawner, ThreadPool};

#[cfg(test)]
mod test {
    use super::*;
    use std::num::NonZeroUsize;

    macro_rules! parallelism_tests {
        ( $mod:ident, $num_threads:expr, $($case:ident,)+ ) => {
            mod $mod {
                use super::*;

                $(
                #[test]
                fn $case() {
                    $crate::parallelism::test::$case($num_threads);
                }
                )+
            }
        };
    }

    macro_rules! all_parallelism_tests {
        ( $mod:ident, $num_threads:expr ) => {
            parallelism_tests!($mod, $num_threads, test_sum_integers, test_sum_twice,);
        };
    }

    all_parallelism_tests!(single_thread, 1);
    all_parallelism_tests!(four_threads, 4);
    all_parallelism_tests!(seven_threads, 7);

    /// Sums the integers in `[0, total)` by splitting them into shares, one
    /// job per share.
    fn parallel_sum(spawner: &Spawner, num_threads: usize, total: u64) -> u64 {
        let mut start = 0;
        let handles: Vec<_> = split_evenly(total, num_threads)
            .into_iter()
            .map(|share| {
                let range = start..start + share;
                start += share;
                spawner.submit(move || range.sum::<u64>()).unwrap()
            })
            .collect();
        handles.into_iter().map(|h| h.wait().unwrap()).sum()
    }

    fn test_sum_integers(num_threads: usize) {
        let pool = ThreadPool::new(NonZeroUsize::new(num_threads).unwrap(), 64, false);
        let sum = parallel_sum(&pool.spawner(), num_threads, 10_001);
        assert_eq!(sum, 5_000 * 10_001);
    }

    fn test_sum_twice(num_threads: usize) {
        let pool = ThreadPool::new(NonZeroUsize::new(num_threads).unwrap(), 64, false);
        // The same pool can process multiple rounds.
        let sum1 = parallel_sum(&pool.spawner(), num_threads, 10_001);
        let sum2 = parallel_sum(&pool.spawner(), num_threads, 10_001);
        assert_eq!(sum1, 5_000 * 10_001);
        assert_eq!(sum2, 5_000 * 10_001);
    }
}

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

//! Splitting of work among threads.

/// Splits `total` trials into `parts` shares, whose sizes differ by at most
/// one. The first `total % parts` shares get the extra trial.
pub fn split_evenly(total: u64, parts: usize) -> Vec<u64> {
    assert!(parts > 0);
    let parts_u64 = parts as u64;
    let share = total / parts_u64;
    let remainder = total % parts_u64;
    (0..parts_u64)
        .map(|i| if i < remainder { share + 1 } else { share })
        .collect()
}

/// Deals the given work units to `parts` groups, in round-robin order. Work
/// units are expected to be listed by decreasing cost, so that the groups
/// end up with a similar amount of work.
pub fn round_robin<T>(units: impl IntoIterator<Item = T>, parts: usize) -> Vec<Vec<T>> {
    assert!(parts > 0);
    let mut groups: Vec<Vec<T>> = (0..parts).map(|_| Vec::new()).collect();
    for (i, unit) in units.into_iter().enumerate() {
        groups[i % parts].push(unit);
    }
    groups
}

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

//! A hand-rolled thread pool with a bounded job queue.

use log::{debug, warn};
use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// A unit of work executed by the pool.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Status sent to the worker threads.
#[derive(Clone, Copy, PartialEq, Eq)]
enum WorkerStatus {
    /// The threads process queued jobs.
    Running,
    /// There is nothing more to do and the threads must exit.
    Finished,
}

/// State shared between the pool handles and the worker threads.
struct Queue {
    /// Jobs waiting for a worker.
    jobs: VecDeque<Job>,
    /// Status of the worker threads.
    status: WorkerStatus,
}

/// Queue of the pool, with the condition variable signaled whenever a job is
/// pushed or the status changes.
struct Shared {
    queue: Mutex<Queue>,
    condvar: Condvar,
    /// Maximal number of queued jobs.
    capacity: usize,
}

/// Error returned when the job queue is full, or when the pool was shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected;

impl Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("the job queue is full or the pool is shut down")
    }
}

impl std::error::Error for Rejected {}

/// Reason why a job didn't produce its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobError {
    /// The job was purged from the queue, or dropped before running.
    Cancelled,
    /// The job panicked.
    Panicked,
}

/// A pool of worker threads processing jobs from a bounded queue.
///
/// Jobs are submitted through a [`Spawner`], which can be cloned and moved
/// into other jobs. Dropping the pool shuts it down.
pub struct ThreadPool {
    /// Handles to all the threads in the pool.
    threads: Vec<JoinHandle<()>>,
    /// Handle to submit jobs.
    spawner: Spawner,
}

impl ThreadPool {
    /// Creates a pool with the given number of threads, and room for
    /// `queue_capacity` queued jobs. If `pin_threads` is set, each worker is
    /// pinned to a CPU.
    pub fn new(num_threads: NonZeroUsize, queue_capacity: usize, pin_threads: bool) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                status: WorkerStatus::Running,
            }),
            condvar: Condvar::new(),
            capacity: queue_capacity,
        });

        let threads = (0..num_threads.get())
            .filter_map(|id| {
                let context = ThreadContext {
                    id,
                    shared: shared.clone(),
                    pin_threads,
                };
                let spawned = std::thread::Builder::new()
                    .name(format!("picalc-worker-{id}"))
                    .spawn(move || context.run());
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!("[main thread] Failed to spawn worker {id}: {e}");
                        None
                    }
                }
            })
            .collect::<Vec<_>>();
        debug!("[main thread] Spawned {} threads", threads.len());

        ThreadPool {
            threads,
            spawner: Spawner { shared },
        }
    }

    /// Returns a handle to submit jobs to this pool.
    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Stops the worker threads. Queued jobs are dropped, and jobs in
    /// progress are given `timeout` to complete. Threads that are still busy
    /// after that are detached.
    pub fn shutdown(&mut self, timeout: Duration) {
        if self.threads.is_empty() {
            return;
        }

        debug!("[main thread] Notifying threads to finish...");
        let purged = {
            let mut queue = self.spawner.shared.queue.lock().unwrap();
            queue.status = WorkerStatus::Finished;
            std::mem::take(&mut queue.jobs)
        };
        self.spawner.shared.condvar.notify_all();
        // Outside of the lock: dropping a job resolves its handle.
        drop(purged);

        debug!("[main thread] Joining threads in the pool...");
        let deadline = Instant::now() + timeout;
        for (i, handle) in std::mem::take(&mut self.threads).into_iter().enumerate() {
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
            if handle.is_finished() {
                let result = handle.join();
                debug!("[main thread] Thread {i} joined with result: {result:?}");
            } else {
                warn!("[main thread] Thread {i} is still busy, detaching it");
            }
        }
        debug!("[main thread] Joined threads.");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown(Duration::from_millis(500));
    }
}

/// Handle to submit jobs to a [`ThreadPool`].
#[derive(Clone)]
pub struct Spawner {
    shared: Arc<Shared>,
}

impl Spawner {
    /// Queues a job, and returns a handle to wait for its output. Fails fast
    /// if the queue is full.
    pub fn submit<T, F>(&self, f: F) -> Result<JobHandle<T>, Rejected>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let slot = Arc::new((Mutex::new(None), Condvar::new()));
        let completer = Completer {
            slot: Some(slot.clone()),
        };
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f));
            completer.complete(result.map_err(|_| JobError::Panicked));
        });

        {
            let mut queue = self.shared.queue.lock().unwrap();
            if queue.status == WorkerStatus::Finished || queue.jobs.len() >= self.shared.capacity
            {
                return Err(Rejected);
            }
            queue.jobs.push_back(job);
        }
        self.shared.condvar.notify_one();

        Ok(JobHandle { slot })
    }

    /// Drops all the jobs that didn't start yet. Their handles resolve to
    /// [`JobError::Cancelled`]. Returns the number of purged jobs.
    pub fn purge(&self) -> usize {
        let purged = std::mem::take(&mut self.shared.queue.lock().unwrap().jobs);
        let count = purged.len();
        drop(purged);
        if count != 0 {
            debug!("[main thread] Purged {count} queued jobs");
        }
        count
    }

    /// Number of jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().unwrap().jobs.len()
    }
}

/// Slot where a job stores its output.
type Slot<T> = Arc<(Mutex<Option<Result<T, JobError>>>, Condvar)>;

/// Handle to the output of a submitted job.
pub struct JobHandle<T> {
    slot: Slot<T>,
}

impl<T> JobHandle<T> {
    /// Blocks until the job has completed, and returns its output.
    pub fn wait(self) -> Result<T, JobError> {
        let (lock, condvar) = &*self.slot;
        let mut guard = condvar
            .wait_while(lock.lock().unwrap(), |output| output.is_none())
            .unwrap();
        guard.take().unwrap_or(Err(JobError::Cancelled))
    }

    /// Whether the job has completed.
    pub fn is_done(&self) -> bool {
        self.slot.0.lock().unwrap().is_some()
    }
}

/// Write end of a [`JobHandle`]. If it is dropped before completion (i.e.
/// the job was dropped without running), the handle resolves to
/// [`JobError::Cancelled`].
struct Completer<T> {
    slot: Option<Slot<T>>,
}

impl<T> Completer<T> {
    fn complete(mut self, result: Result<T, JobError>) {
        if let Some(slot) = self.slot.take() {
            Self::fill(&slot, result);
        }
    }

    fn fill(slot: &Slot<T>, result: Result<T, JobError>) {
        let (lock, condvar) = &**slot;
        *lock.lock().unwrap() = Some(result);
        condvar.notify_all();
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            Self::fill(&slot, Err(JobError::Cancelled));
        }
    }
}

/// Context object owned by a worker thread.
struct ThreadContext {
    /// Thread index.
    id: usize,
    /// Queue of the pool.
    shared: Arc<Shared>,
    /// Whether to pin this thread to a CPU.
    pin_threads: bool,
}

impl ThreadContext {
    /// Main function run by this thread.
    fn run(&self) {
        if self.pin_threads {
            pin_current_thread(self.id);
        }

        loop {
            let job = {
                let queue = self.shared.queue.lock().unwrap();
                let mut queue = self
                    .shared
                    .condvar
                    .wait_while(queue, |queue| {
                        queue.status == WorkerStatus::Running && queue.jobs.is_empty()
                    })
                    .unwrap();
                match queue.status {
                    WorkerStatus::Finished => {
                        debug!("[worker {}] Received finish signal", self.id);
                        break;
                    }
                    WorkerStatus::Running => queue.jobs.pop_front(),
                }
            };

            if let Some(job) = job {
                #[cfg(feature = "log_parallelism")]
                let start = Instant::now();

                job();

                #[cfg(feature = "log_parallelism")]
                log::trace!(
                    "[worker {}] Completed a job in {:?}",
                    self.id,
                    start.elapsed()
                );
            }
        }
    }
}

/// Pins the current thread to the CPU of the given index, modulo the number
/// of CPUs.
#[cfg(any(
    target_os = "android",
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "linux"
))]
fn pin_current_thread(id: usize) {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let num_cpus = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let cpu = id % num_cpus;

    let mut cpu_set = CpuSet::new();
    let result = cpu_set
        .set(cpu)
        .and_then(|()| sched_setaffinity(Pid::from_raw(0), &cpu_set));
    match result {
        Ok(()) => debug!("[worker {id}] Pinned to CPU #{cpu}"),
        Err(e) => warn!("[worker {id}] Failed to pin to CPU #{cpu}: {e}"),
    }
}

#[cfg(not(any(
    target_os = "android",
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "linux"
)))]
fn pin_current_thread(id: usize) {
    warn!("[worker {id}] Pinning threads isn't supported on this platform");
}

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

//! Services that run calculations and simulations in the background, and
//! report their output to a callback.
//!
//! Each call to a service runs an orchestration job on a worker thread, which
//! splits the work into units executed according to the configured
//! [`Parallel`] strategy, and then invokes the callback exactly once: with the
//! output, or with `None` if the call was cancelled or failed. Starting a new
//! call cancels the previous ones of the same service.

mod calculation;
mod simulation;

pub use calculation::CalculationService;
pub use simulation::SimulationService;

use crate::cancel::{Cancelled, CancellationToken};
use crate::parallelism::{JobError, JobHandle, Rejected, Spawner, ThreadPool};
use log::{debug, warn};
use rayon::prelude::*;
use std::fmt::{self, Display};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Time given to busy threads to finish when shutting a service down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Strategy to execute the work units of a call.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Parallel {
    /// Sequential execution on the orchestration thread.
    No,
    /// Parallel execution on the global rayon thread pool.
    Rayon,
    /// Parallel execution on the service's own thread pool.
    #[default]
    Custom,
}

/// Configuration of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Number of threads that execute work units.
    pub num_threads: NonZeroUsize,
    /// Maximal number of queued jobs.
    pub queue_capacity: usize,
    /// Execution strategy of work units.
    pub parallel: Parallel,
    /// Whether to pin the worker threads to CPUs.
    pub pin_threads: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            num_threads: std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            queue_capacity: 1024,
            parallel: Parallel::Custom,
            pin_threads: false,
        }
    }
}

impl ServiceConfig {
    /// Configuration with the given number of threads.
    pub fn with_threads(num_threads: NonZeroUsize) -> Self {
        ServiceConfig {
            num_threads,
            ..Default::default()
        }
    }
}

/// Reason why a call didn't produce an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    /// The call was cancelled.
    Cancelled,
    /// The job queue was full.
    Rejected,
    /// A worker panicked.
    WorkerPanicked,
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServiceError::Cancelled => f.write_str("the computation was cancelled"),
            ServiceError::Rejected => f.write_str("the job queue is full"),
            ServiceError::WorkerPanicked => f.write_str("a worker thread panicked"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<Cancelled> for ServiceError {
    fn from(_: Cancelled) -> Self {
        ServiceError::Cancelled
    }
}

impl From<Rejected> for ServiceError {
    fn from(_: Rejected) -> Self {
        ServiceError::Rejected
    }
}

impl From<JobError> for ServiceError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::Cancelled => ServiceError::Cancelled,
            JobError::Panicked => ServiceError::WorkerPanicked,
        }
    }
}

/// Owner of a callback, which invokes it with `None` if dropped before the
/// output was delivered.
struct CallbackGuard<T> {
    callback: Option<Box<dyn FnOnce(Option<T>) + Send>>,
}

impl<T> CallbackGuard<T> {
    fn new(callback: impl FnOnce(Option<T>) + Send + 'static) -> Self {
        CallbackGuard {
            callback: Some(Box::new(callback)),
        }
    }

    fn deliver(mut self, output: Option<T>) {
        if let Some(callback) = self.callback.take() {
            callback(output);
        }
    }
}

impl<T> Drop for CallbackGuard<T> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(None);
        }
    }
}

/// Context given to an orchestration job.
pub(crate) struct TaskContext {
    spawner: Spawner,
    parallel: Parallel,
    num_threads: usize,
    token: CancellationToken,
}

impl TaskContext {
    /// Number of threads that execute work units.
    fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Token of the current call.
    fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Executes `f` on every item, and returns the outputs in the same order.
    /// All the items have completed when this returns.
    fn execute<W, T, F>(&self, items: Vec<W>, f: F) -> Result<Vec<T>, ServiceError>
    where
        W: Send + 'static,
        T: Send + 'static,
        F: Fn(W, &CancellationToken) -> Result<T, Cancelled> + Send + Sync + 'static,
    {
        let token = &self.token;
        match self.parallel {
            Parallel::No => Ok(items
                .into_iter()
                .map(|item| f(item, token))
                .collect::<Result<_, _>>()?),
            Parallel::Rayon => Ok(items
                .into_par_iter()
                .map(|item| f(item, token))
                .collect::<Result<_, _>>()?),
            Parallel::Custom => {
                let f = Arc::new(f);
                let mut handles = Vec::with_capacity(items.len());
                for item in items {
                    let f = f.clone();
                    let token = token.clone();
                    match self.spawner.submit(move || f(item, &token)) {
                        Ok(handle) => handles.push(handle),
                        Err(Rejected) => {
                            // Stop the units already submitted.
                            self.token.cancel();
                            return Err(ServiceError::Rejected);
                        }
                    }
                }
                self.wait_all(handles)
            }
        }
    }

    fn wait_all<T>(
        &self,
        handles: Vec<JobHandle<Result<T, Cancelled>>>,
    ) -> Result<Vec<T>, ServiceError> {
        let mut outputs = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.wait() {
                Ok(Ok(output)) => outputs.push(output),
                Ok(Err(Cancelled)) => return Err(ServiceError::Cancelled),
                Err(e) => {
                    self.token.cancel();
                    return Err(e.into());
                }
            }
        }
        Ok(outputs)
    }
}

/// A call that didn't complete yet.
struct RunningTask {
    token: CancellationToken,
    /// Resolves to whether the call delivered an output.
    handle: JobHandle<bool>,
}

/// Machinery shared by the services: a thread pool, and the calls in
/// progress.
struct Orchestrator {
    config: ServiceConfig,
    pool: ThreadPool,
    running: Mutex<Vec<RunningTask>>,
}

impl Orchestrator {
    fn new(config: ServiceConfig) -> Self {
        // One more thread for the orchestration jobs.
        let pool_threads = config.num_threads.saturating_add(1);
        Orchestrator {
            config,
            pool: ThreadPool::new(pool_threads, config.queue_capacity, config.pin_threads),
            running: Mutex::new(Vec::new()),
        }
    }

    /// Cancels the calls in progress, and starts a new one running `task`.
    fn start<T, R, C>(&self, name: &'static str, task: R, callback: C) -> Result<(), ServiceError>
    where
        T: Send + 'static,
        R: FnOnce(&TaskContext) -> Result<T, ServiceError> + Send + 'static,
        C: FnOnce(Option<T>) + Send + 'static,
    {
        self.cleanup_tasks();

        let token = CancellationToken::new();
        let context = TaskContext {
            spawner: self.pool.spawner(),
            parallel: self.config.parallel,
            num_threads: self.config.num_threads.get(),
            token: token.clone(),
        };
        let guard = CallbackGuard::new(callback);

        let handle = self.pool.spawner().submit(move || {
            debug!("[{name}] Starting");
            match task(&context) {
                Ok(output) => {
                    debug!("[{name}] Completed");
                    guard.deliver(Some(output));
                    true
                }
                Err(e) => {
                    warn!("[{name}] No output: {e}");
                    guard.deliver(None);
                    false
                }
            }
        })?;

        self.running
            .lock()
            .unwrap()
            .push(RunningTask { token, handle });
        Ok(())
    }

    /// Cancels all the calls in progress, and drops the queued jobs.
    fn cleanup_tasks(&self) {
        let mut running = self.running.lock().unwrap();
        for task in running.iter() {
            task.token.cancel();
        }
        self.pool.spawner().purge();
        running.clear();
    }

    /// Whether a call is in progress.
    fn is_running(&self) -> bool {
        let mut running = self.running.lock().unwrap();
        running.retain(|task| !task.handle.is_done());
        !running.is_empty()
    }

    /// Waits until the calls in progress complete. Returns true if they all
    /// delivered an output.
    fn wait(&self) -> bool {
        let tasks = std::mem::take(&mut *self.running.lock().unwrap());
        tasks
            .into_iter()
            .map(|task| task.handle.wait() == Ok(true))
            .fold(true, |acc, ok| acc && ok)
    }

    /// Cancels the calls in progress and stops the threads.
    fn shutdown(&mut self) {
        self.cleanup_tasks();
        self.pool.shutdown(SHUTDOWN_TIMEOUT);
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        // The pool shuts down right after, and must not wait for cancelled
        // work.
        self.cleanup_tasks();
    }
}

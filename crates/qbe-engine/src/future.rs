//! Single-flight memoized asynchronous results.
//!
//! A [`Future`] wraps a producer closure. The first [`Future::get`] starts it; every
//! caller, earlier or later, is queued on the same [`Batch`] and receives the one result.
//! Callbacks are always delivered on a worker, never inside the caller's stack.
//!
//! - `cancel` before satisfaction drops all waiting callbacks and cancels the job.
//! - `expire` only cancels the job. A producer that checks the job and returns a partial
//!   result still reaches the callbacks already waiting.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::job::{Job, lock};
use crate::queue::{self, QoS};

type Callback<T> = Box<dyn FnOnce(T) + Send>;

struct BatchState<T> {
    cached: Option<T>,
    waiting: Vec<Callback<T>>,
    dropped: bool,
}

/// One calculation of a future: its job, its result once known, and its waiting list.
pub struct Batch<T> {
    job: Job,
    state: Arc<Mutex<BatchState<T>>>,
    settled: Arc<Condvar>,
}

impl<T> Clone for Batch<T> {
    fn clone(&self) -> Self {
        Batch {
            job: self.job.clone(),
            state: self.state.clone(),
            settled: self.settled.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Batch<T> {
    pub fn new(job: Job) -> Batch<T> {
        Batch {
            job,
            state: Arc::new(Mutex::new(BatchState {
                cached: None,
                waiting: Vec::new(),
                dropped: false,
            })),
            settled: Arc::new(Condvar::new()),
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Deliver the result. Waiting callbacks run in registration order, in one task.
    pub fn satisfy(&self, value: T) {
        let waiting = {
            let mut state = lock(&self.state);
            if state.cached.is_some() {
                tracing::warn!(job = self.job.id(), "batch satisfied twice, keeping the first result");
                return;
            }
            if state.dropped {
                tracing::debug!(job = self.job.id(), "discarding result of a cancelled batch");
                return;
            }
            state.cached = Some(value.clone());
            std::mem::take(&mut state.waiting)
        };
        self.settled.notify_all();

        if !waiting.is_empty() {
            queue::dispatch(self.job.qos(), move || {
                for callback in waiting {
                    callback(value.clone());
                }
            });
        }
    }

    /// Cancel the job but keep the waiting list.
    pub fn expire(&self) {
        if !self.is_satisfied() {
            self.job.cancel();
        }
    }

    /// Cancel the job and drop every waiting callback.
    pub fn cancel(&self) {
        let mut state = lock(&self.state);
        if state.cached.is_none() {
            state.waiting.clear();
            state.dropped = true;
            drop(state);
            self.settled.notify_all();
            self.job.cancel();
        }
    }

    /// Block until the batch is satisfied or cancelled, at most `limit`. True if it was.
    fn wait_settled(&self, limit: Duration) -> bool {
        let state = lock(&self.state);
        let (state, _) = self
            .settled
            .wait_timeout_while(state, limit, |s| s.cached.is_none() && !s.dropped)
            .unwrap_or_else(PoisonError::into_inner);
        state.cached.is_some() || state.dropped
    }

    pub fn enqueue<F>(&self, callback: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let mut state = lock(&self.state);
        if let Some(value) = state.cached.clone() {
            drop(state);
            queue::dispatch(self.job.qos(), move || callback(value));
        } else if state.dropped {
            tracing::debug!(job = self.job.id(), "callback enqueued on a cancelled batch is dropped");
        } else {
            state.waiting.push(Box::new(callback));
        }
    }

    pub fn is_satisfied(&self) -> bool {
        lock(&self.state).cached.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.state).dropped
    }

    /// The result, if already produced.
    pub fn value(&self) -> Option<T> {
        lock(&self.state).cached.clone()
    }
}

type Producer<T> = Arc<dyn Fn(Batch<T>) + Send + Sync>;

pub struct Future<T> {
    producer: Producer<T>,
    time_limit: Option<Duration>,
    batch: Mutex<Option<Batch<T>>>,
}

impl<T: Clone + Send + 'static> Future<T> {
    /// `producer` receives the batch to satisfy. It runs at most once per future, on the
    /// thread that first calls [`Future::get`]; long work should go through
    /// `batch.job().spawn`.
    pub fn new<P>(producer: P) -> Future<T>
    where
        P: Fn(Batch<T>) + Send + Sync + 'static,
    {
        Future {
            producer: Arc::new(producer),
            time_limit: None,
            batch: Mutex::new(None),
        }
    }

    /// Expire the calculation once `limit` has passed without a result.
    pub fn with_time_limit(mut self, limit: Duration) -> Future<T> {
        self.time_limit = Some(limit);
        self
    }

    /// Request the result. Starts the calculation on first use, as a child of `job` if
    /// given. Returns the calculation's job.
    pub fn get<F>(&self, job: Option<&Job>, callback: F) -> Job
    where
        F: FnOnce(T) + Send + 'static,
    {
        let (batch, start) = {
            let mut slot = lock(&self.batch);
            match slot.as_ref() {
                Some(batch) => (batch.clone(), false),
                None => {
                    let job = job
                        .map(Job::child)
                        .unwrap_or_else(|| Job::new(QoS::UserInitiated));
                    let batch = Batch::new(job);
                    *slot = Some(batch.clone());
                    (batch, true)
                }
            }
        };

        batch.enqueue(callback);
        if start {
            self.calculate(&batch);
        }
        batch.job().clone()
    }

    fn calculate(&self, batch: &Batch<T>) {
        if let Some(limit) = self.time_limit {
            let timed = batch.clone();
            let spawned = std::thread::Builder::new()
                .name("qbe-future-timer".to_string())
                .spawn(move || {
                    if !timed.wait_settled(limit) {
                        tracing::debug!(
                            job = timed.job().id(),
                            limit_ms = limit.as_millis() as u64,
                            "time limit reached, expiring"
                        );
                        timed.expire();
                    }
                });
            if let Err(err) = spawned {
                tracing::warn!(%err, "could not start time limit timer");
            }
        }

        (self.producer)(batch.clone());
    }

    pub fn cancel(&self) {
        if let Some(batch) = lock(&self.batch).as_ref() {
            batch.cancel();
        }
    }

    pub fn expire(&self) {
        if let Some(batch) = lock(&self.batch).as_ref() {
            batch.expire();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.batch).as_ref().is_some_and(Batch::is_cancelled)
    }

    /// True once a calculation has been started.
    pub fn is_calculating(&self) -> bool {
        lock(&self.batch).is_some()
    }

    pub fn is_satisfied(&self) -> bool {
        lock(&self.batch).as_ref().is_some_and(Batch::is_satisfied)
    }
}

//! Cooperative cancellation and hierarchical progress.
//!
//! A [`Job`] is a cheap, clonable handle. Cancelling is one-way and advisory: work that
//! accepts a job checks [`Job::is_cancelled`] at loop iterations and recursion points and
//! stops on its own. A child job counts as cancelled once any ancestor is.
//!
//! Progress is reported per component key; a job's progress is the mean of its
//! components and is forwarded to the parent under the child's own id.

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::queue::{self, QoS};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Receives progress updates from a job.
pub trait JobObserver: Send + Sync {
    fn job_did_progress(&self, job: &Job, progress: f64);
}

impl<F> JobObserver for F
where
    F: Fn(&Job, f64) + Send + Sync,
{
    fn job_did_progress(&self, job: &Job, progress: f64) {
        self(job, progress)
    }
}

/// Subscription handle returned by [`Job::add_observer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

struct JobInner {
    id: u64,
    qos: QoS,
    parent: Option<Job>,
    cancelled: AtomicBool,
    progress: DashMap<u64, f64>,
    observers: Mutex<Vec<(ObserverId, Arc<dyn JobObserver>)>>,
    next_observer: AtomicU64,
    timings: DashMap<String, Duration>,
}

impl Job {
    pub fn new(qos: QoS) -> Job {
        Job::with_parent(qos, None)
    }

    fn with_parent(qos: QoS, parent: Option<Job>) -> Job {
        Job {
            inner: Arc::new(JobInner {
                id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
                qos,
                parent,
                cancelled: AtomicBool::new(false),
                progress: DashMap::new(),
                observers: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(0),
                timings: DashMap::new(),
            }),
        }
    }

    /// A new job that runs on this job's queue and reports progress into it.
    pub fn child(&self) -> Job {
        Job::with_parent(self.inner.qos, Some(self.clone()))
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn qos(&self) -> QoS {
        self.inner.qos
    }

    pub fn parent(&self) -> Option<&Job> {
        self.inner.parent.as_ref()
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!(job = self.id(), "job cancelled");
        }
    }

    /// True once this job or any of its ancestors was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self.inner.parent.as_ref().is_some_and(Job::is_cancelled)
    }

    /// Run `task` on this job's queue, unless the job is already cancelled. Returns
    /// whether the task was scheduled.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_cancelled() {
            tracing::debug!(job = self.id(), "not scheduling work on a cancelled job");
            return false;
        }
        queue::dispatch(self.inner.qos, task);
        true
    }

    /// Run `block` unless the job is cancelled, recording how long it took under
    /// `description`.
    pub fn time<R>(&self, description: &str, block: impl FnOnce() -> R) -> Option<R> {
        if self.is_cancelled() {
            return None;
        }

        let start = Instant::now();
        let result = block();
        let elapsed = start.elapsed();
        *self.inner.timings.entry(description.to_string()).or_default() += elapsed;
        tracing::debug!(
            job = self.id(),
            description,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "timed"
        );
        Some(result)
    }

    /// Accumulated durations recorded by [`Job::time`].
    pub fn timings(&self) -> Vec<(String, Duration)> {
        let mut timings: Vec<(String, Duration)> = self
            .inner
            .timings
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        timings.sort();
        timings
    }

    /// Report progress in `[0, 1]` for the component `key`. Other values are ignored.
    pub fn report_progress(&self, progress: f64, key: u64) {
        if !(0.0..=1.0).contains(&progress) {
            tracing::debug!(job = self.id(), key, progress, "ignoring out-of-range progress");
            return;
        }

        self.inner.progress.insert(key, progress);
        let current = self.progress();

        let observers: Vec<Arc<dyn JobObserver>> = lock(&self.inner.observers)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer.job_did_progress(self, current);
        }

        if let Some(parent) = &self.inner.parent {
            parent.report_progress(current, self.id());
        }
    }

    /// Mean of the reported components, `0.0` before any report.
    pub fn progress(&self) -> f64 {
        let count = self.inner.progress.len();
        if count == 0 {
            return 0.0;
        }
        let sum: f64 = self.inner.progress.iter().map(|entry| *entry.value()).sum();
        sum / count as f64
    }

    pub fn add_observer(&self, observer: Arc<dyn JobObserver>) -> ObserverId {
        let id = ObserverId(self.inner.next_observer.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.observers).push((id, observer));
        id
    }

    pub fn observe<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&Job, f64) + Send + Sync + 'static,
    {
        self.add_observer(Arc::new(callback))
    }

    /// Unsubscribe. Returns false if the id was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = lock(&self.inner.observers);
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("qos", &self.inner.qos)
            .field("cancelled", &self.is_cancelled())
            .field("progress", &self.progress())
            .finish()
    }
}

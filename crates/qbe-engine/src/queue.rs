//! Worker queues.
//!
//! Two crate-local Rayon pools, one per [`QoS`] class, built lazily on first use. Rayon's
//! global pool can fail to initialize under resource pressure and panic on first use,
//! so each pool is built best-effort and dispatch falls back to `rayon::spawn` when a
//! pool is unavailable.

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Priority class of a job's work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QoS {
    #[default]
    UserInitiated,
    Background,
}

impl QoS {
    pub fn label(&self) -> &'static str {
        match self {
            QoS::UserInitiated => "interactive",
            QoS::Background => "background",
        }
    }
}

static INTERACTIVE_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();
static BACKGROUND_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

fn desired_threads(qos: QoS) -> usize {
    let from_env = std::env::var("RAYON_NUM_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0);
    let base = from_env.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    match qos {
        QoS::UserInitiated => base,
        QoS::Background => (base / 2).max(1),
    }
}

fn build_pool(qos: QoS) -> Option<ThreadPool> {
    let label = qos.label();
    let try_build = |n| {
        ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(move |i| format!("qbe-{label}-{i}"))
            .build()
    };

    let requested = desired_threads(qos);
    match try_build(requested) {
        Ok(pool) => Some(pool),
        Err(_) if requested > 1 => try_build(1).ok(),
        Err(err) => {
            tracing::warn!(queue = label, %err, "could not build worker pool, using the global pool");
            None
        }
    }
}

/// The pool serving `qos`, if one could be created.
pub(crate) fn pool(qos: QoS) -> Option<&'static ThreadPool> {
    let slot = match qos {
        QoS::UserInitiated => &INTERACTIVE_POOL,
        QoS::Background => &BACKGROUND_POOL,
    };
    slot.get_or_init(|| build_pool(qos)).as_ref()
}

/// Run `task` on a worker of the `qos` class, eventually.
pub fn dispatch<F>(qos: QoS, task: F)
where
    F: FnOnce() + Send + 'static,
{
    match pool(qos) {
        Some(pool) => pool.spawn(task),
        None => rayon::spawn(task),
    }
}

//! Row formulas: evaluation, formula text and inference by example, plus the job and
//! future primitives the inference runs under.

pub mod builtins;
pub mod engine;
pub mod fallible;
pub mod future;
pub mod job;
pub mod parallel;
pub mod queue;

pub use builtins::{Arity, Binary, Function};
pub use fallible::Fallible;
pub use future::{Batch, Future};
pub use job::{Job, JobObserver, ObserverId};
pub use queue::QoS;

//! qbe-core - UI-agnostic suggestion service, calculated columns and storage.

pub mod calculation;
pub mod config;
pub mod error;
pub mod storage;
pub mod suggest;

pub use calculation::Calculation;
pub use config::{Config, load_config};
pub use error::{QbeError, Result};
pub use suggest::{Suggester, Suggestion, SuggestionFuture, SuggestionRequest};

pub use qbe_engine::engine::{Column, Row, Value};

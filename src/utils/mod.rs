//! # Utility Functions (`utils`)
//!
//! Provides helpers for batch parallelism and logging setup.

pub mod logging;
pub mod parallel;

pub use logging::{init_tracing, try_init_tracing, LoggingError};
pub use parallel::{for_each_sample, ParallelPolicy};

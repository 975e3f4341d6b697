//! hsdb-dispatch
//!
//! Splits ranked evidence into groups, runs one analysis per group under a
//! concurrency bound, and folds the group verdicts into one answer.
pub mod partition;
pub mod dispatcher;
pub mod consolidate;
pub mod analyst;

pub use analyst::FrequencyAnalyst;
pub use consolidate::Consolidator;
pub use dispatcher::Dispatcher;
pub use partition::{partition, Partition};

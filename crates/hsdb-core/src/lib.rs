//! hsdb-core
//!
//! Shared data model for the classification evidence engine: documents and
//! collections, ranked candidates, verdicts and answers, the analysis-step
//! seam, configuration, the knowledge loader and progress events.

pub mod codes;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod events;
pub mod traits;
pub mod types;
pub mod verdict;

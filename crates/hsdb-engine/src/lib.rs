//! hsdb-engine
//!
//! Query entry points: case searches through partitioned analysis, dual-path
//! manual search, user-named code comparison and raw manual lookups.
pub mod engine;
pub mod kind;
pub mod manual;

pub use engine::{CaseHit, Engine};
pub use kind::{QueryKind, Response};
pub use manual::{CodeDossier, ManualBook, ManualComparison, ManualEntry};

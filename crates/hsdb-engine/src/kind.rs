use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use hsdb_core::error::Error;
use hsdb_core::verdict::FinalAnswer;

use crate::manual::{ManualComparison, ManualEntry};

/// The closed set of question types. Choosing one is the caller's job
/// (a classifier, a CLI subcommand, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    DomesticCases,
    OverseasCases,
    ManualWithCodes,
    ManualFusion,
    ManualRaw,
}

impl QueryKind {
    pub const ALL: [QueryKind; 5] =
        [Self::DomesticCases, Self::OverseasCases, Self::ManualWithCodes, Self::ManualFusion, Self::ManualRaw];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DomesticCases => "domestic",
            Self::OverseasCases => "overseas",
            Self::ManualWithCodes => "manual",
            Self::ManualFusion => "fuse",
            Self::ManualRaw => "raw",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for QueryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::NotFound(format!("unknown query kind '{s}'")))
    }
}

/// What [`Engine::handle`](crate::Engine::handle) produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum Response {
    Answer(FinalAnswer),
    Comparison(ManualComparison),
    Manual(Vec<ManualEntry>),
}

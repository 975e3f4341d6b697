//! Per-group verdicts and the consolidated answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{Confidence, FusedCandidate};

/// How many documents of a partition support one code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeTally {
    pub code: String,
    pub supporting: usize,
}

/// Structured conclusion reported by an analysis step.
///
/// `tallies` is ordered by the step's own preference, leading code first.
/// `definitive` marks the leading code as the step's final answer rather
/// than a frequency estimate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conclusion {
    pub tallies: Vec<CodeTally>,
    pub definitive: bool,
}

impl Conclusion {
    pub fn leading(&self) -> Option<&CodeTally> { self.tallies.first() }
}

/// What an analysis step returns for one partition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub summary: String,
    pub conclusion: Option<Conclusion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerdictStatus {
    Completed,
    /// Empty partition; the analysis step was not called.
    NoEvidence,
    Failed { reason: String },
    TimedOut,
    /// The step returned a conclusion that its partition cannot support.
    Malformed { reason: String },
}

/// Result of one group's analysis. Created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupVerdict {
    pub group: usize,
    pub status: VerdictStatus,
    pub analysis: Option<Analysis>,
    pub documents: usize,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl GroupVerdict {
    pub fn is_degraded(&self) -> bool {
        matches!(
            self.status,
            VerdictStatus::Failed { .. } | VerdictStatus::TimedOut | VerdictStatus::Malformed { .. }
        )
    }

    /// The conclusion, only when the verdict completed normally.
    pub fn conclusion(&self) -> Option<&Conclusion> {
        match self.status {
            VerdictStatus::Completed => self.analysis.as_ref().and_then(|a| a.conclusion.as_ref()),
            _ => None,
        }
    }
}

/// One ranked line of the final answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerEntry {
    pub code: String,
    pub support: usize,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Outcome {
    Answer { code: String, confidence: Confidence },
    /// Evidence was analysed but no code was supported.
    NoConsensus,
    /// Every group or path failed.
    Unavailable,
    /// Nothing to analyse: blank query or no matching evidence.
    Empty,
}

/// Raw material kept for display and audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Audit {
    Groups(Vec<GroupVerdict>),
    Fusion(Vec<FusedCandidate>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalAnswer {
    pub outcome: Outcome,
    pub ranking: Vec<AnswerEntry>,
    pub audit: Audit,
}

impl FinalAnswer {
    pub fn empty(audit: Audit) -> Self { Self { outcome: Outcome::Empty, ranking: Vec::new(), audit } }

    pub fn leading(&self) -> Option<&AnswerEntry> {
        match self.outcome {
            Outcome::Answer { .. } => self.ranking.first(),
            _ => None,
        }
    }

    pub fn confidence(&self) -> Option<Confidence> {
        match self.outcome {
            Outcome::Answer { confidence, .. } => Some(confidence),
            _ => None,
        }
    }

    pub fn verdicts(&self) -> &[GroupVerdict] {
        match &self.audit {
            Audit::Groups(v) => v,
            Audit::Fusion(_) => &[],
        }
    }

    pub fn fused(&self) -> &[FusedCandidate] {
        match &self.audit {
            Audit::Fusion(v) => v,
            Audit::Groups(_) => &[],
        }
    }
}

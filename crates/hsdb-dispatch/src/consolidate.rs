use std::collections::HashMap;

use hsdb_core::codes::digits;
use hsdb_core::types::{Confidence, FusedCandidate};
use hsdb_core::verdict::{AnswerEntry, Audit, FinalAnswer, GroupVerdict, Outcome, VerdictStatus};

/// Folds group verdicts, or fused candidates, into one [`FinalAnswer`].
#[derive(Debug, Clone)]
pub struct Consolidator {
    high_agreement: usize,
}

#[derive(Debug)]
struct Support {
    code: String,
    total: usize,
    first_group: usize,
    leads: usize,
}

impl Consolidator {
    /// `high_agreement`: how many groups must lead with the answer's code
    /// for it to be labelled HIGH.
    pub fn new(high_agreement: usize) -> Self { Self { high_agreement: high_agreement.max(1) } }

    /// Codes are ranked by supporting documents summed over all completed
    /// groups; ties go to the code first reported by the lower group, then
    /// to the lower code. A definitive code from the lowest such group is
    /// promoted to the top. Arrival order of `verdicts` does not matter.
    pub fn groups(&self, mut verdicts: Vec<GroupVerdict>) -> FinalAnswer {
        verdicts.sort_by_key(|v| v.group);

        let attempted: Vec<&GroupVerdict> =
            verdicts.iter().filter(|v| v.status != VerdictStatus::NoEvidence).collect();
        if attempted.is_empty() {
            return FinalAnswer::empty(Audit::Groups(verdicts));
        }
        if attempted.iter().all(|v| v.is_degraded()) {
            tracing::warn!(groups = attempted.len(), "every analysed group failed");
            return FinalAnswer { outcome: Outcome::Unavailable, ranking: Vec::new(), audit: Audit::Groups(verdicts) };
        }

        let mut by_code: HashMap<String, Support> = HashMap::new();
        let mut definitive: Option<String> = None;
        for verdict in &verdicts {
            let Some(conclusion) = verdict.conclusion() else { continue };
            for (rank, tally) in conclusion.tallies.iter().enumerate() {
                let key = digits(&tally.code);
                if key.is_empty() || tally.supporting == 0 { continue; }
                let entry = by_code.entry(key.clone()).or_insert_with(|| Support {
                    code: tally.code.clone(),
                    total: 0,
                    first_group: verdict.group,
                    leads: 0,
                });
                entry.total += tally.supporting;
                if rank == 0 {
                    entry.leads += 1;
                    if conclusion.definitive && definitive.is_none() {
                        definitive = Some(key);
                    }
                }
            }
        }

        let mut ranked: Vec<(String, Support)> = by_code.into_iter().collect();
        ranked.sort_by(|(ka, a), (kb, b)| {
            b.total.cmp(&a.total).then(a.first_group.cmp(&b.first_group)).then_with(|| ka.cmp(kb))
        });
        if let Some(key) = definitive {
            if let Some(pos) = ranked.iter().position(|(k, _)| *k == key) {
                let chosen = ranked.remove(pos);
                ranked.insert(0, chosen);
            }
        }

        let ranking: Vec<AnswerEntry> = ranked
            .into_iter()
            .map(|(_, s)| AnswerEntry {
                code: s.code,
                support: s.total,
                confidence: if s.leads >= self.high_agreement { Confidence::High } else { Confidence::Medium },
            })
            .collect();

        let outcome = match ranking.first() {
            Some(top) => Outcome::Answer { code: top.code.clone(), confidence: top.confidence },
            None => Outcome::NoConsensus,
        };
        tracing::debug!(codes = ranking.len(), ?outcome, "groups consolidated");
        FinalAnswer { outcome, ranking, audit: Audit::Groups(verdicts) }
    }

    /// Near-identity over the fused list: keep the best `max_candidates`.
    /// The answer is HIGH only when its code leads both paths and clears the
    /// fused threshold.
    pub fn fused(&self, candidates: Vec<FusedCandidate>, all_paths_failed: bool, max_candidates: usize) -> FinalAnswer {
        if all_paths_failed {
            return FinalAnswer { outcome: Outcome::Unavailable, ranking: Vec::new(), audit: Audit::Fusion(candidates) };
        }
        let ranking: Vec<AnswerEntry> = candidates
            .iter()
            .take(max_candidates.max(1))
            .map(|c| AnswerEntry { code: c.code.clone(), support: c.evidence(), confidence: c.confidence })
            .collect();
        let outcome = match candidates.first() {
            Some(top) => {
                let leads_both = leads(top.table_score) && leads(top.manual_score);
                let confidence =
                    if leads_both && top.confidence == Confidence::High { Confidence::High } else { Confidence::Medium };
                Outcome::Answer { code: top.code.clone(), confidence }
            }
            None => Outcome::NoConsensus,
        };
        FinalAnswer { outcome, ranking, audit: Audit::Fusion(candidates) }
    }
}

/// A normalized path score of one means the code was that path's best.
fn leads(score: Option<f64>) -> bool { score.is_some_and(|s| s >= 1.0 - 1e-9) }

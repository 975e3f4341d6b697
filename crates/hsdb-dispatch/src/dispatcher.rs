//! Bounded fan-out of analysis steps over partitions.
//!
//! Every partition becomes one task in a `JoinSet`. A shared semaphore caps
//! how many tasks are inside the analysis step at once; a task's timeout
//! only starts once it holds a permit, so queueing never counts against it.
//! Verdicts are collected in completion order.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use hsdb_core::codes::related;
use hsdb_core::config::DispatchSettings;
use hsdb_core::error::{Error, Result};
use hsdb_core::events::{EngineEvent, EventBus};
use hsdb_core::traits::AnalysisStep;
use hsdb_core::types::Document;
use hsdb_core::verdict::{Analysis, GroupVerdict, VerdictStatus};

use crate::partition::Partition;

pub struct Dispatcher {
    max_concurrency: usize,
    task_timeout: Duration,
    events: EventBus,
}

impl Dispatcher {
    pub fn new(max_concurrency: usize, task_timeout: Duration, events: EventBus) -> Self {
        Self { max_concurrency: max_concurrency.max(1), task_timeout, events }
    }

    pub fn from_settings(settings: &DispatchSettings, events: EventBus) -> Self {
        Self::new(settings.max_concurrency, settings.task_timeout(), events)
    }

    pub async fn dispatch(
        &self,
        query: &str,
        partitions: Vec<Partition<Document>>,
        step: Arc<dyn AnalysisStep>,
    ) -> Result<Vec<GroupVerdict>> {
        self.dispatch_until(query, partitions, step, CancellationToken::new()).await
    }

    /// Like [`dispatch`](Self::dispatch), but gives up as soon as `cancel`
    /// fires: in-flight tasks are aborted, their permits released, and no
    /// verdict is returned.
    pub async fn dispatch_until(
        &self,
        query: &str,
        partitions: Vec<Partition<Document>>,
        step: Arc<dyn AnalysisStep>,
        cancel: CancellationToken,
    ) -> Result<Vec<GroupVerdict>> {
        let limit = Arc::new(Semaphore::new(self.max_concurrency));
        let query: Arc<str> = Arc::from(query);
        let mut pending: BTreeSet<usize> = BTreeSet::new();
        let mut sizes = Vec::with_capacity(partitions.len());
        let mut tasks = JoinSet::new();

        for part in partitions {
            pending.insert(part.group);
            sizes.push((part.group, part.len()));
            let job = GroupJob {
                group: part.group,
                documents: part.items,
                query: query.clone(),
                step: step.clone(),
                limit: limit.clone(),
                timeout: self.task_timeout,
                events: self.events.clone(),
            };
            tasks.spawn(job.run());
        }

        let mut verdicts = Vec::with_capacity(pending.len());
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    tracing::info!(outstanding = pending.len(), "dispatch cancelled");
                    return Err(Error::Cancelled);
                }
                next = tasks.join_next() => match next {
                    Some(Ok(verdict)) => {
                        pending.remove(&verdict.group);
                        verdicts.push(verdict);
                    }
                    Some(Err(e)) => tracing::warn!(error = %e, "analysis task ended abnormally"),
                    None => break,
                }
            }
        }

        // A task that panicked never reported back; record it as failed.
        for group in pending {
            let documents = sizes.iter().find(|(g, _)| *g == group).map_or(0, |(_, n)| *n);
            let reason = "analysis task aborted".to_string();
            self.events.publish(EngineEvent::GroupFailed { group, reason: reason.clone() });
            verdicts.push(GroupVerdict {
                group,
                status: VerdictStatus::Failed { reason },
                analysis: None,
                documents,
                started_at: Utc::now(),
                duration: Duration::ZERO,
            });
        }
        let degraded = verdicts.iter().filter(|v| v.is_degraded()).count();
        tracing::debug!(groups = verdicts.len(), degraded, "dispatch finished");
        Ok(verdicts)
    }
}

struct GroupJob {
    group: usize,
    documents: Vec<Document>,
    query: Arc<str>,
    step: Arc<dyn AnalysisStep>,
    limit: Arc<Semaphore>,
    timeout: Duration,
    events: EventBus,
}

impl GroupJob {
    async fn run(self) -> GroupVerdict {
        let group = self.group;
        if self.documents.is_empty() {
            self.events.publish(EngineEvent::GroupCompleted { group, duration_ms: 0 });
            return GroupVerdict {
                group,
                status: VerdictStatus::NoEvidence,
                analysis: None,
                documents: 0,
                started_at: Utc::now(),
                duration: Duration::ZERO,
            };
        }

        let permit = match Arc::clone(&self.limit).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return self.failed(Utc::now(), Instant::now(), "concurrency limiter closed".into()),
        };
        let started_at = Utc::now();
        let started = Instant::now();
        self.events.publish(EngineEvent::GroupStarted { group, documents: self.documents.len() });

        let outcome = tokio::time::timeout(self.timeout, self.step.analyze(&self.query, &self.documents)).await;
        drop(permit);

        match outcome {
            Ok(Ok(analysis)) => match check_conclusion(&analysis, &self.documents) {
                Ok(()) => {
                    let duration = started.elapsed();
                    tracing::debug!(group, documents = self.documents.len(), elapsed_ms = duration.as_millis() as u64, "group completed");
                    self.events.publish(EngineEvent::GroupCompleted { group, duration_ms: duration.as_millis() });
                    GroupVerdict {
                        group,
                        status: VerdictStatus::Completed,
                        analysis: Some(analysis),
                        documents: self.documents.len(),
                        started_at,
                        duration,
                    }
                }
                Err(reason) => {
                    tracing::warn!(group, %reason, "malformed conclusion");
                    self.events.publish(EngineEvent::GroupFailed { group, reason: reason.clone() });
                    GroupVerdict {
                        group,
                        status: VerdictStatus::Malformed { reason },
                        analysis: Some(analysis),
                        documents: self.documents.len(),
                        started_at,
                        duration: started.elapsed(),
                    }
                }
            },
            Ok(Err(e)) => self.failed(started_at, started, format!("{e:#}")),
            Err(_) => {
                tracing::warn!(group, timeout_s = self.timeout.as_secs_f64(), "group timed out");
                self.events.publish(EngineEvent::GroupFailed { group, reason: "timed out".into() });
                GroupVerdict {
                    group,
                    status: VerdictStatus::TimedOut,
                    analysis: None,
                    documents: self.documents.len(),
                    started_at,
                    duration: started.elapsed(),
                }
            }
        }
    }

    fn failed(&self, started_at: chrono::DateTime<Utc>, started: Instant, reason: String) -> GroupVerdict {
        tracing::warn!(group = self.group, %reason, "group failed");
        self.events.publish(EngineEvent::GroupFailed { group: self.group, reason: reason.clone() });
        GroupVerdict {
            group: self.group,
            status: VerdictStatus::Failed { reason },
            analysis: None,
            documents: self.documents.len(),
            started_at,
            duration: started.elapsed(),
        }
    }
}

/// A conclusion must stay within what its partition can support: every
/// reported code is carried by some document, support is between one and
/// the partition size, and a definitive answer names a code.
fn check_conclusion(analysis: &Analysis, documents: &[Document]) -> std::result::Result<(), String> {
    let Some(conclusion) = &analysis.conclusion else { return Ok(()) };
    if conclusion.definitive && conclusion.tallies.is_empty() {
        return Err("definitive conclusion names no code".into());
    }
    for tally in &conclusion.tallies {
        if tally.supporting == 0 || tally.supporting > documents.len() {
            return Err(format!(
                "code {} claims {} supporting documents out of {}",
                tally.code,
                tally.supporting,
                documents.len()
            ));
        }
        if !documents.iter().filter_map(Document::code).any(|c| related(c, &tally.code)) {
            return Err(format!("code {} does not occur in the partition", tally.code));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsdb_core::types::ATTR_CODE;
    use hsdb_core::verdict::{CodeTally, Conclusion};

    fn docs(codes: &[&str]) -> Vec<Document> {
        codes.iter().enumerate().map(|(i, c)| Document::new(format!("d{i}"), "x").with_attribute(ATTR_CODE, *c)).collect()
    }

    fn analysis(tallies: &[(&str, usize)], definitive: bool) -> Analysis {
        Analysis {
            summary: String::new(),
            conclusion: Some(Conclusion {
                tallies: tallies.iter().map(|(c, n)| CodeTally { code: c.to_string(), supporting: *n }).collect(),
                definitive,
            }),
        }
    }

    #[test]
    fn accepts_codes_at_coarser_precision() {
        assert!(check_conclusion(&analysis(&[("9405.21", 2)], false), &docs(&["9405.21-1000", "9405.21"])).is_ok());
        assert!(check_conclusion(&Analysis::default(), &docs(&["9405"])).is_ok());
    }

    #[test]
    fn rejects_codes_outside_the_partition() {
        let err = check_conclusion(&analysis(&[("8539", 1)], false), &docs(&["9405.21"])).unwrap_err();
        assert!(err.contains("8539"));
    }

    #[test]
    fn rejects_impossible_support() {
        assert!(check_conclusion(&analysis(&[("9405", 3)], false), &docs(&["9405", "9405"])).is_err());
        assert!(check_conclusion(&analysis(&[("9405", 0)], false), &docs(&["9405"])).is_err());
        assert!(check_conclusion(&analysis(&[], true), &docs(&["9405"])).is_err());
    }

    struct Refuses;

    #[async_trait::async_trait]
    impl AnalysisStep for Refuses {
        async fn analyze(&self, _query: &str, _documents: &[Document]) -> anyhow::Result<Analysis> {
            anyhow::bail!("quota exceeded")
        }
    }

    fn job(limit: &Arc<Semaphore>) -> GroupJob {
        GroupJob {
            group: 2,
            documents: docs(&["9405"]),
            query: Arc::from("lamp"),
            step: Arc::new(Refuses),
            limit: Arc::clone(limit),
            timeout: Duration::from_secs(5),
            events: EventBus::default(),
        }
    }

    #[tokio::test]
    async fn failed_step_gives_back_its_permit() {
        let limit = Arc::new(Semaphore::new(1));
        let verdict = job(&limit).run().await;
        assert_eq!(verdict.status, VerdictStatus::Failed { reason: "quota exceeded".into() });
        assert_eq!(verdict.group, 2);
        assert_eq!(verdict.documents, 1);
        assert_eq!(limit.available_permits(), 1);
    }

    #[tokio::test]
    async fn closed_limiter_fails_the_group() {
        let limit = Arc::new(Semaphore::new(1));
        limit.close();
        let verdict = job(&limit).run().await;
        assert_eq!(verdict.status, VerdictStatus::Failed { reason: "concurrency limiter closed".into() });
    }
}

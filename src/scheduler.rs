//! Scheduled publication trigger.
//!
//! A level-triggered poller: every tick re-scans the store for draft items
//! whose scheduled time has passed, so a missed or delayed tick strands
//! nothing. Items are processed independently; one failure never blocks the
//! rest of the batch.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::lifecycle::{self, LifecycleError};
use crate::repo::{Repo, RepoError};

/// Policy default, not a correctness requirement.
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Bounded per-item store retries within one tick. Anything still failing is
/// left for the next tick, where the scan naturally re-selects it.
const MAX_ATTEMPTS_PER_ITEM: u32 = 3;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub due: usize,
    pub published: usize,
    pub failed: usize,
}

pub struct Scheduler {
    repo: Arc<dyn Repo>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(repo: Arc<dyn Repo>, clock: Arc<dyn Clock>) -> Self {
        let secs = std::env::var("SCHEDULER_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        Self {
            repo,
            clock,
            interval: Duration::from_secs(secs),
        }
    }

    /// Periodic loop; spawn this on the runtime next to the HTTP server.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    /// One poll invocation. Idempotent: re-running against the same store
    /// state re-publishes nothing, because an already-published item either
    /// drops out of the scan or no-ops in the lifecycle engine.
    pub async fn run_once(&self) -> TickSummary {
        let now = self.clock.now();
        let due = match self.repo.list_due_scheduled(now).await {
            Ok(items) => items,
            Err(e) => {
                // deferred to the next tick rather than retried in a loop
                error!(error = %e, "scheduled publish scan failed");
                counter!("scheduler_scan_failures_total", 1);
                return TickSummary::default();
            }
        };

        let mut summary = TickSummary { due: due.len(), ..Default::default() };
        for item in due {
            let next = match lifecycle::publish_scheduled(&item, now) {
                Ok(next) => next,
                // another writer got there first; already published is success here
                Err(LifecycleError::InvalidTransition(_)) => {
                    summary.published += 1;
                    continue;
                }
            };

            let mut attempts = 0;
            let outcome = loop {
                attempts += 1;
                match self.repo.update_content(next.clone()).await {
                    Ok(_) => break Ok(()),
                    Err(RepoError::Unavailable(reason)) if attempts < MAX_ATTEMPTS_PER_ITEM => {
                        warn!(content_id = %item.id, attempts, %reason, "store write failed, retrying");
                    }
                    Err(e) => break Err(e),
                }
            };

            match outcome {
                Ok(()) => {
                    info!(
                        content_id = %item.id,
                        slug = %item.slug,
                        scheduled_at = ?item.scheduled_at,
                        "scheduled content published"
                    );
                    counter!("scheduler_published_total", 1);
                    summary.published += 1;
                }
                Err(e) => {
                    // item stays draft with scheduled_at in the past, so the
                    // next invocation picks it up again
                    error!(content_id = %item.id, error = %e, "failed to publish scheduled content");
                    counter!("scheduler_publish_failures_total", 1);
                    summary.failed += 1;
                }
            }
        }

        info!(
            due = summary.due,
            published = summary.published,
            failed = summary.failed,
            "scheduler tick completed"
        );
        summary
    }
}

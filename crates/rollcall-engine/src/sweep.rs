//! Expiry sweeping and low-coverage reminders.

use crate::config::Config;
use crate::error::EngineError;
use crate::gateway::Gateway;
use crate::locks::IdentityLocks;
use chrono::{DateTime, Utc};
use rollcall_core::expiry::{low_coverage, partition_expired};
use rollcall_core::{EmbeddingId, Identity, Notifier};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// An identity left with fewer embeddings than the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowCoverage {
    pub identity: Identity,
    pub remaining: usize,
    /// The notifier accepted the reminder.
    pub notified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Embeddings deleted by this sweep.
    pub expired: usize,
    /// Empty when the sweep ran without notifications.
    pub low_coverage: Vec<LowCoverage>,
}

pub struct Sweeper {
    gateway: Gateway,
    locks: IdentityLocks,
    notifier: Arc<dyn Notifier>,
    validity_days: i64,
    threshold: usize,
}

impl Sweeper {
    pub fn new(
        gateway: Gateway,
        locks: IdentityLocks,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            gateway,
            locks,
            notifier,
            validity_days: config.validity_days,
            threshold: config.low_coverage_threshold,
        }
    }

    pub async fn sweep(&self, notify: bool) -> Result<SweepReport, EngineError> {
        self.sweep_at(Utc::now(), notify).await
    }

    /// Delete every embedding expired at `now`.
    ///
    /// With `notify`, identities that still own embeddings but fewer than
    /// the threshold are reminded. Notifier failures are logged and never
    /// abort the sweep.
    pub async fn sweep_at(
        &self,
        now: DateTime<Utc>,
        notify: bool,
    ) -> Result<SweepReport, EngineError> {
        let records = self.gateway.all_records().await?;
        let (expired, _) = partition_expired(records, now, self.validity_days);

        let mut by_identity: BTreeMap<Identity, Vec<EmbeddingId>> = BTreeMap::new();
        for record in expired {
            by_identity.entry(record.identity).or_default().push(record.id);
        }

        let mut deleted = 0;
        for (identity, ids) in by_identity {
            let _guard = self.locks.lock(&identity).await;
            for id in ids {
                // Enrollment may have pruned it since the listing.
                if self.gateway.delete_embedding(id).await? {
                    deleted += 1;
                }
            }
            tracing::debug!(%identity, "expired embeddings removed");
        }

        let mut report = SweepReport {
            expired: deleted,
            low_coverage: Vec::new(),
        };
        if notify {
            let remaining = self.gateway.all_records().await?;
            let low = low_coverage(&remaining, self.threshold);
            report.low_coverage = self.send_reminders(low).await?;
        }

        if report.expired > 0 || !report.low_coverage.is_empty() {
            tracing::info!(
                expired = report.expired,
                low_coverage = report.low_coverage.len(),
                "sweep finished"
            );
        }
        Ok(report)
    }

    async fn send_reminders(
        &self,
        low: Vec<(Identity, usize)>,
    ) -> Result<Vec<LowCoverage>, EngineError> {
        let notifier = Arc::clone(&self.notifier);
        tokio::task::spawn_blocking(move || {
            low.into_iter()
                .map(|(identity, remaining)| {
                    let notified = match notifier.notify_low_coverage(&identity, remaining) {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!(error = %e, "low-coverage reminder failed");
                            false
                        }
                    };
                    LowCoverage {
                        identity,
                        remaining,
                        notified,
                    }
                })
                .collect()
        })
        .await
        .map_err(|e| EngineError::Join(e.to_string()))
    }
}

/// Run `sweeper` with notifications every `period` until `shutdown` turns
/// true or its sender is dropped. The first sweep runs immediately.
pub fn spawn_sweeper(
    sweeper: Arc<Sweeper>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(period_secs = period.as_secs(), "sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sweeper.sweep(true).await {
                        tracing::warn!(error = %e, transient = e.is_transient(), "sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("sweeper stopped");
    })
}

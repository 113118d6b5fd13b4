//! Writer-triggered pruning of old telemetry and alerts.
//!
//! There is no scheduler: every Nth inserted row (by its own id) sweeps one
//! bounded batch of that fridge's rows older than the retention window. A sweep
//! never fails the insert that triggered it.

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};

use crate::db::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionRule {
    /// Sweep when `row_id % every == 0`.
    pub every: i64,
    pub batch: i64,
    pub keep: Duration,
}

impl RetentionRule {
    pub fn triggered_by(&self, row_id: i64) -> bool {
        self.every > 0 && row_id > 0 && row_id % self.every == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub measurements: RetentionRule,
    pub alerts: RetentionRule,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy {
            measurements: RetentionRule {
                every: 100,
                batch: 1000,
                keep: Duration::hours(48),
            },
            alerts: RetentionRule {
                every: 50,
                batch: 500,
                keep: Duration::days(7),
            },
        }
    }
}

impl RetentionPolicy {
    /// Post-insert hook for measurements. Returns the number of pruned rows.
    pub fn after_measurement(&self, store: &dyn Store, fridge_id: i64, row_id: i64, now: DateTime<Utc>) -> usize {
        let rule = self.measurements;
        if !rule.triggered_by(row_id) {
            return 0;
        }
        match store.prune_measurements(fridge_id, now - rule.keep, rule.batch) {
            Ok(n) => {
                debug!("Retention: pruned {} measurement(s) of fridge {} (trigger id {})", n, fridge_id, row_id);
                n
            }
            Err(e) => {
                warn!("Retention: measurement sweep for fridge {} failed: {}", fridge_id, e);
                0
            }
        }
    }

    /// Post-insert hook for alerts. Returns the number of pruned rows.
    pub fn after_alert(&self, store: &dyn Store, fridge_id: i64, row_id: i64, now: DateTime<Utc>) -> usize {
        let rule = self.alerts;
        if !rule.triggered_by(row_id) {
            return 0;
        }
        match store.prune_alerts(fridge_id, now - rule.keep, rule.batch) {
            Ok(n) => {
                debug!("Retention: pruned {} alert(s) of fridge {} (trigger id {})", n, fridge_id, row_id);
                n
            }
            Err(e) => {
                warn!("Retention: alert sweep for fridge {} failed: {}", fridge_id, e);
                0
            }
        }
    }
}

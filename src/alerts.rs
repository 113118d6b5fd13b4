//! Read-side queries over stored alerts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::models::{Alert, AlertCategory};
use crate::db::store::Store;
use crate::error::FridgeResult;
use crate::utils::{round_to, window_start};

pub const DEFAULT_ALERT_HOURS: u32 = 24;
pub const DEFAULT_STATISTICS_DAYS: u32 = 7;
pub const DEFAULT_DOOR_HOURS: u32 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
    pub latest: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DoorStatistics {
    pub total_openings: usize,
    pub avg_open_seconds: f64,
    pub max_open_seconds: f64,
    pub total_open_seconds: f64,
}

/// Pairs each `door_closed` with the latest unmatched `door_open` before it.
/// Closings without an opening and openings still pending are ignored.
pub fn door_open_durations(oldest_first: &[Alert]) -> Vec<f64> {
    let mut opened_at: Option<DateTime<Utc>> = None;
    let mut durations = Vec::new();
    for alert in oldest_first {
        match alert.kind() {
            Some(AlertCategory::DoorOpen) => opened_at = Some(alert.timestamp),
            Some(AlertCategory::DoorClosed) => {
                if let Some(open) = opened_at.take() {
                    durations.push((alert.timestamp - open).num_seconds() as f64);
                }
            }
            _ => {}
        }
    }
    durations
}

pub struct AlertCenter {
    store: Arc<dyn Store>,
}

impl AlertCenter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        AlertCenter { store }
    }

    /// Newest first, optionally restricted to one category.
    pub fn recent(&self, fridge_id: i64, hours: Option<u32>, category: Option<AlertCategory>) -> FridgeResult<Vec<Alert>> {
        let since = window_start(hours.unwrap_or(DEFAULT_ALERT_HOURS));
        match category {
            Some(c) => self.store.alerts_since(fridge_id, since, Some(std::slice::from_ref(&c))),
            None => self.store.alerts_since(fridge_id, since, None),
        }
    }

    pub fn critical(&self, fridge_id: i64, hours: Option<u32>) -> FridgeResult<Vec<Alert>> {
        let since = window_start(hours.unwrap_or(DEFAULT_ALERT_HOURS));
        self.store
            .alerts_since(fridge_id, since, Some(&AlertCategory::CRITICAL[..]))
    }

    /// Alert counts per category over the last `days`, most frequent first.
    pub fn statistics(&self, fridge_id: i64, days: Option<u32>) -> FridgeResult<Vec<CategoryCount>> {
        let days = days.unwrap_or(DEFAULT_STATISTICS_DAYS);
        let alerts = self
            .store
            .alerts_since(fridge_id, window_start(days.saturating_mul(24)), None)?;

        let mut counts: HashMap<String, CategoryCount> = HashMap::new();
        for alert in alerts {
            let entry = counts.entry(alert.category.clone()).or_insert(CategoryCount {
                category: alert.category,
                count: 0,
                latest: alert.timestamp,
            });
            entry.count += 1;
            entry.latest = entry.latest.max(alert.timestamp);
        }
        let mut out: Vec<CategoryCount> = counts.into_values().collect();
        out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        Ok(out)
    }

    /// How long the door stayed open over the window, from paired door events.
    pub fn door_statistics(&self, fridge_id: i64, hours: Option<u32>) -> FridgeResult<DoorStatistics> {
        let since = window_start(hours.unwrap_or(DEFAULT_DOOR_HOURS));
        let mut events = self.store.alerts_since(
            fridge_id,
            since,
            Some(&[AlertCategory::DoorOpen, AlertCategory::DoorClosed][..]),
        )?;
        events.reverse();

        let durations = door_open_durations(&events);
        if durations.is_empty() {
            return Ok(DoorStatistics::default());
        }
        let total: f64 = durations.iter().sum();
        Ok(DoorStatistics {
            total_openings: durations.len(),
            avg_open_seconds: round_to(total / durations.len() as f64, 2),
            max_open_seconds: durations.iter().copied().fold(0.0, f64::max),
            total_open_seconds: total,
        })
    }
}

//! Measurement and device-event ingestion plus the telemetry read side.

use chrono::{DateTime, Timelike, Utc};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::{TokenAuthority, TokenKind};
use crate::classifier;
use crate::db::models::{AlertCategory, Measurement, NewAlert, NewMeasurement};
use crate::db::store::{ReadingRows, Store};
use crate::error::{FridgeError, FridgeResult};
use crate::retention::RetentionPolicy;
use crate::utils::{resolve_timestamp, round_to, window_start, window_start_at};

pub const DEFAULT_HISTORY_HOURS: u32 = 48;
pub const DEFAULT_ENERGY_HOURS: u32 = 24;
pub const DEFAULT_PRICE_PER_KWH: f64 = 0.25;
pub const DEFAULT_TREND_HOURS: u32 = 6;
pub const DEFAULT_PATTERN_HOURS: u32 = 168;
/// Change in average temperature (°C) between the two halves of the trend
/// window that counts as a real movement.
pub const TREND_THRESHOLD_C: f64 = 0.5;

/// One telemetry sample as sent by a device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub power: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Temperature,
    Power,
}

impl Metric {
    fn of(self, m: &Measurement) -> f64 {
        match self {
            Metric::Temperature => m.temperature,
            Metric::Power => m.power,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Stats {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    pub fn between(earlier: f64, later: f64) -> Trend {
        let diff = later - earlier;
        if diff > TREND_THRESHOLD_C {
            Trend::Increasing
        } else if diff < -TREND_THRESHOLD_C {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Energy {
    pub hours: u32,
    pub kwh: f64,
    pub cost: f64,
    pub price_per_kwh: f64,
}

/// Averages of all samples taken during one hour of the day (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourlyAverage {
    pub hour: u32,
    pub avg_temperature: f64,
    pub avg_power: f64,
    pub sample_count: usize,
}

/// Energy drawn between consecutive samples, in kWh. Each sample's power is
/// held until the next one; the last sample contributes nothing.
pub fn energy_kwh(oldest_first: &[Measurement]) -> f64 {
    let kwh: f64 = oldest_first
        .windows(2)
        .map(|pair| {
            let hours = (pair[1].timestamp - pair[0].timestamp).num_seconds() as f64 / 3600.0;
            pair[0].power * hours / 1000.0
        })
        .sum();
    round_to(kwh, 3)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

pub struct TelemetryIngestor {
    store: Arc<dyn Store>,
    tokens: Arc<TokenAuthority>,
    retention: RetentionPolicy,
}

impl TelemetryIngestor {
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenAuthority>) -> Self {
        Self::with_retention(store, tokens, RetentionPolicy::default())
    }

    pub fn with_retention(store: Arc<dyn Store>, tokens: Arc<TokenAuthority>, retention: RetentionPolicy) -> Self {
        TelemetryIngestor {
            store,
            tokens,
            retention,
        }
    }

    fn fridge_of(&self, fridge_token: &str) -> FridgeResult<i64> {
        Ok(self.tokens.validate(fridge_token, TokenKind::Fridge)?.subject_id)
    }

    /// Persists one reading and the alerts it triggers. Returns the measurement id.
    pub fn record_measurement(
        &self,
        fridge_token: &str,
        temperature: f64,
        power: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> FridgeResult<i64> {
        let fridge_id = self.fridge_of(fridge_token)?;
        let reading = Reading {
            temperature,
            power,
            timestamp,
        };
        classifier::validate_reading(temperature, power)?;
        self.write_readings(fridge_id, std::slice::from_ref(&reading))?
            .into_iter()
            .next()
            .ok_or_else(|| FridgeError::Storage("measurement was not stored".to_string()))
    }

    /// All readings are range-checked first, then written in one transaction.
    pub fn record_batch(&self, fridge_token: &str, readings: &[Reading]) -> FridgeResult<Vec<i64>> {
        let fridge_id = self.fridge_of(fridge_token)?;
        for (i, r) in readings.iter().enumerate() {
            classifier::validate_reading(r.temperature, r.power).map_err(|e| match e {
                FridgeError::InvalidInput(msg) => FridgeError::InvalidInput(format!("reading {}: {}", i, msg)),
                other => other,
            })?;
        }
        let ids = self.write_readings(fridge_id, readings)?;
        info!("Recorded batch of {} measurement(s) for fridge {}", ids.len(), fridge_id);
        Ok(ids)
    }

    fn write_readings(&self, fridge_id: i64, readings: &[Reading]) -> FridgeResult<Vec<i64>> {
        let rows: Vec<ReadingRows> = readings
            .iter()
            .map(|reading| {
                let ts = resolve_timestamp(reading.timestamp);
                // thresholds apply to the reading as sent, not the rounded copy
                let alerts = classifier::classify(reading.temperature, reading.power)
                    .into_iter()
                    .map(|category| {
                        let message = classifier::alert_message(category, reading.temperature, reading.power);
                        NewAlert::new(fridge_id, ts, category, message)
                    })
                    .collect();
                ReadingRows {
                    measurement: NewMeasurement {
                        fridge_id,
                        timestamp: ts,
                        temperature: round_to(reading.temperature, 1),
                        power: round_to(reading.power, 2),
                    },
                    alerts,
                }
            })
            .collect();
        let stored = self.store.insert_measurements_with_alerts(rows)?;

        // sweeps run only after the rows are committed
        let now = Utc::now();
        for reading in &stored {
            for &alert_id in &reading.alert_ids {
                self.retention.after_alert(self.store.as_ref(), fridge_id, alert_id, now);
            }
            self.retention
                .after_measurement(self.store.as_ref(), fridge_id, reading.measurement_id, now);
            debug!(
                "Stored measurement {} for fridge {} with {} alert(s)",
                reading.measurement_id,
                fridge_id,
                reading.alert_ids.len()
            );
        }
        Ok(stored.into_iter().map(|r| r.measurement_id).collect())
    }

    fn insert_alert(&self, row: NewAlert) -> FridgeResult<i64> {
        let fridge_id = row.fridge_id;
        let alert_id = self.store.insert_alert(row)?;
        self.retention
            .after_alert(self.store.as_ref(), fridge_id, alert_id, Utc::now());
        Ok(alert_id)
    }

    pub fn record_door_event(&self, fridge_token: &str, open: bool, timestamp: Option<DateTime<Utc>>) -> FridgeResult<i64> {
        let category = if open {
            AlertCategory::DoorOpen
        } else {
            AlertCategory::DoorClosed
        };
        self.report_alert(fridge_token, category, classifier::alert_message(category, 0.0, 0.0), timestamp)
    }

    /// Stores an alert raised by the device itself, such as `door_left_open`.
    pub fn report_alert(
        &self,
        fridge_token: &str,
        category: AlertCategory,
        message: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> FridgeResult<i64> {
        let fridge_id = self.fridge_of(fridge_token)?;
        let message = message.into();
        if message.trim().is_empty() {
            return Err(FridgeError::InvalidInput("alert message must not be empty".to_string()));
        }
        let id = self.insert_alert(NewAlert::new(fridge_id, resolve_timestamp(timestamp), category, message.trim()))?;
        debug!("Stored {} alert {} for fridge {}", category, id, fridge_id);
        Ok(id)
    }

    /// Newest first; defaults to the last 48 hours.
    pub fn history(&self, fridge_id: i64, hours: Option<u32>) -> FridgeResult<Vec<Measurement>> {
        self.store
            .measurements_since(fridge_id, window_start(hours.unwrap_or(DEFAULT_HISTORY_HOURS)))
    }

    pub fn latest(&self, fridge_id: i64) -> FridgeResult<Option<Measurement>> {
        self.store.latest_measurement(fridge_id)
    }

    /// Aggregates one metric over the window. An empty window yields all zeros.
    pub fn stats(&self, fridge_id: i64, hours: Option<u32>, metric: Metric) -> FridgeResult<Stats> {
        let rows = self.history(fridge_id, hours)?;
        if rows.is_empty() {
            return Ok(Stats::default());
        }
        let values = rows.iter().map(|m| metric.of(m));
        let (sum, min, max) = values.fold((0.0, f64::INFINITY, f64::NEG_INFINITY), |(s, lo, hi), v| {
            (s + v, lo.min(v), hi.max(v))
        });
        Ok(Stats {
            count: rows.len(),
            average: round_to(sum / rows.len() as f64, 2),
            min,
            max,
        })
    }

    /// kWh used over the window, from the power held between samples.
    pub fn energy_consumption(&self, fridge_id: i64, hours: Option<u32>) -> FridgeResult<f64> {
        let mut rows = self.history(fridge_id, Some(hours.unwrap_or(DEFAULT_ENERGY_HOURS)))?;
        rows.reverse();
        Ok(energy_kwh(&rows))
    }

    pub fn energy(&self, fridge_id: i64, hours: Option<u32>, price_per_kwh: Option<f64>) -> FridgeResult<Energy> {
        let price_per_kwh = price_per_kwh.unwrap_or(DEFAULT_PRICE_PER_KWH);
        if !price_per_kwh.is_finite() || price_per_kwh < 0.0 {
            return Err(FridgeError::InvalidInput(format!(
                "price per kWh must be a non-negative number, got {}",
                price_per_kwh
            )));
        }
        let hours = hours.unwrap_or(DEFAULT_ENERGY_HOURS);
        let kwh = self.energy_consumption(fridge_id, Some(hours))?;
        Ok(Energy {
            hours,
            kwh,
            cost: round_to(kwh * price_per_kwh, 2),
            price_per_kwh,
        })
    }

    /// Compares the average temperature of the older half of the window with
    /// the newer half. Stable when either half has no samples.
    pub fn temperature_trend(&self, fridge_id: i64, hours: Option<u32>) -> FridgeResult<Trend> {
        let now = Utc::now();
        let start = window_start_at(now, hours.unwrap_or(DEFAULT_TREND_HOURS));
        let middle = start + (now - start) / 2;
        let rows = self.store.measurements_since(fridge_id, start)?;
        let earlier = mean(rows.iter().filter(|m| m.timestamp < middle).map(|m| m.temperature));
        let later = mean(rows.iter().filter(|m| m.timestamp >= middle).map(|m| m.temperature));
        Ok(match (earlier, later) {
            (Some(earlier), Some(later)) => Trend::between(earlier, later),
            _ => Trend::Stable,
        })
    }

    /// One entry per hour of the day that has samples, ordered by hour.
    pub fn hourly_averages(&self, fridge_id: i64, hours: Option<u32>) -> FridgeResult<Vec<HourlyAverage>> {
        let rows = self.history(fridge_id, Some(hours.unwrap_or(DEFAULT_PATTERN_HOURS)))?;
        let mut by_hour: BTreeMap<u32, (f64, f64, usize)> = BTreeMap::new();
        for m in &rows {
            let slot = by_hour.entry(m.timestamp.hour()).or_insert((0.0, 0.0, 0));
            slot.0 += m.temperature;
            slot.1 += m.power;
            slot.2 += 1;
        }
        Ok(by_hour
            .into_iter()
            .map(|(hour, (temperature, power, n))| HourlyAverage {
                hour,
                avg_temperature: round_to(temperature / n as f64, 2),
                avg_power: round_to(power / n as f64, 2),
                sample_count: n,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenPolicy;
    use crate::db::memory::MemoryStore;
    use crate::db::models::NewFridge;
    use crate::retention::RetentionRule;
    use chrono::{Duration, DurationRound};

    struct Fixture {
        store: Arc<MemoryStore>,
        tokens: Arc<TokenAuthority>,
        fridge_id: i64,
        token: String,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let tokens = Arc::new(TokenAuthority::new(b"telemetry-tests-secret-0123456789abcdef", TokenPolicy::default()));
        let fridge_id = store
            .insert_fridge(NewFridge {
                owner_user_id: None,
                position: "kitchen".into(),
            })
            .unwrap();
        let token = tokens.issue_fridge_token(fridge_id);
        Fixture {
            store,
            tokens,
            fridge_id,
            token,
        }
    }

    fn ingestor(f: &Fixture) -> TelemetryIngestor {
        TelemetryIngestor::new(f.store.clone(), f.tokens.clone())
    }

    fn all_alerts(f: &Fixture) -> Vec<crate::db::models::Alert> {
        f.store
            .alerts_since(f.fridge_id, Utc::now() - Duration::days(30), None)
            .unwrap()
    }

    #[test]
    fn critical_temperature_creates_one_alert_with_value() {
        let f = fixture();
        let ingest = ingestor(&f);
        ingest.record_measurement(&f.token, 26.0, 100.0, None).unwrap();

        let alerts = all_alerts(&f);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind(), Some(AlertCategory::CriticTemp));
        assert_eq!(alerts[0].fridge_id, f.fridge_id);
        assert!(alerts[0].message.contains("26.0"));
    }

    #[test]
    fn alerts_share_the_measurement_timestamp() {
        let f = fixture();
        let ingest = ingestor(&f);
        let ts = Utc::now() - Duration::minutes(10);
        ingest.record_measurement(&f.token, 30.0, 800.0, Some(ts)).unwrap();

        let stored = ingest.latest(f.fridge_id).unwrap().unwrap();
        let alerts = all_alerts(&f);
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.timestamp == stored.timestamp));
        assert_eq!(stored.timestamp, crate::utils::to_seconds(ts));
    }

    #[test]
    fn values_are_stored_at_fixed_precision() {
        let f = fixture();
        let ingest = ingestor(&f);
        ingest.record_measurement(&f.token, 4.26, 87.456, None).unwrap();
        let m = ingest.latest(f.fridge_id).unwrap().unwrap();
        assert_eq!(m.temperature, 4.3);
        assert_eq!(m.power, 87.46);
    }

    #[test]
    fn out_of_range_reading_writes_nothing() {
        let f = fixture();
        let ingest = ingestor(&f);
        let err = ingest.record_measurement(&f.token, 75.0, 100.0, None).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(ingest.latest(f.fridge_id).unwrap().is_none());
        assert!(all_alerts(&f).is_empty());
    }

    #[test]
    fn user_token_cannot_write_telemetry() {
        let f = fixture();
        let ingest = ingestor(&f);
        let user_token = f.tokens.issue_user_token(f.fridge_id);
        let err = ingest.record_measurement(&user_token, 4.0, 80.0, None).unwrap_err();
        assert!(matches!(err, FridgeError::Unauthorized(_)));
    }

    #[test]
    fn batch_is_all_or_nothing_on_invalid_reading() {
        let f = fixture();
        let ingest = ingestor(&f);
        let readings = [
            Reading {
                temperature: 4.0,
                power: 80.0,
                timestamp: None,
            },
            Reading {
                temperature: 4.0,
                power: -1.0,
                timestamp: None,
            },
        ];
        assert!(ingest.record_batch(&f.token, &readings).is_err());
        assert!(ingest.history(f.fridge_id, None).unwrap().is_empty());

        let ids = ingest.record_batch(&f.token, &readings[..1]).unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn history_is_newest_first_and_windowed() {
        let f = fixture();
        let ingest = ingestor(&f);
        let now = Utc::now();
        for hours_ago in [72, 5, 1, 3] {
            ingest
                .record_measurement(&f.token, 4.0, 80.0, Some(now - Duration::hours(hours_ago)))
                .unwrap();
        }
        let rows = ingest.history(f.fridge_id, None).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert_eq!(ingest.history(f.fridge_id, Some(96)).unwrap().len(), 4);
    }

    #[test]
    fn stats_per_metric() {
        let f = fixture();
        let ingest = ingestor(&f);
        assert_eq!(ingest.stats(f.fridge_id, None, Metric::Power).unwrap(), Stats::default());

        for (t, p) in [(2.0, 100.0), (4.0, 50.0), (6.0, 150.0)] {
            ingest.record_measurement(&f.token, t, p, None).unwrap();
        }
        let temp = ingest.stats(f.fridge_id, None, Metric::Temperature).unwrap();
        assert_eq!(temp.count, 3);
        assert_eq!(temp.average, 4.0);
        assert_eq!((temp.min, temp.max), (2.0, 6.0));
        let power = ingest.stats(f.fridge_id, None, Metric::Power).unwrap();
        assert_eq!((power.min, power.max, power.average), (50.0, 150.0, 100.0));
    }

    #[test]
    fn door_events_and_reported_alerts() {
        let f = fixture();
        let ingest = ingestor(&f);
        ingest.record_door_event(&f.token, true, None).unwrap();
        ingest.record_door_event(&f.token, false, None).unwrap();
        ingest
            .report_alert(&f.token, AlertCategory::DoorLeftOpen, "open for 3 minutes", None)
            .unwrap();
        assert!(ingest.report_alert(&f.token, AlertCategory::SensorOffline, "  ", None).is_err());

        let mut kinds: Vec<_> = all_alerts(&f).iter().filter_map(|a| a.kind()).collect();
        kinds.sort();
        assert_eq!(
            kinds,
            vec![AlertCategory::DoorOpen, AlertCategory::DoorClosed, AlertCategory::DoorLeftOpen]
        );
    }

    #[test]
    fn nth_measurement_sweeps_expired_rows() {
        let f = fixture();
        let policy = RetentionPolicy {
            measurements: RetentionRule {
                every: 5,
                batch: 1000,
                keep: Duration::hours(48),
            },
            ..RetentionPolicy::default()
        };
        let ingest = TelemetryIngestor::with_retention(f.store.clone(), f.tokens.clone(), policy);
        let old = Utc::now() - Duration::days(4);
        for _ in 0..4 {
            ingest.record_measurement(&f.token, 4.0, 80.0, Some(old)).unwrap();
        }
        assert_eq!(ingest.history(f.fridge_id, Some(24 * 30)).unwrap().len(), 4);
        ingest.record_measurement(&f.token, 4.0, 80.0, None).unwrap();
        assert_eq!(ingest.history(f.fridge_id, Some(24 * 30)).unwrap().len(), 1);
    }

    fn sweep_every_row() -> RetentionPolicy {
        let rule = RetentionRule {
            every: 1,
            batch: 100,
            keep: Duration::hours(1),
        };
        RetentionPolicy {
            measurements: rule,
            alerts: rule,
        }
    }

    #[test]
    fn failing_sweep_does_not_fail_the_write() {
        let f = fixture();
        f.store.fail_sweeps();
        let ingest = TelemetryIngestor::with_retention(f.store.clone(), f.tokens.clone(), sweep_every_row());

        let id = ingest.record_measurement(&f.token, 26.0, 100.0, None).unwrap();
        let stored = ingest.latest(f.fridge_id).unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(all_alerts(&f).len(), 1);

        let ids = ingest
            .record_batch(
                &f.token,
                &[Reading {
                    temperature: 4.0,
                    power: 80.0,
                    timestamp: None,
                }],
            )
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ingest.history(f.fridge_id, None).unwrap().len(), 2);
    }

    #[test]
    fn measurement_and_alerts_are_written_together() {
        let f = fixture();
        let ingest = ingestor(&f);
        let readings = [
            Reading {
                temperature: 30.0,
                power: 800.0,
                timestamp: None,
            },
            Reading {
                temperature: 15.0,
                power: 80.0,
                timestamp: None,
            },
        ];
        let ids = ingest.record_batch(&f.token, &readings).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(all_alerts(&f).len(), 2);

        // a fridge that disappears under a still-valid token gets nothing written
        assert!(f.store.delete_fridge(f.fridge_id).unwrap());
        let err = ingest.record_batch(&f.token, &readings).unwrap_err();
        assert!(matches!(err, FridgeError::NotFound(_)));
        assert!(ingest.history(f.fridge_id, Some(24)).unwrap().is_empty());
        assert!(all_alerts(&f).is_empty());
    }

    #[test]
    fn huge_history_window_does_not_overflow() {
        let f = fixture();
        let ingest = ingestor(&f);
        ingest.record_measurement(&f.token, 4.0, 80.0, None).unwrap();
        assert_eq!(ingest.history(f.fridge_id, Some(u32::MAX)).unwrap().len(), 1);
        assert_eq!(ingest.stats(f.fridge_id, Some(u32::MAX), Metric::Power).unwrap().count, 1);
    }

    fn sample(minutes: i64, temperature: f64, power: f64) -> Measurement {
        Measurement {
            id: minutes,
            fridge_id: 1,
            timestamp: DateTime::UNIX_EPOCH + Duration::minutes(minutes),
            temperature,
            power,
        }
    }

    #[test]
    fn energy_holds_each_power_until_the_next_sample() {
        assert_eq!(energy_kwh(&[]), 0.0);
        assert_eq!(energy_kwh(&[sample(0, 4.0, 100.0)]), 0.0);
        // 100 W for 30 min, then 200 W for 90 min
        let rows = [sample(0, 4.0, 100.0), sample(30, 4.0, 200.0), sample(120, 4.0, 900.0)];
        assert_eq!(energy_kwh(&rows), 0.35);
    }

    #[test]
    fn energy_cost_over_the_window() {
        let f = fixture();
        let ingest = ingestor(&f);
        let now = Utc::now();
        for (hours_ago, power) in [(30, 5000.0), (4, 500.0), (2, 100.0), (1, 100.0)] {
            ingest
                .record_measurement(&f.token, 4.0, power, Some(now - Duration::hours(hours_ago)))
                .unwrap();
        }
        // 500 W for 2 h plus 100 W for 1 h; the 30 h old sample is outside the day
        assert_eq!(ingest.energy_consumption(f.fridge_id, None).unwrap(), 1.1);
        let energy = ingest.energy(f.fridge_id, None, None).unwrap();
        assert_eq!((energy.hours, energy.kwh, energy.cost), (24, 1.1, 0.28));
        assert_eq!(ingest.energy(f.fridge_id, None, Some(0.5)).unwrap().cost, 0.55);
        assert!(ingest.energy(f.fridge_id, None, Some(-0.1)).unwrap_err().is_invalid_input());
        assert!(ingest.energy(f.fridge_id, None, Some(f64::NAN)).is_err());
    }

    #[test]
    fn trend_compares_window_halves() {
        assert_eq!(Trend::between(4.0, 5.0), Trend::Increasing);
        assert_eq!(Trend::between(5.0, 4.0), Trend::Decreasing);
        assert_eq!(Trend::between(4.0, 4.3), Trend::Stable);

        let f = fixture();
        let ingest = ingestor(&f);
        assert_eq!(ingest.temperature_trend(f.fridge_id, None).unwrap(), Trend::Stable);
        let now = Utc::now();
        for (minutes_ago, t) in [(300, 3.0), (240, 3.2), (50, 6.0), (10, 6.4)] {
            ingest
                .record_measurement(&f.token, t, 80.0, Some(now - Duration::minutes(minutes_ago)))
                .unwrap();
        }
        assert_eq!(ingest.temperature_trend(f.fridge_id, None).unwrap(), Trend::Increasing);
        // only the newer half has samples in a two hour window
        assert_eq!(ingest.temperature_trend(f.fridge_id, Some(2)).unwrap(), Trend::Stable);
    }

    #[test]
    fn hourly_pattern_groups_by_hour_of_day() {
        let f = fixture();
        let ingest = ingestor(&f);
        let today = Utc::now().duration_trunc(Duration::days(1)).unwrap() - Duration::days(1);
        for (hour, minute, t, p) in [(3, 0, 2.0, 10.0), (3, 30, 4.0, 30.0), (15, 5, 5.0, 100.0)] {
            let ts = today + Duration::hours(hour) + Duration::minutes(minute);
            ingest.record_measurement(&f.token, t, p, Some(ts)).unwrap();
        }
        let pattern = ingest.hourly_averages(f.fridge_id, None).unwrap();
        assert_eq!(
            pattern,
            vec![
                HourlyAverage {
                    hour: 3,
                    avg_temperature: 3.0,
                    avg_power: 20.0,
                    sample_count: 2,
                },
                HourlyAverage {
                    hour: 15,
                    avg_temperature: 5.0,
                    avg_power: 100.0,
                    sample_count: 1,
                },
            ]
        );
    }
}

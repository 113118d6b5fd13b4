//! Read side as seen by a device or an owner. Every query resolves an
//! [`Access`] first and returns the token the caller should keep using next to
//! the data, so reads slide token expiry the same way `is_authorized` does.

use log::debug;
use serde::Serialize;

use crate::accounts::{Access, Accounts, FridgeAccess};
use crate::alerts::{AlertCenter, CategoryCount, DoorStatistics};
use crate::db::models::{Alert, AlertCategory, Measurement};
use crate::error::FridgeResult;
use crate::inventory::{CategoryShare, Consumption, InventoryLedger, MovementEntry, ShoppingItem, StockItem};
use crate::telemetry::{DEFAULT_ENERGY_HOURS, Energy, HourlyAverage, Metric, Stats, TelemetryIngestor, Trend};

/// Critical alerts shown on the dashboard reach back this far.
pub const DASHBOARD_CRITICAL_HOURS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Authorized<T> {
    pub fridge_id: i64,
    /// Same as the presented token unless it was close to or past expiry.
    pub token: String,
    pub value: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub latest_measurement: Option<Measurement>,
    pub critical_alerts: Vec<Alert>,
    pub product_count: usize,
    pub energy_today_kwh: f64,
    pub energy_today_cost: f64,
}

pub struct FridgeView<'a> {
    accounts: &'a Accounts,
    telemetry: &'a TelemetryIngestor,
    inventory: &'a InventoryLedger,
    alerts: &'a AlertCenter,
}

impl<'a> FridgeView<'a> {
    pub fn new(
        accounts: &'a Accounts,
        telemetry: &'a TelemetryIngestor,
        inventory: &'a InventoryLedger,
        alerts: &'a AlertCenter,
    ) -> Self {
        FridgeView {
            accounts,
            telemetry,
            inventory,
            alerts,
        }
    }

    fn read<T>(&self, access: Access<'_>, query: impl FnOnce(i64) -> FridgeResult<T>) -> FridgeResult<Authorized<T>> {
        let FridgeAccess { fridge_id, token } = self.accounts.authorize_fridge(access)?;
        let value = query(fridge_id)?;
        Ok(Authorized { fridge_id, token, value })
    }

    // telemetry
    pub fn history(&self, access: Access<'_>, hours: Option<u32>) -> FridgeResult<Authorized<Vec<Measurement>>> {
        self.read(access, |id| self.telemetry.history(id, hours))
    }

    pub fn latest(&self, access: Access<'_>) -> FridgeResult<Authorized<Option<Measurement>>> {
        self.read(access, |id| self.telemetry.latest(id))
    }

    pub fn stats(&self, access: Access<'_>, hours: Option<u32>, metric: Metric) -> FridgeResult<Authorized<Stats>> {
        self.read(access, |id| self.telemetry.stats(id, hours, metric))
    }

    pub fn energy(
        &self,
        access: Access<'_>,
        hours: Option<u32>,
        price_per_kwh: Option<f64>,
    ) -> FridgeResult<Authorized<Energy>> {
        self.read(access, |id| self.telemetry.energy(id, hours, price_per_kwh))
    }

    pub fn temperature_trend(&self, access: Access<'_>, hours: Option<u32>) -> FridgeResult<Authorized<Trend>> {
        self.read(access, |id| self.telemetry.temperature_trend(id, hours))
    }

    pub fn hourly_averages(
        &self,
        access: Access<'_>,
        hours: Option<u32>,
    ) -> FridgeResult<Authorized<Vec<HourlyAverage>>> {
        self.read(access, |id| self.telemetry.hourly_averages(id, hours))
    }

    // inventory
    pub fn current_stock(&self, access: Access<'_>) -> FridgeResult<Authorized<Vec<StockItem>>> {
        self.read(access, |id| self.inventory.current_stock(id))
    }

    pub fn movement_history(
        &self,
        access: Access<'_>,
        hours: Option<u32>,
    ) -> FridgeResult<Authorized<Vec<MovementEntry>>> {
        self.read(access, |id| self.inventory.movement_history(id, hours))
    }

    pub fn shopping_list(&self, access: Access<'_>, hours: Option<u32>) -> FridgeResult<Authorized<Vec<ShoppingItem>>> {
        self.read(access, |id| self.inventory.shopping_list(id, hours))
    }

    pub fn category_breakdown(&self, access: Access<'_>) -> FridgeResult<Authorized<Vec<CategoryShare>>> {
        self.read(access, |id| self.inventory.category_breakdown(id))
    }

    pub fn most_consumed(
        &self,
        access: Access<'_>,
        limit: Option<usize>,
        days: Option<u32>,
    ) -> FridgeResult<Authorized<Vec<Consumption>>> {
        self.read(access, |id| self.inventory.most_consumed(id, limit, days))
    }

    // alerts
    pub fn recent_alerts(
        &self,
        access: Access<'_>,
        hours: Option<u32>,
        category: Option<AlertCategory>,
    ) -> FridgeResult<Authorized<Vec<Alert>>> {
        self.read(access, |id| self.alerts.recent(id, hours, category))
    }

    pub fn critical_alerts(&self, access: Access<'_>, hours: Option<u32>) -> FridgeResult<Authorized<Vec<Alert>>> {
        self.read(access, |id| self.alerts.critical(id, hours))
    }

    pub fn alert_statistics(
        &self,
        access: Access<'_>,
        days: Option<u32>,
    ) -> FridgeResult<Authorized<Vec<CategoryCount>>> {
        self.read(access, |id| self.alerts.statistics(id, days))
    }

    pub fn door_statistics(&self, access: Access<'_>, hours: Option<u32>) -> FridgeResult<Authorized<DoorStatistics>> {
        self.read(access, |id| self.alerts.door_statistics(id, hours))
    }

    /// Latest reading, critical alerts of the last two hours, stocked product
    /// count and the energy used over the last day.
    pub fn dashboard(&self, access: Access<'_>) -> FridgeResult<Authorized<Dashboard>> {
        self.read(access, |fridge_id| {
            let energy = self.telemetry.energy(fridge_id, Some(DEFAULT_ENERGY_HOURS), None)?;
            let dashboard = Dashboard {
                latest_measurement: self.telemetry.latest(fridge_id)?,
                critical_alerts: self.alerts.critical(fridge_id, Some(DASHBOARD_CRITICAL_HOURS))?,
                product_count: self.inventory.current_stock(fridge_id)?.len(),
                energy_today_kwh: energy.kwh,
                energy_today_cost: energy.cost,
            };
            debug!("Dashboard for fridge {} built", fridge_id);
            Ok(dashboard)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{TokenAuthority, TokenKind, TokenPolicy};
    use crate::db::memory::MemoryStore;
    use crate::db::models::ProductCategory;
    use crate::error::FridgeError;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    struct Fixture {
        tokens: Arc<TokenAuthority>,
        accounts: Accounts,
        telemetry: TelemetryIngestor,
        inventory: InventoryLedger,
        alerts: AlertCenter,
        user_token: String,
        fridge_id: i64,
        fridge_token: String,
    }

    impl Fixture {
        fn view(&self) -> FridgeView<'_> {
            FridgeView::new(&self.accounts, &self.telemetry, &self.inventory, &self.alerts)
        }
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let tokens = Arc::new(TokenAuthority::new(b"view-tests-secret-0123456789abcdef", TokenPolicy::default()));
        let accounts = Accounts::new(store.clone(), tokens.clone());
        let user_token = accounts.register_user("owner@example.com", "owner-password").unwrap();
        let fridge = accounts.register_fridge(&user_token, "kitchen").unwrap();
        Fixture {
            telemetry: TelemetryIngestor::new(store.clone(), tokens.clone()),
            inventory: InventoryLedger::new(store.clone(), tokens.clone()),
            alerts: AlertCenter::new(store),
            tokens,
            accounts,
            user_token,
            fridge_id: fridge.fridge_id,
            fridge_token: fridge.token,
        }
    }

    #[test]
    fn device_and_owner_read_the_same_history() {
        let f = fixture();
        f.telemetry.record_measurement(&f.fridge_token, 15.0, 80.0, None).unwrap();
        let view = f.view();

        let by_device = view.history(Access::Fridge(&f.fridge_token), None).unwrap();
        assert_eq!(by_device.fridge_id, f.fridge_id);
        assert_eq!(by_device.token, f.fridge_token);
        assert_eq!(by_device.value.len(), 1);

        let owner = Access::Owner {
            user_token: &f.user_token,
            fridge_id: f.fridge_id,
        };
        let by_owner = view.history(owner, None).unwrap();
        assert_eq!(by_owner.token, f.user_token);
        assert_eq!(by_owner.value, by_device.value);
    }

    #[test]
    fn reads_need_the_right_credentials() {
        let f = fixture();
        let view = f.view();
        let stranger = f.accounts.register_user("stranger@example.com", "stranger-password").unwrap();

        let err = view
            .history(
                Access::Owner {
                    user_token: &stranger,
                    fridge_id: f.fridge_id,
                },
                None,
            )
            .unwrap_err();
        assert!(matches!(err, FridgeError::Forbidden(_)), "{:?}", err);

        let err = view.current_stock(Access::Fridge(&f.user_token)).unwrap_err();
        assert!(matches!(err, FridgeError::Unauthorized(_)), "{:?}", err);
        assert!(view.dashboard(Access::Fridge("garbage")).is_err());
    }

    #[test]
    fn reads_hand_back_a_renewed_token_near_expiry() {
        let f = fixture();
        let aging = f
            .tokens
            .issue_at(TokenKind::Fridge, f.fridge_id, Utc::now() - Duration::days(29));
        let read = f.view().alert_statistics(Access::Fridge(&aging), None).unwrap();
        assert_ne!(read.token, aging);
        let renewed = f.tokens.validate(&read.token, TokenKind::Fridge).unwrap();
        assert_eq!(renewed.subject_id, f.fridge_id);
        assert!(renewed.expires_at > Utc::now() + Duration::days(29));
    }

    #[test]
    fn dashboard_summarises_the_fridge() {
        let f = fixture();
        let now = Utc::now();
        f.telemetry
            .record_measurement(&f.fridge_token, 15.0, 100.0, Some(now - Duration::hours(3)))
            .unwrap();
        f.telemetry
            .record_measurement(&f.fridge_token, 26.0, 100.0, Some(now - Duration::hours(1)))
            .unwrap();
        let milk = f.inventory.register_product("milk", None, ProductCategory::Dairy).unwrap();
        let eggs = f.inventory.register_product("eggs", None, ProductCategory::Other).unwrap();
        f.inventory.record_movement(&f.fridge_token, milk, 2, None).unwrap();
        f.inventory.record_movement(&f.fridge_token, eggs, 6, None).unwrap();
        f.inventory.record_movement(&f.fridge_token, eggs, -6, None).unwrap();

        let dashboard = f.view().dashboard(Access::Fridge(&f.fridge_token)).unwrap().value;
        assert_eq!(dashboard.latest_measurement.map(|m| m.temperature), Some(26.0));
        assert_eq!(dashboard.critical_alerts.len(), 1);
        assert_eq!(dashboard.product_count, 1);
        // 100 W for the two hours between the samples
        assert_eq!(dashboard.energy_today_kwh, 0.2);
        assert_eq!(dashboard.energy_today_cost, 0.05);
    }
}

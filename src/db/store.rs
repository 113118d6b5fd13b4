//! Storage contract consumed by the fridge core.
//!
//! Everything the classification, ledger and token logic needs from a backing
//! store goes through [`Store`]. Implementations: [`crate::db::pg::PgStore`]
//! (diesel/PostgreSQL) and [`crate::db::memory::MemoryStore`].

use chrono::{DateTime, Utc};

use crate::db::models::{
    Alert, AlertCategory, Fridge, Measurement, NewAlert, NewFridge, NewMeasurement, NewProduct, NewProductMovement,
    NewUser, OwnerStatistics, Product, ProductFridge, ProductMovement, StockChange, User,
};
use crate::error::FridgeResult;

/// Pure reconciliation step run under the stock-row lock. Receives the current
/// stock row (if any) and returns its new values, or an error to abort the movement.
pub type Reconcile<'a> = &'a dyn Fn(Option<&ProductFridge>) -> FridgeResult<StockChange>;

/// A measurement together with the alerts classified from it.
#[derive(Debug, Clone)]
pub struct ReadingRows {
    pub measurement: NewMeasurement,
    pub alerts: Vec<NewAlert>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReading {
    pub measurement_id: i64,
    pub alert_ids: Vec<i64>,
}

pub trait Store: Send + Sync {
    // users
    /// Fails with `Conflict` when the email is taken.
    fn insert_user(&self, row: NewUser) -> FridgeResult<i64>;
    fn find_user(&self, user_id: i64) -> FridgeResult<Option<User>>;
    fn find_user_by_email(&self, email: &str) -> FridgeResult<Option<User>>;
    fn update_password(&self, user_id: i64, password_hash: &str) -> FridgeResult<bool>;
    /// Deletes the user and nulls `owner_user_id` on the user's fridges.
    fn delete_user(&self, user_id: i64) -> FridgeResult<bool>;
    fn owner_statistics(&self, user_id: i64) -> FridgeResult<OwnerStatistics>;

    // fridges
    fn insert_fridge(&self, row: NewFridge) -> FridgeResult<i64>;
    fn find_fridge(&self, fridge_id: i64) -> FridgeResult<Option<Fridge>>;
    fn fridges_by_owner(&self, user_id: i64) -> FridgeResult<Vec<Fridge>>;
    fn update_fridge_position(&self, fridge_id: i64, position: &str) -> FridgeResult<bool>;
    /// Removes the fridge together with its telemetry, alerts and ledger.
    fn delete_fridge(&self, fridge_id: i64) -> FridgeResult<bool>;

    // telemetry
    fn insert_measurement(&self, row: NewMeasurement) -> FridgeResult<i64>;
    /// Writes every measurement with its alerts in one transaction. Either all
    /// rows are stored or none are.
    fn insert_measurements_with_alerts(&self, readings: Vec<ReadingRows>) -> FridgeResult<Vec<StoredReading>>;
    /// Newest first.
    fn measurements_since(&self, fridge_id: i64, since: DateTime<Utc>) -> FridgeResult<Vec<Measurement>>;
    fn latest_measurement(&self, fridge_id: i64) -> FridgeResult<Option<Measurement>>;
    /// Deletes at most `limit` rows older than `older_than`, oldest ids first.
    fn prune_measurements(&self, fridge_id: i64, older_than: DateTime<Utc>, limit: i64) -> FridgeResult<usize>;

    // alerts
    fn insert_alert(&self, row: NewAlert) -> FridgeResult<i64>;
    /// Newest first; `categories` restricts the result when given.
    fn alerts_since(
        &self,
        fridge_id: i64,
        since: DateTime<Utc>,
        categories: Option<&[AlertCategory]>,
    ) -> FridgeResult<Vec<Alert>>;
    fn prune_alerts(&self, fridge_id: i64, older_than: DateTime<Utc>, limit: i64) -> FridgeResult<usize>;

    // product catalog
    fn insert_product(&self, row: NewProduct) -> FridgeResult<i64>;
    fn find_product(&self, product_id: i64) -> FridgeResult<Option<Product>>;
    fn find_product_by_name(&self, name: &str) -> FridgeResult<Option<Product>>;

    // ledger
    /// Appends the movement and writes the reconciled stock row atomically with
    /// respect to other movements on the same `(fridge_id, product_id)`.
    /// Nothing is written when `reconcile` fails.
    fn apply_movement(&self, row: NewProductMovement, reconcile: Reconcile<'_>) -> FridgeResult<i64>;
    /// Newest first, joined with the product.
    fn movements_since(&self, fridge_id: i64, since: DateTime<Utc>) -> FridgeResult<Vec<(ProductMovement, Product)>>;
    fn stock_row(&self, fridge_id: i64, product_id: i64) -> FridgeResult<Option<ProductFridge>>;
    /// Stock rows with quantity > 0, most recently added first.
    fn current_stock(&self, fridge_id: i64) -> FridgeResult<Vec<(ProductFridge, Product)>>;
    /// Stock rows that ran out at or after `since`, most recent first.
    fn finished_since(&self, fridge_id: i64, since: DateTime<Utc>) -> FridgeResult<Vec<(ProductFridge, Product)>>;
}

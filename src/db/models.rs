//! Row types for users, fridges, telemetry, alerts and the product ledger.
//!
//! The same structs back both the diesel store and the in-memory store, so the
//! enum-valued columns (`category`) are kept as text and parsed on demand.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    DoorOpen,
    DoorClosed,
    DoorLeftOpen,
    HighTemp,
    CriticTemp,
    LowTemp,
    CriticPower,
    /// Kept for schema compatibility; nothing in the server emits it on its own.
    SensorOffline,
}

impl AlertCategory {
    pub const ALL: [AlertCategory; 8] = [
        AlertCategory::DoorOpen,
        AlertCategory::DoorClosed,
        AlertCategory::DoorLeftOpen,
        AlertCategory::HighTemp,
        AlertCategory::CriticTemp,
        AlertCategory::LowTemp,
        AlertCategory::CriticPower,
        AlertCategory::SensorOffline,
    ];

    pub const CRITICAL: [AlertCategory; 2] = [AlertCategory::CriticTemp, AlertCategory::CriticPower];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertCategory::DoorOpen => "door_open",
            AlertCategory::DoorClosed => "door_closed",
            AlertCategory::DoorLeftOpen => "door_left_open",
            AlertCategory::HighTemp => "high_temp",
            AlertCategory::CriticTemp => "critic_temp",
            AlertCategory::LowTemp => "low_temp",
            AlertCategory::CriticPower => "critic_power",
            AlertCategory::SensorOffline => "sensor_offline",
        }
    }
}

impl Display for AlertCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown alert category: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Meat,
    Fish,
    Dairy,
    Vegetables,
    Bread,
    Other,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 6] = [
        ProductCategory::Meat,
        ProductCategory::Fish,
        ProductCategory::Dairy,
        ProductCategory::Vegetables,
        ProductCategory::Bread,
        ProductCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProductCategory::Meat => "meat",
            ProductCategory::Fish => "fish",
            ProductCategory::Dairy => "dairy",
            ProductCategory::Vegetables => "vegetables",
            ProductCategory::Bread => "bread",
            ProductCategory::Other => "other",
        }
    }
}

impl Display for ProductCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown product category: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::users)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::fridges)]
pub struct Fridge {
    pub id: i64,
    pub owner_user_id: Option<i64>,
    pub position: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::fridges)]
pub struct NewFridge {
    pub owner_user_id: Option<i64>,
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::products)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub brand: Option<String>,
    pub category: String,
}

impl Product {
    pub fn kind(&self) -> ProductCategory {
        self.category.parse().unwrap_or(ProductCategory::Other)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::products)]
pub struct NewProduct {
    pub name: String,
    pub brand: Option<String>,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::measurements)]
pub struct Measurement {
    pub id: i64,
    pub fridge_id: i64,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub power: f64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::measurements)]
pub struct NewMeasurement {
    pub fridge_id: i64,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub power: f64,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::alerts)]
pub struct Alert {
    pub id: i64,
    pub fridge_id: i64,
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub message: String,
}

impl Alert {
    pub fn kind(&self) -> Option<AlertCategory> {
        self.category.parse().ok()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::alerts)]
pub struct NewAlert {
    pub fridge_id: i64,
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub message: String,
}

impl NewAlert {
    pub fn new(fridge_id: i64, timestamp: DateTime<Utc>, category: AlertCategory, message: impl Into<String>) -> Self {
        NewAlert {
            fridge_id,
            timestamp,
            category: category.as_str().to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::product_movements)]
pub struct ProductMovement {
    pub id: i64,
    pub fridge_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::product_movements)]
pub struct NewProductMovement {
    pub fridge_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub timestamp: DateTime<Utc>,
}

/// Materialized stock row; only the ledger reconciliation writes it.
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::product_fridge)]
pub struct ProductFridge {
    pub id: i64,
    pub fridge_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub added_in: Option<DateTime<Utc>>,
    pub removed_in: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::product_fridge)]
pub struct NewProductFridge {
    pub fridge_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub added_in: Option<DateTime<Utc>>,
    pub removed_in: Option<DateTime<Utc>>,
}

/// New values for a stock row, computed by the ledger reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub quantity: i64,
    pub added_in: Option<DateTime<Utc>>,
    pub removed_in: Option<DateTime<Utc>>,
}

/// Per-owner row counts across all of the owner's fridges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OwnerStatistics {
    pub total_fridges: i64,
    pub total_measurements: i64,
    pub total_alerts: i64,
    pub total_products: i64,
    pub total_product_movements: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_category_names_round_trip_through_from_str() {
        for category in AlertCategory::ALL {
            assert_eq!(category.as_str().parse::<AlertCategory>(), Ok(category));
        }
        assert!("freezer_burn".parse::<AlertCategory>().is_err());
    }

    #[test]
    fn serde_name_matches_column_value() {
        let json = serde_json::to_value(AlertCategory::DoorLeftOpen).unwrap();
        assert_eq!(json.as_str(), Some("door_left_open"));
        let json = serde_json::to_value(ProductCategory::Vegetables).unwrap();
        assert_eq!(json.as_str(), Some("vegetables"));
    }

    #[test]
    fn unknown_product_category_reads_as_other() {
        let p = Product {
            id: 1,
            name: "kombucha".into(),
            brand: None,
            category: "drinks".into(),
        };
        assert_eq!(p.kind(), ProductCategory::Other);
    }
}

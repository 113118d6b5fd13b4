//! Product movement ledger and the current-stock view derived from it.
//!
//! Every movement is appended to `product_movements`; the matching
//! `product_fridge` row is reconciled in the same store call while that row is
//! locked, so its quantity always equals the sum of the pair's movements.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::{TokenAuthority, TokenKind};
use crate::db::models::{NewProduct, NewProductMovement, Product, ProductCategory, ProductFridge, ProductMovement, StockChange};
use crate::db::store::Store;
use crate::error::{FridgeError, FridgeResult};
use crate::utils::{resolve_timestamp, window_start};

pub const DEFAULT_MOVEMENT_HOURS: u32 = 168;
pub const DEFAULT_SHOPPING_HOURS: u32 = 48;
pub const DEFAULT_CONSUMPTION_DAYS: u32 = 30;
pub const DEFAULT_CONSUMPTION_LIMIT: usize = 10;

/// New stock values after applying `delta` at `ts` to the current row.
///
/// `removed_in` is set exactly when the total reaches zero. `added_in` moves to
/// `ts` when the row is created or restocked from zero.
pub fn reconcile(current: Option<&ProductFridge>, delta: i64, ts: DateTime<Utc>) -> FridgeResult<StockChange> {
    let Some(row) = current else {
        if delta < 0 {
            return Err(FridgeError::InvalidState(format!(
                "cannot remove {} unit(s) of a product that was never stocked",
                delta.unsigned_abs()
            )));
        }
        return Ok(StockChange {
            quantity: delta,
            added_in: Some(ts),
            removed_in: None,
        });
    };

    let quantity = row
        .quantity
        .checked_add(delta)
        .ok_or_else(|| FridgeError::InvalidInput(format!("movement of {} overflows the stock of {}", delta, row.quantity)))?;
    if quantity < 0 {
        return Err(FridgeError::InvalidState(format!(
            "removing {} unit(s) would leave {} in stock",
            delta.unsigned_abs(),
            quantity
        )));
    }
    let restocked = row.quantity == 0 && quantity > 0;
    Ok(StockChange {
        quantity,
        added_in: if restocked || row.added_in.is_none() { Some(ts) } else { row.added_in },
        removed_in: if quantity == 0 { Some(ts) } else { None },
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockItem {
    pub product: Product,
    pub quantity: i64,
    pub added_in: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementEntry {
    pub movement: ProductMovement,
    pub product: Product,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingItem {
    pub product: Product,
    pub finished_at: DateTime<Utc>,
}

/// Units removed from the fridge over a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consumption {
    pub product: Product,
    pub consumed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryShare {
    pub category: ProductCategory,
    pub products: usize,
    pub quantity: i64,
}

pub struct InventoryLedger {
    store: Arc<dyn Store>,
    tokens: Arc<TokenAuthority>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenAuthority>) -> Self {
        InventoryLedger { store, tokens }
    }

    /// Appends a signed movement (positive adds, negative removes) and updates
    /// the stock row. Returns the movement id.
    pub fn record_movement(
        &self,
        fridge_token: &str,
        product_id: i64,
        quantity: i64,
        timestamp: Option<DateTime<Utc>>,
    ) -> FridgeResult<i64> {
        let fridge_id = self.tokens.validate(fridge_token, TokenKind::Fridge)?.subject_id;
        if quantity == 0 {
            return Err(FridgeError::InvalidInput("movement quantity must not be zero".to_string()));
        }
        let ts = resolve_timestamp(timestamp);
        let row = NewProductMovement {
            fridge_id,
            product_id,
            quantity,
            timestamp: ts,
        };
        let id = self
            .store
            .apply_movement(row, &|current| reconcile(current, quantity, ts))?;
        debug!(
            "Movement {}: fridge {} product {} {:+}",
            id, fridge_id, product_id, quantity
        );
        Ok(id)
    }

    /// Products with quantity above zero, most recently added first.
    pub fn current_stock(&self, fridge_id: i64) -> FridgeResult<Vec<StockItem>> {
        Ok(self
            .store
            .current_stock(fridge_id)?
            .into_iter()
            .map(|(stock, product)| StockItem {
                product,
                quantity: stock.quantity,
                added_in: stock.added_in,
            })
            .collect())
    }

    /// Newest first; defaults to the last week.
    pub fn movement_history(&self, fridge_id: i64, hours: Option<u32>) -> FridgeResult<Vec<MovementEntry>> {
        let since = window_start(hours.unwrap_or(DEFAULT_MOVEMENT_HOURS));
        Ok(self
            .store
            .movements_since(fridge_id, since)?
            .into_iter()
            .map(|(movement, product)| MovementEntry { movement, product })
            .collect())
    }

    pub fn register_product(&self, name: &str, brand: Option<&str>, category: ProductCategory) -> FridgeResult<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FridgeError::InvalidInput("product name must not be empty".to_string()));
        }
        let brand = brand.map(str::trim).filter(|b| !b.is_empty()).map(str::to_string);
        let id = self.store.insert_product(NewProduct {
            name: name.to_string(),
            brand,
            category: category.as_str().to_string(),
        })?;
        info!("Registered product {} ({}) as {}", id, name, category);
        Ok(id)
    }

    /// Case-insensitive exact name match, as used by product detection.
    pub fn find_product_by_name(&self, name: &str) -> FridgeResult<Option<Product>> {
        self.store.find_product_by_name(name.trim())
    }

    /// Products that ran out within the window and have not been restocked since.
    pub fn shopping_list(&self, fridge_id: i64, hours: Option<u32>) -> FridgeResult<Vec<ShoppingItem>> {
        let since = window_start(hours.unwrap_or(DEFAULT_SHOPPING_HOURS));
        Ok(self
            .store
            .finished_since(fridge_id, since)?
            .into_iter()
            .filter_map(|(stock, product)| stock.removed_in.map(|finished_at| ShoppingItem { product, finished_at }))
            .collect())
    }

    pub fn category_breakdown(&self, fridge_id: i64) -> FridgeResult<Vec<CategoryShare>> {
        let mut by_category: BTreeMap<ProductCategory, CategoryShare> = BTreeMap::new();
        for item in self.current_stock(fridge_id)? {
            let category = item.product.kind();
            let share = by_category.entry(category).or_insert(CategoryShare {
                category,
                products: 0,
                quantity: 0,
            });
            share.products += 1;
            share.quantity += item.quantity;
        }
        Ok(by_category.into_values().collect())
    }

    /// Products with the most units removed in the last `days`, most consumed first.
    pub fn most_consumed(&self, fridge_id: i64, limit: Option<usize>, days: Option<u32>) -> FridgeResult<Vec<Consumption>> {
        let since = window_start(days.unwrap_or(DEFAULT_CONSUMPTION_DAYS).saturating_mul(24));
        let mut by_product: BTreeMap<i64, Consumption> = BTreeMap::new();
        for (movement, product) in self.store.movements_since(fridge_id, since)? {
            if movement.quantity >= 0 {
                continue;
            }
            let entry = by_product.entry(product.id).or_insert(Consumption { product, consumed: 0 });
            entry.consumed = entry.consumed.saturating_add(movement.quantity.unsigned_abs());
        }
        let mut out: Vec<Consumption> = by_product.into_values().collect();
        // stable sort keeps product id order among ties
        out.sort_by(|a, b| b.consumed.cmp(&a.consumed));
        out.truncate(limit.unwrap_or(DEFAULT_CONSUMPTION_LIMIT));
        Ok(out)
    }
}

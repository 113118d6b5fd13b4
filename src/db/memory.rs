//! In-process [`Store`] with the same constraint semantics as the Postgres
//! schema (unique email, owner nulled on user delete, cascading fridge delete,
//! unique `(fridge_id, product_id)` stock rows).

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

use crate::db::models::{
    Alert, AlertCategory, Fridge, Measurement, NewAlert, NewFridge, NewMeasurement, NewProduct, NewProductMovement,
    NewUser, OwnerStatistics, Product, ProductFridge, ProductMovement, User,
};
use crate::db::store::{ReadingRows, Reconcile, Store, StoredReading};
use crate::error::{FridgeError, FridgeResult};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    fridges: Vec<Fridge>,
    products: Vec<Product>,
    measurements: Vec<Measurement>,
    alerts: Vec<Alert>,
    movements: Vec<ProductMovement>,
    stock: Vec<ProductFridge>,
    seq: Sequences,
}

#[derive(Debug, Default)]
struct Sequences {
    users: i64,
    fridges: i64,
    products: i64,
    measurements: i64,
    alerts: i64,
    movements: i64,
    stock: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    #[cfg(test)]
    failing_sweeps: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later prune call fail with a storage error.
    #[cfg(test)]
    pub(crate) fn fail_sweeps(&self) {
        self.failing_sweeps.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn check_sweep(&self) -> FridgeResult<()> {
        if self.failing_sweeps.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(FridgeError::Storage("sweep failed".to_string()));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_sweep(&self) -> FridgeResult<()> {
        Ok(())
    }

    fn lock(&self) -> FridgeResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| FridgeError::Storage("memory store lock poisoned".to_string()))
    }

    fn prune<T>(
        rows: &mut Vec<T>,
        limit: i64,
        matches: impl Fn(&T) -> bool,
        id_of: impl Fn(&T) -> i64,
    ) -> usize {
        let mut ids: Vec<i64> = rows.iter().filter(|r| matches(r)).map(&id_of).collect();
        ids.sort_unstable();
        ids.truncate(limit.max(0) as usize);
        let before = rows.len();
        rows.retain(|r| ids.binary_search(&id_of(r)).is_err());
        before - rows.len()
    }
}

impl Store for MemoryStore {
    fn insert_user(&self, row: NewUser) -> FridgeResult<i64> {
        let mut t = self.lock()?;
        if t.users.iter().any(|u| u.email == row.email) {
            return Err(FridgeError::Conflict(format!("email already registered: {}", row.email)));
        }
        let id = next(&mut t.seq.users);
        t.users.push(User {
            id,
            email: row.email,
            password_hash: row.password_hash,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    fn find_user(&self, user_id: i64) -> FridgeResult<Option<User>> {
        Ok(self.lock()?.users.iter().find(|u| u.id == user_id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> FridgeResult<Option<User>> {
        Ok(self.lock()?.users.iter().find(|u| u.email == email).cloned())
    }

    fn update_password(&self, user_id: i64, password_hash: &str) -> FridgeResult<bool> {
        let mut t = self.lock()?;
        Ok(match t.users.iter_mut().find(|u| u.id == user_id) {
            Some(u) => {
                u.password_hash = password_hash.to_string();
                true
            }
            None => false,
        })
    }

    fn delete_user(&self, user_id: i64) -> FridgeResult<bool> {
        let mut t = self.lock()?;
        let before = t.users.len();
        t.users.retain(|u| u.id != user_id);
        if t.users.len() == before {
            return Ok(false);
        }
        for fridge in t.fridges.iter_mut().filter(|f| f.owner_user_id == Some(user_id)) {
            fridge.owner_user_id = None;
        }
        Ok(true)
    }

    fn owner_statistics(&self, user_id: i64) -> FridgeResult<OwnerStatistics> {
        let t = self.lock()?;
        let owned: Vec<i64> = t
            .fridges
            .iter()
            .filter(|f| f.owner_user_id == Some(user_id))
            .map(|f| f.id)
            .collect();
        let count = |ids: &mut dyn Iterator<Item = i64>| ids.filter(|id| owned.contains(id)).count() as i64;
        Ok(OwnerStatistics {
            total_fridges: owned.len() as i64,
            total_measurements: count(&mut t.measurements.iter().map(|m| m.fridge_id)),
            total_alerts: count(&mut t.alerts.iter().map(|a| a.fridge_id)),
            total_products: count(&mut t.stock.iter().filter(|s| s.removed_in.is_none()).map(|s| s.fridge_id)),
            total_product_movements: count(&mut t.movements.iter().map(|m| m.fridge_id)),
        })
    }

    fn insert_fridge(&self, row: NewFridge) -> FridgeResult<i64> {
        let mut t = self.lock()?;
        if let Some(owner) = row.owner_user_id
            && !t.users.iter().any(|u| u.id == owner)
        {
            return Err(FridgeError::NotFound(format!("user {}", owner)));
        }
        let id = next(&mut t.seq.fridges);
        t.fridges.push(Fridge {
            id,
            owner_user_id: row.owner_user_id,
            position: row.position,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    fn find_fridge(&self, fridge_id: i64) -> FridgeResult<Option<Fridge>> {
        Ok(self.lock()?.fridges.iter().find(|f| f.id == fridge_id).cloned())
    }

    fn fridges_by_owner(&self, user_id: i64) -> FridgeResult<Vec<Fridge>> {
        let t = self.lock()?;
        let mut rows: Vec<Fridge> = t
            .fridges
            .iter()
            .filter(|f| f.owner_user_id == Some(user_id))
            .cloned()
            .collect();
        rows.sort_by_key(|f| f.id);
        Ok(rows)
    }

    fn update_fridge_position(&self, fridge_id: i64, position: &str) -> FridgeResult<bool> {
        let mut t = self.lock()?;
        Ok(match t.fridges.iter_mut().find(|f| f.id == fridge_id) {
            Some(f) => {
                f.position = position.to_string();
                true
            }
            None => false,
        })
    }

    fn delete_fridge(&self, fridge_id: i64) -> FridgeResult<bool> {
        let mut t = self.lock()?;
        let before = t.fridges.len();
        t.fridges.retain(|f| f.id != fridge_id);
        if t.fridges.len() == before {
            return Ok(false);
        }
        t.measurements.retain(|m| m.fridge_id != fridge_id);
        t.alerts.retain(|a| a.fridge_id != fridge_id);
        t.movements.retain(|m| m.fridge_id != fridge_id);
        t.stock.retain(|s| s.fridge_id != fridge_id);
        Ok(true)
    }

    fn insert_measurement(&self, row: NewMeasurement) -> FridgeResult<i64> {
        let mut t = self.lock()?;
        if !t.fridges.iter().any(|f| f.id == row.fridge_id) {
            return Err(FridgeError::NotFound(format!("fridge {}", row.fridge_id)));
        }
        let id = next(&mut t.seq.measurements);
        t.measurements.push(Measurement {
            id,
            fridge_id: row.fridge_id,
            timestamp: row.timestamp,
            temperature: row.temperature,
            power: row.power,
        });
        Ok(id)
    }

    fn insert_measurements_with_alerts(&self, readings: Vec<ReadingRows>) -> FridgeResult<Vec<StoredReading>> {
        let mut guard = self.lock()?;
        let t = &mut *guard;
        let missing = readings
            .iter()
            .flat_map(|r| std::iter::once(r.measurement.fridge_id).chain(r.alerts.iter().map(|a| a.fridge_id)))
            .find(|id| !t.fridges.iter().any(|f| f.id == *id));
        if let Some(fridge_id) = missing {
            return Err(FridgeError::NotFound(format!("fridge {}", fridge_id)));
        }

        let mut stored = Vec::with_capacity(readings.len());
        for ReadingRows { measurement, alerts } in readings {
            let measurement_id = next(&mut t.seq.measurements);
            t.measurements.push(Measurement {
                id: measurement_id,
                fridge_id: measurement.fridge_id,
                timestamp: measurement.timestamp,
                temperature: measurement.temperature,
                power: measurement.power,
            });
            let mut alert_ids = Vec::with_capacity(alerts.len());
            for alert in alerts {
                let id = next(&mut t.seq.alerts);
                t.alerts.push(Alert {
                    id,
                    fridge_id: alert.fridge_id,
                    timestamp: alert.timestamp,
                    category: alert.category,
                    message: alert.message,
                });
                alert_ids.push(id);
            }
            stored.push(StoredReading {
                measurement_id,
                alert_ids,
            });
        }
        Ok(stored)
    }

    fn measurements_since(&self, fridge_id: i64, since: DateTime<Utc>) -> FridgeResult<Vec<Measurement>> {
        let t = self.lock()?;
        let mut rows: Vec<Measurement> = t
            .measurements
            .iter()
            .filter(|m| m.fridge_id == fridge_id && m.timestamp >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    fn latest_measurement(&self, fridge_id: i64) -> FridgeResult<Option<Measurement>> {
        let t = self.lock()?;
        Ok(t.measurements
            .iter()
            .filter(|m| m.fridge_id == fridge_id)
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)))
            .cloned())
    }

    fn prune_measurements(&self, fridge_id: i64, older_than: DateTime<Utc>, limit: i64) -> FridgeResult<usize> {
        self.check_sweep()?;
        let mut t = self.lock()?;
        Ok(Self::prune(
            &mut t.measurements,
            limit,
            |m| m.fridge_id == fridge_id && m.timestamp < older_than,
            |m| m.id,
        ))
    }

    fn insert_alert(&self, row: NewAlert) -> FridgeResult<i64> {
        let mut t = self.lock()?;
        if !t.fridges.iter().any(|f| f.id == row.fridge_id) {
            return Err(FridgeError::NotFound(format!("fridge {}", row.fridge_id)));
        }
        let id = next(&mut t.seq.alerts);
        t.alerts.push(Alert {
            id,
            fridge_id: row.fridge_id,
            timestamp: row.timestamp,
            category: row.category,
            message: row.message,
        });
        Ok(id)
    }

    fn alerts_since(
        &self,
        fridge_id: i64,
        since: DateTime<Utc>,
        categories: Option<&[AlertCategory]>,
    ) -> FridgeResult<Vec<Alert>> {
        let t = self.lock()?;
        let mut rows: Vec<Alert> = t
            .alerts
            .iter()
            .filter(|a| a.fridge_id == fridge_id && a.timestamp >= since)
            .filter(|a| categories.is_none_or(|cats| cats.iter().any(|c| c.as_str() == a.category)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    fn prune_alerts(&self, fridge_id: i64, older_than: DateTime<Utc>, limit: i64) -> FridgeResult<usize> {
        self.check_sweep()?;
        let mut t = self.lock()?;
        Ok(Self::prune(
            &mut t.alerts,
            limit,
            |a| a.fridge_id == fridge_id && a.timestamp < older_than,
            |a| a.id,
        ))
    }

    fn insert_product(&self, row: NewProduct) -> FridgeResult<i64> {
        let mut t = self.lock()?;
        let id = next(&mut t.seq.products);
        t.products.push(Product {
            id,
            name: row.name,
            brand: row.brand,
            category: row.category,
        });
        Ok(id)
    }

    fn find_product(&self, product_id: i64) -> FridgeResult<Option<Product>> {
        Ok(self.lock()?.products.iter().find(|p| p.id == product_id).cloned())
    }

    fn find_product_by_name(&self, name: &str) -> FridgeResult<Option<Product>> {
        let name = name.to_lowercase();
        let t = self.lock()?;
        Ok(t.products
            .iter()
            .filter(|p| p.name.to_lowercase() == name)
            .min_by_key(|p| p.id)
            .cloned())
    }

    fn apply_movement(&self, row: NewProductMovement, reconcile: Reconcile<'_>) -> FridgeResult<i64> {
        // the whole table set is locked, which covers the per-row exclusivity the contract asks for
        let mut t = self.lock()?;
        if !t.fridges.iter().any(|f| f.id == row.fridge_id) {
            return Err(FridgeError::NotFound(format!("fridge {}", row.fridge_id)));
        }
        if !t.products.iter().any(|p| p.id == row.product_id) {
            return Err(FridgeError::NotFound(format!("product {}", row.product_id)));
        }

        let position = t
            .stock
            .iter()
            .position(|s| s.fridge_id == row.fridge_id && s.product_id == row.product_id);
        let change = reconcile(position.map(|i| &t.stock[i]))?;

        let movement_id = next(&mut t.seq.movements);
        t.movements.push(ProductMovement {
            id: movement_id,
            fridge_id: row.fridge_id,
            product_id: row.product_id,
            quantity: row.quantity,
            timestamp: row.timestamp,
        });

        match position {
            Some(i) => {
                let stock = &mut t.stock[i];
                stock.quantity = change.quantity;
                stock.added_in = change.added_in;
                stock.removed_in = change.removed_in;
            }
            None => {
                let id = next(&mut t.seq.stock);
                t.stock.push(ProductFridge {
                    id,
                    fridge_id: row.fridge_id,
                    product_id: row.product_id,
                    quantity: change.quantity,
                    added_in: change.added_in,
                    removed_in: change.removed_in,
                });
            }
        }
        Ok(movement_id)
    }

    fn movements_since(&self, fridge_id: i64, since: DateTime<Utc>) -> FridgeResult<Vec<(ProductMovement, Product)>> {
        let t = self.lock()?;
        let mut rows: Vec<(ProductMovement, Product)> = t
            .movements
            .iter()
            .filter(|m| m.fridge_id == fridge_id && m.timestamp >= since)
            .filter_map(|m| {
                t.products
                    .iter()
                    .find(|p| p.id == m.product_id)
                    .map(|p| (m.clone(), p.clone()))
            })
            .collect();
        rows.sort_by(|(a, _), (b, _)| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    fn stock_row(&self, fridge_id: i64, product_id: i64) -> FridgeResult<Option<ProductFridge>> {
        let t = self.lock()?;
        Ok(t.stock
            .iter()
            .find(|s| s.fridge_id == fridge_id && s.product_id == product_id)
            .cloned())
    }

    fn current_stock(&self, fridge_id: i64) -> FridgeResult<Vec<(ProductFridge, Product)>> {
        let t = self.lock()?;
        let mut rows: Vec<(ProductFridge, Product)> = t
            .stock
            .iter()
            .filter(|s| s.fridge_id == fridge_id && s.quantity > 0)
            .filter_map(|s| {
                t.products
                    .iter()
                    .find(|p| p.id == s.product_id)
                    .map(|p| (s.clone(), p.clone()))
            })
            .collect();
        rows.sort_by(|(a, _), (b, _)| b.added_in.cmp(&a.added_in).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    fn finished_since(&self, fridge_id: i64, since: DateTime<Utc>) -> FridgeResult<Vec<(ProductFridge, Product)>> {
        let t = self.lock()?;
        let mut rows: Vec<(ProductFridge, Product)> = t
            .stock
            .iter()
            .filter(|s| s.fridge_id == fridge_id && s.removed_in.is_some_and(|r| r >= since))
            .filter_map(|s| {
                t.products
                    .iter()
                    .find(|p| p.id == s.product_id)
                    .map(|p| (s.clone(), p.clone()))
            })
            .collect();
        rows.sort_by(|(a, _), (b, _)| b.removed_in.cmp(&a.removed_in));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store_with_fridge() -> (MemoryStore, i64, i64) {
        let store = MemoryStore::new();
        let user = store
            .insert_user(NewUser {
                email: "owner@example.com".into(),
                password_hash: "x".into(),
            })
            .unwrap();
        let fridge = store
            .insert_fridge(NewFridge {
                owner_user_id: Some(user),
                position: "kitchen".into(),
            })
            .unwrap();
        (store, user, fridge)
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let (store, _, _) = store_with_fridge();
        let err = store
            .insert_user(NewUser {
                email: "owner@example.com".into(),
                password_hash: "y".into(),
            })
            .unwrap_err();
        assert!(matches!(err, FridgeError::Conflict(_)));
    }

    #[test]
    fn deleting_user_orphans_fridges_instead_of_deleting_them() {
        let (store, user, fridge) = store_with_fridge();
        assert!(store.delete_user(user).unwrap());
        let f = store.find_fridge(fridge).unwrap().expect("fridge survives");
        assert_eq!(f.owner_user_id, None);
    }

    #[test]
    fn prune_respects_limit_and_cutoff() {
        let (store, _, fridge) = store_with_fridge();
        let now = Utc::now();
        for i in 0..5 {
            store
                .insert_measurement(NewMeasurement {
                    fridge_id: fridge,
                    timestamp: now - Duration::days(3) + Duration::minutes(i),
                    temperature: 4.0,
                    power: 90.0,
                })
                .unwrap();
        }
        store
            .insert_measurement(NewMeasurement {
                fridge_id: fridge,
                timestamp: now,
                temperature: 4.0,
                power: 90.0,
            })
            .unwrap();

        let cutoff = now - Duration::hours(48);
        assert_eq!(store.prune_measurements(fridge, cutoff, 3).unwrap(), 3);
        assert_eq!(store.prune_measurements(fridge, cutoff, 3).unwrap(), 2);
        assert_eq!(store.prune_measurements(fridge, cutoff, 3).unwrap(), 0);
        assert_eq!(store.measurements_since(fridge, now - Duration::days(30)).unwrap().len(), 1);
    }

    #[test]
    fn rejected_reconcile_writes_nothing() {
        let (store, _, fridge) = store_with_fridge();
        let product = store
            .insert_product(NewProduct {
                name: "milk".into(),
                brand: None,
                category: "dairy".into(),
            })
            .unwrap();
        let row = NewProductMovement {
            fridge_id: fridge,
            product_id: product,
            quantity: -1,
            timestamp: Utc::now(),
        };
        let err = store
            .apply_movement(row, &|_| Err(FridgeError::InvalidState("nope".into())))
            .unwrap_err();
        assert!(matches!(err, FridgeError::InvalidState(_)));
        assert!(store.stock_row(fridge, product).unwrap().is_none());
        assert!(store.movements_since(fridge, Utc::now() - Duration::days(1)).unwrap().is_empty());
    }

    #[test]
    fn reading_batch_is_written_whole_or_not_at_all() {
        let (store, _, fridge) = store_with_fridge();
        let now = Utc::now();
        let reading = |fridge_id| ReadingRows {
            measurement: NewMeasurement {
                fridge_id,
                timestamp: now,
                temperature: 26.0,
                power: 90.0,
            },
            alerts: vec![NewAlert::new(fridge_id, now, AlertCategory::CriticTemp, "hot")],
        };

        let err = store
            .insert_measurements_with_alerts(vec![reading(fridge), reading(fridge + 1)])
            .unwrap_err();
        assert!(matches!(err, FridgeError::NotFound(_)));
        assert!(store.measurements_since(fridge, now - Duration::days(1)).unwrap().is_empty());
        assert!(store.alerts_since(fridge, now - Duration::days(1), None).unwrap().is_empty());

        let stored = store.insert_measurements_with_alerts(vec![reading(fridge)]).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].alert_ids.len(), 1);
        let alerts = store.alerts_since(fridge, now - Duration::days(1), None).unwrap();
        assert_eq!(alerts[0].id, stored[0].alert_ids[0]);
    }
}

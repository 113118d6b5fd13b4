//! PostgreSQL [`Store`] on diesel with an r2d2 connection pool.

use chrono::{DateTime, Utc};
use diesel::PgConnection;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::info;

use crate::db::models::{
    Alert, AlertCategory, Fridge, Measurement, NewAlert, NewFridge, NewMeasurement, NewProduct, NewProductFridge,
    NewProductMovement, NewUser, OwnerStatistics, Product, ProductFridge, ProductMovement, User,
};
use crate::db::store::{ReadingRows, Reconcile, Store, StoredReading};
use crate::error::{FridgeError, FridgeResult};
use crate::schema;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

diesel::define_sql_function!(fn lower(x: diesel::sql_types::Text) -> diesel::sql_types::Text);

type PgPool = Pool<ConnectionManager<PgConnection>>;
type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn connect(database_url: &str, pool_size: u32) -> Result<Self, String> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| format!("DB connection failed: {}", e))?;
        Ok(PgStore { pool })
    }

    pub fn apply_migrations(&self) -> Result<(), String> {
        let mut conn = self.pool.get().map_err(|e| format!("DB connection failed: {}", e))?;
        match conn.run_pending_migrations(MIGRATIONS) {
            Ok(applied) => {
                if applied.is_empty() {
                    info!("Database schema is up to date; no migrations were applied");
                } else {
                    let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                    info!("Applied {} database migration(s): {}", applied.len(), names);
                }
                Ok(())
            }
            Err(e) => Err(format!("Applying database migrations failed: {}", e)),
        }
    }

    fn conn(&self) -> FridgeResult<PgPooled> {
        Ok(self.pool.get()?)
    }

    fn prune_ids(ids: Vec<i64>) -> Option<Vec<i64>> {
        if ids.is_empty() { None } else { Some(ids) }
    }
}

impl Store for PgStore {
    fn insert_user(&self, row: NewUser) -> FridgeResult<i64> {
        use schema::users::dsl as U;

        let mut conn = self.conn()?;
        Ok(diesel::insert_into(U::users)
            .values(&row)
            .returning(U::id)
            .get_result(&mut conn)?)
    }

    fn find_user(&self, user_id: i64) -> FridgeResult<Option<User>> {
        use schema::users::dsl as U;

        let mut conn = self.conn()?;
        Ok(U::users.find(user_id).first(&mut conn).optional()?)
    }

    fn find_user_by_email(&self, email: &str) -> FridgeResult<Option<User>> {
        use schema::users::dsl as U;

        let mut conn = self.conn()?;
        Ok(U::users.filter(U::email.eq(email)).first(&mut conn).optional()?)
    }

    fn update_password(&self, user_id: i64, password_hash: &str) -> FridgeResult<bool> {
        use schema::users::dsl as U;

        let mut conn = self.conn()?;
        let updated = diesel::update(U::users.find(user_id))
            .set(U::password_hash.eq(password_hash))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn delete_user(&self, user_id: i64) -> FridgeResult<bool> {
        use schema::fridges::dsl as F;
        use schema::users::dsl as U;

        let mut conn = self.conn()?;
        conn.transaction::<bool, FridgeError, _>(|conn| {
            // the FK is ON DELETE SET NULL too; doing it here keeps the behaviour explicit
            diesel::update(F::fridges.filter(F::owner_user_id.eq(user_id)))
                .set(F::owner_user_id.eq(None::<i64>))
                .execute(conn)?;
            let deleted = diesel::delete(U::users.find(user_id)).execute(conn)?;
            Ok(deleted > 0)
        })
    }

    fn owner_statistics(&self, user_id: i64) -> FridgeResult<OwnerStatistics> {
        use schema::alerts::dsl as A;
        use schema::fridges::dsl as F;
        use schema::measurements::dsl as M;
        use schema::product_fridge::dsl as PF;
        use schema::product_movements::dsl as PM;

        let mut conn = self.conn()?;
        let total_fridges = F::fridges
            .filter(F::owner_user_id.eq(user_id))
            .select(count_star())
            .get_result(&mut conn)?;
        let total_measurements = M::measurements
            .inner_join(F::fridges)
            .filter(F::owner_user_id.eq(user_id))
            .select(count_star())
            .get_result(&mut conn)?;
        let total_alerts = A::alerts
            .inner_join(F::fridges)
            .filter(F::owner_user_id.eq(user_id))
            .select(count_star())
            .get_result(&mut conn)?;
        let total_products = PF::product_fridge
            .inner_join(F::fridges)
            .filter(F::owner_user_id.eq(user_id).and(PF::removed_in.is_null()))
            .select(count_star())
            .get_result(&mut conn)?;
        let total_product_movements = PM::product_movements
            .inner_join(F::fridges)
            .filter(F::owner_user_id.eq(user_id))
            .select(count_star())
            .get_result(&mut conn)?;

        Ok(OwnerStatistics {
            total_fridges,
            total_measurements,
            total_alerts,
            total_products,
            total_product_movements,
        })
    }

    fn insert_fridge(&self, row: NewFridge) -> FridgeResult<i64> {
        use schema::fridges::dsl as F;

        let mut conn = self.conn()?;
        Ok(diesel::insert_into(F::fridges)
            .values(&row)
            .returning(F::id)
            .get_result(&mut conn)?)
    }

    fn find_fridge(&self, fridge_id: i64) -> FridgeResult<Option<Fridge>> {
        use schema::fridges::dsl as F;

        let mut conn = self.conn()?;
        Ok(F::fridges.find(fridge_id).first(&mut conn).optional()?)
    }

    fn fridges_by_owner(&self, user_id: i64) -> FridgeResult<Vec<Fridge>> {
        use schema::fridges::dsl as F;

        let mut conn = self.conn()?;
        Ok(F::fridges
            .filter(F::owner_user_id.eq(user_id))
            .order(F::id.asc())
            .load(&mut conn)?)
    }

    fn update_fridge_position(&self, fridge_id: i64, position: &str) -> FridgeResult<bool> {
        use schema::fridges::dsl as F;

        let mut conn = self.conn()?;
        let updated = diesel::update(F::fridges.find(fridge_id))
            .set(F::position.eq(position))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn delete_fridge(&self, fridge_id: i64) -> FridgeResult<bool> {
        use schema::fridges::dsl as F;

        // telemetry, alerts and ledger rows go with it (ON DELETE CASCADE)
        let mut conn = self.conn()?;
        let deleted = diesel::delete(F::fridges.find(fridge_id)).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn insert_measurement(&self, row: NewMeasurement) -> FridgeResult<i64> {
        use schema::measurements::dsl as M;

        let mut conn = self.conn()?;
        Ok(diesel::insert_into(M::measurements)
            .values(&row)
            .returning(M::id)
            .get_result(&mut conn)?)
    }

    fn insert_measurements_with_alerts(&self, readings: Vec<ReadingRows>) -> FridgeResult<Vec<StoredReading>> {
        use schema::alerts::dsl as A;
        use schema::measurements::dsl as M;

        let mut conn = self.conn()?;
        conn.transaction::<Vec<StoredReading>, FridgeError, _>(|conn| {
            readings
                .iter()
                .map(|reading| -> FridgeResult<StoredReading> {
                    let measurement_id: i64 = diesel::insert_into(M::measurements)
                        .values(&reading.measurement)
                        .returning(M::id)
                        .get_result(conn)?;
                    let alert_ids: Vec<i64> = if reading.alerts.is_empty() {
                        Vec::new()
                    } else {
                        diesel::insert_into(A::alerts)
                            .values(&reading.alerts)
                            .returning(A::id)
                            .get_results(conn)?
                    };
                    Ok(StoredReading {
                        measurement_id,
                        alert_ids,
                    })
                })
                .collect()
        })
    }

    fn measurements_since(&self, fridge_id: i64, since: DateTime<Utc>) -> FridgeResult<Vec<Measurement>> {
        use schema::measurements::dsl as M;

        let mut conn = self.conn()?;
        Ok(M::measurements
            .filter(M::fridge_id.eq(fridge_id).and(M::timestamp.ge(since)))
            .order((M::timestamp.desc(), M::id.desc()))
            .load(&mut conn)?)
    }

    fn latest_measurement(&self, fridge_id: i64) -> FridgeResult<Option<Measurement>> {
        use schema::measurements::dsl as M;

        let mut conn = self.conn()?;
        Ok(M::measurements
            .filter(M::fridge_id.eq(fridge_id))
            .order((M::timestamp.desc(), M::id.desc()))
            .first(&mut conn)
            .optional()?)
    }

    fn prune_measurements(&self, fridge_id: i64, older_than: DateTime<Utc>, limit: i64) -> FridgeResult<usize> {
        use schema::measurements::dsl as M;

        let mut conn = self.conn()?;
        let ids: Vec<i64> = M::measurements
            .filter(M::fridge_id.eq(fridge_id).and(M::timestamp.lt(older_than)))
            .order(M::id.asc())
            .limit(limit)
            .select(M::id)
            .load(&mut conn)?;
        let Some(ids) = Self::prune_ids(ids) else {
            return Ok(0);
        };
        Ok(diesel::delete(M::measurements.filter(M::id.eq_any(ids))).execute(&mut conn)?)
    }

    fn insert_alert(&self, row: NewAlert) -> FridgeResult<i64> {
        use schema::alerts::dsl as A;

        let mut conn = self.conn()?;
        Ok(diesel::insert_into(A::alerts)
            .values(&row)
            .returning(A::id)
            .get_result(&mut conn)?)
    }

    fn alerts_since(
        &self,
        fridge_id: i64,
        since: DateTime<Utc>,
        categories: Option<&[AlertCategory]>,
    ) -> FridgeResult<Vec<Alert>> {
        use schema::alerts::dsl as A;

        let mut conn = self.conn()?;
        let mut query = A::alerts
            .filter(A::fridge_id.eq(fridge_id).and(A::timestamp.ge(since)))
            .order((A::timestamp.desc(), A::id.desc()))
            .into_boxed();
        if let Some(categories) = categories {
            let names: Vec<&'static str> = categories.iter().map(|c| c.as_str()).collect();
            query = query.filter(A::category.eq_any(names));
        }
        Ok(query.load(&mut conn)?)
    }

    fn prune_alerts(&self, fridge_id: i64, older_than: DateTime<Utc>, limit: i64) -> FridgeResult<usize> {
        use schema::alerts::dsl as A;

        let mut conn = self.conn()?;
        let ids: Vec<i64> = A::alerts
            .filter(A::fridge_id.eq(fridge_id).and(A::timestamp.lt(older_than)))
            .order(A::id.asc())
            .limit(limit)
            .select(A::id)
            .load(&mut conn)?;
        let Some(ids) = Self::prune_ids(ids) else {
            return Ok(0);
        };
        Ok(diesel::delete(A::alerts.filter(A::id.eq_any(ids))).execute(&mut conn)?)
    }

    fn insert_product(&self, row: NewProduct) -> FridgeResult<i64> {
        use schema::products::dsl as P;

        let mut conn = self.conn()?;
        Ok(diesel::insert_into(P::products)
            .values(&row)
            .returning(P::id)
            .get_result(&mut conn)?)
    }

    fn find_product(&self, product_id: i64) -> FridgeResult<Option<Product>> {
        use schema::products::dsl as P;

        let mut conn = self.conn()?;
        Ok(P::products.find(product_id).first(&mut conn).optional()?)
    }

    fn find_product_by_name(&self, name: &str) -> FridgeResult<Option<Product>> {
        use schema::products::dsl as P;

        let mut conn = self.conn()?;
        Ok(P::products
            .filter(lower(P::name).eq(name.to_lowercase()))
            .order(P::id.asc())
            .first(&mut conn)
            .optional()?)
    }

    fn apply_movement(&self, row: NewProductMovement, reconcile: Reconcile<'_>) -> FridgeResult<i64> {
        use schema::product_fridge::dsl as PF;
        use schema::product_movements::dsl as PM;

        let mut conn = self.conn()?;
        conn.transaction::<i64, FridgeError, _>(|conn| {
            // Make sure a row exists so FOR UPDATE has something to lock; a concurrent
            // first movement blocks on the unique index until this transaction ends.
            let placeholder = NewProductFridge {
                fridge_id: row.fridge_id,
                product_id: row.product_id,
                quantity: 0,
                added_in: None,
                removed_in: None,
            };
            let created = diesel::insert_into(PF::product_fridge)
                .values(&placeholder)
                .on_conflict((PF::fridge_id, PF::product_id))
                .do_nothing()
                .execute(conn)?;

            let locked: ProductFridge = PF::product_fridge
                .filter(PF::fridge_id.eq(row.fridge_id).and(PF::product_id.eq(row.product_id)))
                .for_update()
                .first(conn)?;
            let current = if created > 0 { None } else { Some(&locked) };
            let change = reconcile(current)?;

            let movement_id: i64 = diesel::insert_into(PM::product_movements)
                .values(&row)
                .returning(PM::id)
                .get_result(conn)?;

            diesel::update(PF::product_fridge.find(locked.id))
                .set((
                    PF::quantity.eq(change.quantity),
                    PF::added_in.eq(change.added_in),
                    PF::removed_in.eq(change.removed_in),
                ))
                .execute(conn)?;

            Ok(movement_id)
        })
    }

    fn movements_since(&self, fridge_id: i64, since: DateTime<Utc>) -> FridgeResult<Vec<(ProductMovement, Product)>> {
        use schema::product_movements::dsl as PM;
        use schema::products::dsl as P;

        let mut conn = self.conn()?;
        Ok(PM::product_movements
            .inner_join(P::products)
            .filter(PM::fridge_id.eq(fridge_id).and(PM::timestamp.ge(since)))
            .order((PM::timestamp.desc(), PM::id.desc()))
            .select((ProductMovement::as_select(), Product::as_select()))
            .load(&mut conn)?)
    }

    fn stock_row(&self, fridge_id: i64, product_id: i64) -> FridgeResult<Option<ProductFridge>> {
        use schema::product_fridge::dsl as PF;

        let mut conn = self.conn()?;
        Ok(PF::product_fridge
            .filter(PF::fridge_id.eq(fridge_id).and(PF::product_id.eq(product_id)))
            .first(&mut conn)
            .optional()?)
    }

    fn current_stock(&self, fridge_id: i64) -> FridgeResult<Vec<(ProductFridge, Product)>> {
        use schema::product_fridge::dsl as PF;
        use schema::products::dsl as P;

        let mut conn = self.conn()?;
        Ok(PF::product_fridge
            .inner_join(P::products)
            .filter(PF::fridge_id.eq(fridge_id).and(PF::quantity.gt(0)))
            .order((PF::added_in.desc(), PF::id.desc()))
            .select((ProductFridge::as_select(), Product::as_select()))
            .load(&mut conn)?)
    }

    fn finished_since(&self, fridge_id: i64, since: DateTime<Utc>) -> FridgeResult<Vec<(ProductFridge, Product)>> {
        use schema::product_fridge::dsl as PF;
        use schema::products::dsl as P;

        let mut conn = self.conn()?;
        Ok(PF::product_fridge
            .inner_join(P::products)
            .filter(PF::fridge_id.eq(fridge_id).and(PF::removed_in.ge(since)))
            .order(PF::removed_in.desc())
            .select((ProductFridge::as_select(), Product::as_select()))
            .load(&mut conn)?)
    }
}
